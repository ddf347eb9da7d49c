//! Input checksums using BLAKE3
//!
//! InputChecksum = hash(for each input: path_len || path || content_len || content)
//! WorkflowChecksum = InputChecksum's stream || "plan" || plan_len || plan
//!
//! The optional primary input comes first; secondary inputs follow sorted by
//! path so the caller's ordering does not matter. Length prefixes keep
//! boundaries unambiguous.

use crate::error::StorageError;
use blake3::Hasher;
use std::fs;
use std::path::{Path, PathBuf};

/// Hex digest over the primary input and the sorted secondary inputs.
pub fn compute_input_checksum(
    primary: Option<&Path>,
    secondary: &[PathBuf],
) -> Result<String, StorageError> {
    let hasher = hash_inputs(primary, secondary)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Like [`compute_input_checksum`], followed by a serialized description of
/// the expected outputs.
pub fn compute_workflow_checksum(
    primary: Option<&Path>,
    secondary: &[PathBuf],
    plan: &[u8],
) -> Result<String, StorageError> {
    let mut hasher = hash_inputs(primary, secondary)?;
    hasher.update(b"plan");
    hasher.update(&(plan.len() as u64).to_be_bytes());
    hasher.update(plan);
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_inputs(primary: Option<&Path>, secondary: &[PathBuf]) -> Result<Hasher, StorageError> {
    let mut hasher = Hasher::new();

    match primary {
        Some(path) => {
            hasher.update(b"primary");
            hash_input(&mut hasher, path)?;
        }
        None => {
            hasher.update(b"no-primary");
        }
    }

    let mut sorted: Vec<&PathBuf> = secondary.iter().collect();
    sorted.sort();
    hasher.update(&(sorted.len() as u64).to_be_bytes());
    for path in sorted {
        hash_input(&mut hasher, path)?;
    }
    Ok(hasher)
}

fn hash_input(hasher: &mut Hasher, path: &Path) -> Result<(), StorageError> {
    let content = fs::read(path).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read input {:?}: {}", path, e),
        ))
    })?;
    let path_string = path.to_string_lossy();
    let path_bytes = path_string.as_bytes();

    hasher.update(&(path_bytes.len() as u64).to_be_bytes());
    hasher.update(path_bytes);
    hasher.update(&(content.len() as u64).to_be_bytes());
    hasher.update(&content);
    Ok(())
}

/// Hex BLAKE3 digest of raw bytes.
pub fn content_checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn file_checksum(path: &Path) -> Result<String, StorageError> {
    let content = fs::read(path)?;
    Ok(content_checksum(&content))
}
