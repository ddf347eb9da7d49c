//! Destination scan: what is currently on disk in the output directory.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

pub trait DestinationScanner: Send + Sync {
    /// Direct children of `dir`, sorted by name. A missing directory yields an empty list.
    fn list(&self, dir: &Path) -> Result<Vec<ScannedEntry>, StorageError>;
}

/// Scans the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsScanner;

impl DestinationScanner for FsScanner {
    fn list(&self, dir: &Path) -> Result<Vec<ScannedEntry>, StorageError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    // Files may vanish between listing and stat while the agent is writing.
                    if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) {
                        continue;
                    }
                    return Err(StorageError::IoError(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to scan {}: {}", dir.display(), e),
                    )));
                }
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let modified = metadata.modified().map_err(StorageError::IoError)?;
            entries.push(ScannedEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }
        Ok(entries)
    }
}
