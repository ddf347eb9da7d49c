//! Idempotency store: one durable generation record per workflow.

use crate::error::StorageError;
use crate::idempotency::record::GenerationRecord;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Durable record storage keyed by workflow id. A missing record is `Ok(None)`.
pub trait RecordStorage: Send + Sync {
    fn load(&self, workflow_id: &str) -> Result<Option<GenerationRecord>, StorageError>;
    fn save(&self, record: &GenerationRecord) -> Result<(), StorageError>;
    /// Returns whether a record was removed.
    fn delete(&self, workflow_id: &str) -> Result<bool, StorageError>;
}

/// JSON records under `{root}/{workflow}.json`
pub struct FileRecordStorage {
    root: PathBuf,
}

impl FileRecordStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create record directory at {:?}: {}", root, e),
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, workflow_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(format!("{}.json", file_stem_for(workflow_id)?)))
    }
}

/// Workflow ids become file names: unsafe characters map to `_` and a short
/// hash of the original id keeps distinct ids from colliding.
fn file_stem_for(workflow_id: &str) -> Result<String, StorageError> {
    if workflow_id.trim().is_empty() {
        return Err(StorageError::InvalidPath(
            "workflow id cannot be empty".to_string(),
        ));
    }
    let sanitized: String = workflow_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized == workflow_id {
        Ok(sanitized)
    } else {
        let digest = blake3::hash(workflow_id.as_bytes()).to_hex();
        Ok(format!("{}-{}", sanitized, &digest.as_str()[..8]))
    }
}

impl RecordStorage for FileRecordStorage {
    fn load(&self, workflow_id: &str) -> Result<Option<GenerationRecord>, StorageError> {
        let path = self.record_path(workflow_id)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::IoError(e)),
        };
        let record = serde_json::from_slice(&raw).map_err(|e| {
            StorageError::Serialization(format!("Corrupt record at {:?}: {}", path, e))
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &GenerationRecord) -> Result<(), StorageError> {
        let path = self.record_path(&record.workflow_id)?;
        let temp_path = path.with_extension("json.tmp");
        let serialized = serde_json::to_vec_pretty(record)?;

        fs::write(&temp_path, &serialized).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write record to {:?}: {}", temp_path, e),
            ))
        })?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            ))
        })?;
        Ok(())
    }

    fn delete(&self, workflow_id: &str) -> Result<bool, StorageError> {
        let path = self.record_path(workflow_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}

#[derive(Clone)]
pub struct IdempotencyStore {
    storage: Arc<dyn RecordStorage>,
}

impl IdempotencyStore {
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        Self { storage }
    }

    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        Ok(Self::new(Arc::new(FileRecordStorage::new(root)?)))
    }

    /// The stored record with `true` when its checksum matches; otherwise a
    /// fresh record with `false`. A stale record is left on disk until the
    /// fresh one is saved over it.
    pub fn get_or_create_record(
        &self,
        workflow_id: &str,
        input_checksum: &str,
    ) -> Result<(GenerationRecord, bool), StorageError> {
        match self.storage.load(workflow_id)? {
            Some(record) if record.input_checksum == input_checksum => {
                debug!(workflow_id, complete = record.is_complete(), "Loaded matching generation record");
                Ok((record, true))
            }
            Some(record) => {
                info!(
                    workflow_id,
                    stored = %record.input_checksum,
                    current = %input_checksum,
                    "Inputs changed since last generation"
                );
                Ok((GenerationRecord::new(workflow_id, input_checksum), false))
            }
            None => Ok((GenerationRecord::new(workflow_id, input_checksum), false)),
        }
    }

    pub fn load(&self, workflow_id: &str) -> Result<Option<GenerationRecord>, StorageError> {
        self.storage.load(workflow_id)
    }

    pub fn save(&self, record: &GenerationRecord) -> Result<(), StorageError> {
        self.storage.save(record)
    }

    pub fn delete(&self, workflow_id: &str) -> Result<bool, StorageError> {
        self.storage.delete(workflow_id)
    }
}
