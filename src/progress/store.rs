//! Durable sled-backed progress event store.

use std::path::Path;

use chrono::Utc;
use sled::{Db, Tree};
use tracing::warn;

use crate::error::StorageError;
use crate::progress::event::{ProgressEvent, ProgressUpdate};
use crate::progress::sink::ProgressSink;

const TREE_EVENTS: &str = "progress_events";
const TREE_SEQ: &str = "progress_seq";

#[derive(Clone)]
pub struct ProgressStore {
    db: Db,
    events: Tree,
    seq: Tree,
}

impl ProgressStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let events = db.open_tree(TREE_EVENTS)?;
        let seq = db.open_tree(TREE_SEQ)?;
        Ok(Self { db, events, seq })
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Self::new(db)
    }

    /// Next sequence number for a workflow, starting at 1.
    fn next_seq(&self, workflow_id: &str) -> Result<u64, StorageError> {
        let updated = self
            .seq
            .update_and_fetch(workflow_id.as_bytes(), |old| {
                let current = old
                    .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })
            ?;
        Ok(updated
            .and_then(|raw| <[u8; 8]>::try_from(raw.as_ref()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(1))
    }

    /// Assign a sequence number and persist the update.
    pub fn append(&self, update: &ProgressUpdate) -> Result<ProgressEvent, StorageError> {
        let event = ProgressEvent {
            ts: Utc::now().to_rfc3339(),
            seq: self.next_seq(&update.workflow_id)?,
            update: update.clone(),
        };
        self.append_event(&event)?;
        Ok(event)
    }

    pub fn append_event(&self, event: &ProgressEvent) -> Result<(), StorageError> {
        let key = encode_event_key(&event.update.workflow_id, event.seq);
        let value = serde_json::to_vec(event)?;
        self.events.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn read_events(&self, workflow_id: &str) -> Result<Vec<ProgressEvent>, StorageError> {
        self.read_events_after(workflow_id, 0)
    }

    pub fn read_events_after(
        &self,
        workflow_id: &str,
        after_seq: u64,
    ) -> Result<Vec<ProgressEvent>, StorageError> {
        let prefix = format!("{workflow_id}:");
        let mut out = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (key, value) = result?;
            if !is_own_key(&key, prefix.len()) {
                continue;
            }
            let parsed: ProgressEvent = serde_json::from_slice(&value)?;
            if parsed.seq > after_seq {
                out.push(parsed);
            }
        }
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    pub fn latest(&self, workflow_id: &str) -> Result<Option<ProgressEvent>, StorageError> {
        Ok(self.read_events(workflow_id)?.pop())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn encode_event_key(workflow_id: &str, seq: u64) -> String {
        encode_event_key(workflow_id, seq)
    }

    pub fn delete_workflow(&self, workflow_id: &str) -> Result<usize, StorageError> {
        self.seq.remove(workflow_id.as_bytes())?;
        let prefix = format!("{workflow_id}:");
        let mut keys = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (key, _) = result?;
            if is_own_key(&key, prefix.len()) {
                keys.push(key);
            }
        }
        let removed = keys.len();
        for key in keys {
            self.events.remove(key)?;
        }
        Ok(removed)
    }
}

impl ProgressSink for ProgressStore {
    fn on_progress(&self, update: &ProgressUpdate) {
        if let Err(e) = self.append(update) {
            warn!(
                workflow_id = %update.workflow_id,
                stage = %update.stage,
                error = %e,
                "Failed to persist progress event"
            );
        }
    }
}

fn encode_event_key(workflow_id: &str, seq: u64) -> String {
    format!("{workflow_id}:{seq:020}")
}

/// Keys of `wf` also prefix-match keys of `wf:sub`; only a bare sequence may follow.
fn is_own_key(key: &[u8], prefix_len: usize) -> bool {
    key.get(prefix_len..)
        .is_some_and(|rest| !rest.is_empty() && rest.iter().all(u8::is_ascii_digit))
}
