//! Event schema for generation progress.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Started,
    RoundStarted,
    BatchStarted,
    BatchCompleted,
    BatchFailed,
    FileObserved,
    Completed,
    Failed,
}

impl ProgressStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStage::Started => "started",
            ProgressStage::RoundStarted => "round_started",
            ProgressStage::BatchStarted => "batch_started",
            ProgressStage::BatchCompleted => "batch_completed",
            ProgressStage::BatchFailed => "batch_failed",
            ProgressStage::FileObserved => "file_observed",
            ProgressStage::Completed => "completed",
            ProgressStage::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub file_name: String,
    pub task_id: String,
    pub is_main: bool,
}

/// One progress notification. `current` never decreases within an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub workflow_id: String,
    pub stage: ProgressStage,
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactDescriptor>,
    #[serde(default)]
    pub message: String,
}

/// A stored update with its position in the workflow's event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: String,
    pub seq: u64,
    #[serde(flatten)]
    pub update: ProgressUpdate,
}
