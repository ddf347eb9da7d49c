//! Progress sinks and the monotonic reporter used by the scheduler.

use crate::progress::event::{ArtifactDescriptor, ProgressStage, ProgressUpdate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Receives progress notifications. Implementations must not block for long
/// and must not fail the generation; errors are theirs to log.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

/// Logs every update through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        info!(
            workflow_id = %update.workflow_id,
            stage = %update.stage,
            current = update.current,
            total = update.total,
            artifact = update.artifact.as_ref().map(|a| a.file_name.as_str()).unwrap_or(""),
            "{}",
            update.message
        );
    }
}

/// Forwards to several sinks in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }
}

impl ProgressSink for FanoutSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        for sink in &self.sinks {
            sink.on_progress(update);
        }
    }
}

/// Reports progress for one generation attempt. The confirmed count is kept
/// as a floor so `current` never regresses across retry rounds.
pub struct ProgressReporter {
    sink: Option<Arc<dyn ProgressSink>>,
    workflow_id: String,
    total: usize,
    floor: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>, workflow_id: impl Into<String>, total: usize) -> Self {
        Self {
            sink,
            workflow_id: workflow_id.into(),
            total,
            floor: AtomicUsize::new(0),
        }
    }

    /// Highest confirmed count reported so far.
    pub fn floor(&self) -> usize {
        self.floor.load(Ordering::Acquire)
    }

    /// Report `confirmed` artifacts, never going below the floor.
    pub fn report(
        &self,
        stage: ProgressStage,
        confirmed: usize,
        artifact: Option<ArtifactDescriptor>,
        message: impl Into<String>,
    ) {
        let confirmed = confirmed.min(self.total);
        let previous = self.floor.fetch_max(confirmed, Ordering::AcqRel);
        let current = previous.max(confirmed);
        if let Some(sink) = &self.sink {
            sink.on_progress(&ProgressUpdate {
                workflow_id: self.workflow_id.clone(),
                stage,
                current,
                total: self.total,
                artifact,
                message: message.into(),
            });
        }
    }
}
