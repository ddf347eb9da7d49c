//! Progress reporting for generation attempts.

pub mod event;
pub mod sink;
pub mod store;

pub use event::{ArtifactDescriptor, ProgressEvent, ProgressStage, ProgressUpdate};
pub use sink::{FanoutSink, ProgressReporter, ProgressSink, TracingProgressSink};
pub use store::ProgressStore;
