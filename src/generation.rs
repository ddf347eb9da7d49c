//! Artifact generation
//!
//! One attempt, end to end:
//! ```text
//!     manifest.rs  (expected artifacts: main + one per task)
//!     → tracker.rs pre-scan (accept what an earlier run already wrote)
//!     → scheduler.rs rounds:
//!         prompt.rs → ResilientExecutor (one call per batch)
//!         → tracker.rs scan (fuzzy.rs tolerates naming drift)
//!         → halve batch size, retry only what is missing
//! ```

pub mod fuzzy;
pub mod manifest;
pub mod prompt;
pub mod scan;
pub mod scheduler;
pub mod tracker;

pub use fuzzy::{fuzzy_match, match_tier, MatchTier};
pub use manifest::{ExpectedArtifact, Manifest, TaskSpec, MAIN_ARTIFACT_STEM, MAIN_TASK_ID};
pub use prompt::{BatchPrompt, PlainPromptRenderer, PromptRenderer};
pub use scan::{DestinationScanner, FsScanner, ScannedEntry};
pub use scheduler::{
    BatchScheduler, GeneratedArtifact, GenerationJob, GenerationOutcome, SchedulerConfig,
};
pub use tracker::{GenerationTracker, Observation, StalePolicy};
