//! Anvil: resilient, resumable artifact generation
//!
//! Drives an unreliable external agent until every expected artifact of a
//! workflow exists on disk. Calls go through a circuit breaker and a
//! retrying executor; a tracker reconciles what landed against the manifest;
//! a scheduler retries only what is missing with shrinking batches; and an
//! idempotency store skips the whole run when the inputs have not changed.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod idempotency;
pub mod logging;
pub mod progress;
pub mod provider;
pub mod resilience;
pub mod workflow;

pub use error::{ApiError, StorageError};
