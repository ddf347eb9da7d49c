//! Idempotency
//!
//! Decides whether a workflow's artifacts can be reused as they are:
//! - checksum.rs hashes the workflow inputs (order-independent over secondary inputs) and its plan
//! - record.rs is the durable generation record with file and issue provenance
//! - store.rs loads, compares and persists records by workflow id

pub mod checksum;
pub mod record;
pub mod store;

pub use checksum::{compute_input_checksum, compute_workflow_checksum, content_checksum, file_checksum};
pub use record::{GeneratedFileRecord, GenerationRecord, IssueRecord};
pub use store::{FileRecordStorage, IdempotencyStore, RecordStorage};
