//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to a string for CLI output. Incomplete generations list
/// one missing artifact per line.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::IncompleteGeneration {
            missing,
            batch_errors,
        } => {
            let mut out = format!("Generation incomplete: {} artifact(s) missing", missing.len());
            for name in missing {
                out.push_str(&format!("\n  - {}", name));
            }
            if !batch_errors.is_empty() {
                out.push_str("\nBatch errors:");
                for err in batch_errors {
                    out.push_str(&format!("\n  - {}", err));
                }
            }
            out
        }
        ApiError::Cancelled => "Cancelled".to_string(),
        other => other.to_string(),
    }
}
