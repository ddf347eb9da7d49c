//! Transient-error classification.
//!
//! Classification is a pure query over the rendered error message, plus the
//! structural `NonRetryable` wrapper which always wins.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected to succeed if retried
    Transient,
    /// Retrying will not help
    Permanent,
    /// Caller wrapped the error in `ApiError::NonRetryable`
    ForcedPermanent,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
    "resource exhausted",
    "resource_exhausted",
    "overloaded",
];

const TIMEOUT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "deadline_exceeded",
];

const NETWORK_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "network is unreachable",
    "host is unreachable",
    "unreachable",
    "no such host",
    "temporary failure in name resolution",
    "i/o timeout",
];

const SERVER_ERROR_PATTERNS: &[&str] = &[
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
];

const RATE_LIMIT_STATUS: &str = "429";

pub fn classify(err: &ApiError) -> ErrorClass {
    match err {
        ApiError::NonRetryable(_) => ErrorClass::ForcedPermanent,
        ApiError::Cancelled | ApiError::CircuitOpen => ErrorClass::Permanent,
        other => {
            if is_transient_message(&other.to_string()) {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
    }
}

/// Case-insensitive match against the known transient categories.
/// Anything unrecognised, including an empty message, is permanent.
pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    if lowered.trim().is_empty() {
        return false;
    }

    let matches_any = |patterns: &[&str]| patterns.iter().any(|p| lowered.contains(p));
    matches_any(RATE_LIMIT_PATTERNS)
        || matches_any(TIMEOUT_PATTERNS)
        || matches_any(NETWORK_PATTERNS)
        || matches_any(SERVER_ERROR_PATTERNS)
        || status_codes(&lowered).any(is_transient_status)
}

/// Standalone three-digit numbers, so "5000 tokens" yields nothing.
fn status_codes(message: &str) -> impl Iterator<Item = &str> {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 3)
}

/// 429 or any 5xx
fn is_transient_status(code: &str) -> bool {
    code == RATE_LIMIT_STATUS || code.starts_with('5')
}
