//! Error types for the anvil generation pipeline.

use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider request timeout after {0:?}")]
    ProviderTimeout(Duration),

    /// Returned without calling the provider while the breaker is open.
    #[error("Circuit breaker is open; provider calls are suspended")]
    CircuitOpen,

    /// Forces the executor to stop retrying regardless of the message content.
    #[error("Non-retryable: {0}")]
    NonRetryable(#[source] Box<ApiError>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error(
        "Generation incomplete: {} artifact(s) missing: {}{}",
        .missing.len(),
        .missing.join(", "),
        format_batch_errors(.batch_errors)
    )]
    IncompleteGeneration {
        missing: Vec<String>,
        batch_errors: Vec<String>,
    },

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

impl ApiError {
    /// Wrap an error so the executor never retries it.
    pub fn non_retryable(err: ApiError) -> Self {
        match err {
            already @ ApiError::NonRetryable(_) => already,
            other => ApiError::NonRetryable(Box::new(other)),
        }
    }

    /// The wrapped error for `NonRetryable`, otherwise `self`.
    pub fn inner(&self) -> &ApiError {
        match self {
            ApiError::NonRetryable(inner) => inner.as_ref(),
            other => other,
        }
    }

    pub fn into_inner(self) -> ApiError {
        match self {
            ApiError::NonRetryable(inner) => *inner,
            other => other,
        }
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, ApiError::NonRetryable(_))
    }

    /// Names of artifacts still missing when generation gave up.
    pub fn missing_artifacts(&self) -> Option<&[String]> {
        match self {
            ApiError::IncompleteGeneration { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

fn format_batch_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!("; batch errors: {}", errors.join(" | "))
    }
}
