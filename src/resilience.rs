//! Resilience for external agent calls
//!
//! Request to the agent:
//! ```text
//!     → circuit_breaker.rs (fail fast while the upstream is unhealthy)
//!     → provider invocation (timeout derived from the caller's deadline)
//!     → classify.rs (transient or permanent?)
//!     → retry.rs (pure step: retry after a backoff delay, or stop)
//!     → metrics.rs (every attempt counted, success or not)
//! ```

pub mod circuit_breaker;
pub mod classify;
pub mod clock;
pub mod executor;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use classify::{classify, is_transient_message, ErrorClass};
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use executor::ResilientExecutor;
pub use metrics::{ExecutionMetrics, MetricsSnapshot};
pub use retry::{RetryDecision, RetryPolicy, RetryState, StopReason};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resilience settings for the executor wrapping each agent call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// When false the agent is called exactly once with no breaker and no retry
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retries after the first attempt (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Consecutive failures before the breaker opens
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// Seconds the breaker stays open before letting a probe through
    #[serde(default = "default_circuit_reset_timeout_secs")]
    pub circuit_reset_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_circuit_failure_threshold() -> u32 {
    circuit_breaker::DEFAULT_FAILURE_THRESHOLD
}

fn default_circuit_reset_timeout_secs() -> u64 {
    circuit_breaker::DEFAULT_RESET_TIMEOUT.as_secs()
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_reset_timeout_secs: default_circuit_reset_timeout_secs(),
        }
    }
}

impl ResilienceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }

    pub fn circuit_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_reset_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite number >= 1.0 (got {})",
                self.backoff_multiplier
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(format!(
                "max_delay_ms ({}) must not be smaller than initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            ));
        }
        Ok(())
    }
}
