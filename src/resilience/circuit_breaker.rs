//! Circuit breaker guarding the external agent call.
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → HalfOpen: reset timeout elapsed since the last failure (checked in allow_request)
//! HalfOpen → Closed: success
//! HalfOpen → Open: failure
//! ```
//!
//! State lives in memory for the lifetime of the executor that owns it.

use crate::resilience::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    reset_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Zero threshold or zero timeout fall back to the defaults.
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self::with_clock(threshold, reset_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(threshold: u32, reset_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        let threshold = if threshold == 0 {
            DEFAULT_FAILURE_THRESHOLD
        } else {
            threshold
        };
        let reset_timeout = if reset_timeout.is_zero() {
            DEFAULT_RESET_TIMEOUT
        } else {
            reset_timeout
        };
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
            threshold,
            reset_timeout,
            clock,
        }
    }

    /// Record a failed call. Returns true when this failure opened the breaker.
    pub fn record_failure(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(now);

        let should_open = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if should_open {
            let from = inner.state;
            inner.state = CircuitState::Open;
            warn!(
                from = %from,
                consecutive_failures = inner.consecutive_failures,
                threshold = self.threshold,
                "Circuit breaker opened"
            );
        }
        should_open
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            info!("Circuit breaker closed after successful probe");
        }
    }

    /// Whether a call may proceed. An open breaker whose reset timeout has
    /// elapsed moves to half-open and lets the call through.
    pub fn allow_request(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!(
                        open_for_ms = elapsed.as_millis() as u64,
                        "Circuit breaker half-open; allowing probe request"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .field("threshold", &self.threshold)
            .field("reset_timeout", &self.reset_timeout)
            .finish()
    }
}
