//! Retry state machine.
//!
//! `step` is pure: given the policy, the current state and the class of the
//! latest failure it returns the next state and what to do. Sleeping and
//! cancellation belong to the executor.

use crate::resilience::classify::ErrorClass;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            max_retries,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier,
        }
    }

    /// Policy that never waits; used when delays are irrelevant.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO, 1.0)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based):
    /// `min(initial * multiplier^(retry - 1), max)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let scaled_nanos = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !scaled_nanos.is_finite() || scaled_nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(scaled_nanos as u64)
    }
}

/// Progress through one call's attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryState {
    /// Attempts that have already failed
    pub failed_attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1-based number of the attempt about to run.
    pub fn next_attempt(&self) -> u32 {
        self.failed_attempts + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ForcedPermanent,
    Permanent,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Stop(StopReason),
}

/// Advance the state machine after a failed attempt.
pub fn step(policy: &RetryPolicy, state: RetryState, class: ErrorClass) -> (RetryState, RetryDecision) {
    let next = RetryState {
        failed_attempts: state.failed_attempts.saturating_add(1),
    };
    let decision = match class {
        ErrorClass::ForcedPermanent => RetryDecision::Stop(StopReason::ForcedPermanent),
        ErrorClass::Permanent => RetryDecision::Stop(StopReason::Permanent),
        ErrorClass::Transient if next.failed_attempts >= policy.max_attempts() => {
            RetryDecision::Stop(StopReason::Exhausted)
        }
        ErrorClass::Transient => RetryDecision::Retry {
            delay: policy.delay_for_retry(next.failed_attempts),
        },
    };
    (next, decision)
}
