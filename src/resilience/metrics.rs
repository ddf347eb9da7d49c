//! Per-executor call metrics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters for agent calls. Owned by (or injected into) an
/// executor; never reset.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    total_latency_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, latency: Duration, success: bool) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn successful_calls(&self) -> u64 {
        self.successful_calls.load(Ordering::Relaxed)
    }

    pub fn failed_calls(&self) -> u64 {
        self.total_calls().saturating_sub(self.successful_calls())
    }

    /// 0.0 when no calls were made.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        self.successful_calls() as f64 / total as f64
    }

    /// Zero when no calls were made.
    pub fn average_latency(&self) -> Duration {
        let total = self.total_calls();
        if total == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_latency_micros.load(Ordering::Relaxed) / total)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls(),
            successful_calls: self.successful_calls(),
            failed_calls: self.failed_calls(),
            success_rate: self.success_rate(),
            average_latency_ms: self.average_latency().as_secs_f64() * 1000.0,
        }
    }
}
