//! Resilient executor: one agent call guarded by a circuit breaker and a
//! bounded retry loop.

use crate::error::ApiError;
use crate::provider::{AgentInvoker, CallContext, InvocationOutput, InvocationRequest};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::classify::classify;
use crate::resilience::clock::{Sleeper, TokioSleeper};
use crate::resilience::metrics::ExecutionMetrics;
use crate::resilience::retry::{step, RetryDecision, RetryPolicy, RetryState};
use crate::resilience::ResilienceConfig;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

pub struct ResilientExecutor {
    invoker: Arc<dyn AgentInvoker>,
    enabled: bool,
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<ExecutionMetrics>,
    sleeper: Arc<dyn Sleeper>,
}

impl ResilientExecutor {
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: &ResilienceConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.circuit_failure_threshold,
            config.circuit_reset_timeout(),
        ));
        Self {
            invoker,
            enabled: config.enabled,
            policy: config.retry_policy(),
            breaker,
            metrics: Arc::new(ExecutionMetrics::new()),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Share a breaker across executors that call the same upstream.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ExecutionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn metrics(&self) -> &Arc<ExecutionMetrics> {
        &self.metrics
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute(
        &self,
        ctx: &CallContext,
        request: InvocationRequest,
    ) -> Result<InvocationOutput, ApiError> {
        if !self.enabled {
            let started = Instant::now();
            let result = self.invoker.invoke(request).await;
            self.metrics.record_attempt(started.elapsed(), result.is_ok());
            return result;
        }

        let mut state = RetryState::new();
        loop {
            ctx.check()?;
            if !self.breaker.allow_request() {
                debug!(invoker = self.invoker.name(), "Circuit open; skipping agent call");
                return Err(ApiError::CircuitOpen);
            }

            let attempt = state.next_attempt();
            debug!(
                invoker = self.invoker.name(),
                attempt,
                max_attempts = self.policy.max_attempts(),
                "Invoking agent"
            );

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = ctx.done() => Err(ApiError::Cancelled),
                result = self.invoker.invoke(request.clone()) => result,
            };
            self.metrics.record_attempt(started.elapsed(), result.is_ok());

            let err = match result {
                Ok(output) => {
                    self.breaker.record_success();
                    return Ok(output);
                }
                Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
                Err(err) => err,
            };

            let class = classify(&err);
            let (next, decision) = step(&self.policy, state, class);
            state = next;
            match decision {
                RetryDecision::Retry { delay } => {
                    warn!(
                        invoker = self.invoker.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Agent call failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = ctx.done() => return Err(ApiError::Cancelled),
                        _ = self.sleeper.sleep(delay) => {}
                    }
                }
                RetryDecision::Stop(reason) => {
                    let opened = self.breaker.record_failure();
                    error!(
                        invoker = self.invoker.name(),
                        attempt,
                        reason = ?reason,
                        class = ?class,
                        circuit_opened = opened,
                        error = %err,
                        "Agent call failed permanently"
                    );
                    return Err(err);
                }
            }
        }
    }
}
