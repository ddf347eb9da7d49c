//! Circuit breaker behaviour seen through the executor and the scheduler.

use super::test_utils::{resilience_without_delay, scheduler, Script, ScriptedInvoker};
use anvil::error::ApiError;
use anvil::generation::{GenerationJob, Manifest, SchedulerConfig, TaskSpec};
use anvil::provider::{CallContext, InvocationRequest, OutputFormat};
use anvil::resilience::{CircuitBreaker, CircuitState, Clock, ResilienceConfig, ResilientExecutor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

fn request(dir: &TempDir) -> InvocationRequest {
    InvocationRequest {
        prompt: "- 00-overview.md\n".to_string(),
        model: String::new(),
        output_format: OutputFormat::Text,
        timeout: Duration::from_secs(5),
        working_dir: dir.path().to_path_buf(),
        reasoning_effort: None,
    }
}

#[tokio::test]
async fn shared_breaker_blocks_every_executor_until_reset() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let breaker = Arc::new(CircuitBreaker::with_clock(2, Duration::from_secs(30), clock.clone()));
    let config = resilience_without_delay(0);

    let failing = ScriptedInvoker::with_fallback(Vec::new(), Script::Fail("model rejected prompt"));
    let healthy = ScriptedInvoker::new(Vec::new());
    let a = ResilientExecutor::new(failing.clone(), &config).with_breaker(breaker.clone());
    let b = ResilientExecutor::new(healthy.clone(), &config).with_breaker(breaker.clone());
    let ctx = CallContext::new();

    assert!(a.execute(&ctx, request(&dir)).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(a.execute(&ctx, request(&dir)).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);

    let blocked = b.execute(&ctx, request(&dir)).await;
    assert!(matches!(blocked, Err(ApiError::CircuitOpen)));
    assert_eq!(healthy.calls(), 0);

    clock.advance(Duration::from_secs(30));
    assert!(b.execute(&ctx, request(&dir)).await.is_ok());
    assert_eq!(healthy.calls(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test]
async fn failed_probe_reopens_the_breaker() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let breaker = Arc::new(CircuitBreaker::with_clock(1, Duration::from_secs(10), clock.clone()));
    let invoker = ScriptedInvoker::with_fallback(Vec::new(), Script::Fail("model rejected prompt"));
    let executor = ResilientExecutor::new(invoker.clone(), &resilience_without_delay(0))
        .with_breaker(breaker.clone());
    let ctx = CallContext::new();

    assert!(executor.execute(&ctx, request(&dir)).await.is_err());
    assert!(breaker.is_open());

    clock.advance(Duration::from_secs(10));
    assert!(executor.execute(&ctx, request(&dir)).await.is_err());
    assert_eq!(invoker.calls(), 2);
    assert!(breaker.is_open());

    clock.advance(Duration::from_secs(5));
    let blocked = executor.execute(&ctx, request(&dir)).await;
    assert!(matches!(blocked, Err(ApiError::CircuitOpen)));
    assert_eq!(invoker.calls(), 2);
}

#[tokio::test]
async fn open_breaker_fails_remaining_batches_without_calling_the_agent() {
    let dir = TempDir::new().unwrap();
    let tasks = vec![
        TaskSpec {
            id: "lex".to_string(),
            title: "Lexer".to_string(),
            description: String::new(),
        },
        TaskSpec {
            id: "parse".to_string(),
            title: "Parser".to_string(),
            description: String::new(),
        },
    ];
    let job = GenerationJob::new(
        "breaker",
        dir.path().join("out"),
        Manifest::build(&tasks, "md").unwrap(),
    );
    let invoker = ScriptedInvoker::with_fallback(Vec::new(), Script::Fail("model rejected prompt"));
    let resilience = ResilienceConfig {
        circuit_failure_threshold: 1,
        ..resilience_without_delay(0)
    };
    let config = SchedulerConfig {
        max_batch_size: 1,
        max_retries: 0,
        ..SchedulerConfig::default()
    };
    let (scheduler, executor) = scheduler(invoker.clone(), &resilience, config);

    let err = scheduler.run(&CallContext::new(), &job).await.unwrap_err();

    assert_eq!(invoker.calls(), 1);
    assert!(executor.breaker().is_open());
    match err {
        ApiError::IncompleteGeneration {
            missing,
            batch_errors,
        } => {
            assert_eq!(missing.len(), 3);
            assert_eq!(batch_errors.len(), 3);
            assert!(batch_errors[0].contains("model rejected prompt"));
            assert!(batch_errors[1].contains("Circuit breaker is open"));
            assert!(batch_errors[2].contains("Circuit breaker is open"));
        }
        other => panic!("expected IncompleteGeneration, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_run_stops_before_any_call() {
    let dir = TempDir::new().unwrap();
    let job = GenerationJob::new(
        "cancelled",
        dir.path().join("out"),
        Manifest::build(&[], "md").unwrap(),
    );
    let invoker = ScriptedInvoker::new(Vec::new());
    let (scheduler, _) = scheduler(invoker.clone(), &resilience_without_delay(0), SchedulerConfig::default());
    let ctx = CallContext::new();
    ctx.cancel();

    let result = scheduler.run(&ctx, &job).await;
    assert!(matches!(result, Err(ApiError::Cancelled)));
    assert_eq!(invoker.calls(), 0);
}
