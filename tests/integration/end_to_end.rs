//! Full generation flow: transient agent failure, progress stream, and
//! checksum-based reuse through the workflow runner.

use super::test_utils::{resilience_without_delay, scheduler, CollectingSink, Script, ScriptedInvoker};
use anvil::generation::{GenerationJob, Manifest, SchedulerConfig, TaskSpec};
use anvil::idempotency::IdempotencyStore;
use anvil::progress::{FanoutSink, ProgressSink, ProgressStage, ProgressStore};
use anvil::provider::CallContext;
use anvil::resilience::{CircuitState, ResilienceConfig};
use anvil::workflow::{WorkflowRunner, WorkflowSpec};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const UNAVAILABLE: &str = "503 service unavailable";

fn two_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            id: "task-1".to_string(),
            title: "Parser".to_string(),
            description: "Tokenize the input".to_string(),
        },
        TaskSpec {
            id: "task-2".to_string(),
            title: "Emitter".to_string(),
            description: String::new(),
        },
    ]
}

fn batch_of_two() -> SchedulerConfig {
    SchedulerConfig {
        max_batch_size: 2,
        max_retries: 2,
        ..SchedulerConfig::default()
    }
}

#[tokio::test]
async fn transient_batch_failure_is_recovered_in_the_next_round() {
    let dir = TempDir::new().unwrap();
    let job = GenerationJob::new(
        "e2e",
        dir.path().join("out"),
        Manifest::build(&two_tasks(), "md").unwrap(),
    );

    // Batch 1 succeeds; batch 2 fails on both of its attempts; round 2 succeeds.
    let invoker = ScriptedInvoker::new(vec![
        Script::WriteAll,
        Script::Fail(UNAVAILABLE),
        Script::Fail(UNAVAILABLE),
        Script::WriteAll,
    ]);
    let collect = Arc::new(CollectingSink::default());
    let store = ProgressStore::open(&dir.path().join("progress")).unwrap();
    let sink = FanoutSink::new(vec![
        collect.clone() as Arc<dyn ProgressSink>,
        Arc::new(store.clone()) as Arc<dyn ProgressSink>,
    ]);
    let (scheduler, executor) = scheduler(invoker.clone(), &resilience_without_delay(1), batch_of_two());
    let scheduler = scheduler.with_progress(Arc::new(sink));

    let outcome = scheduler.run(&CallContext::new(), &job).await.unwrap();

    assert_eq!(outcome.rounds, 2);
    let names: Vec<_> = outcome.artifacts.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["00-overview.md", "01-task-1.md", "02-task-2.md"]);
    assert_eq!(outcome.batch_errors.len(), 1);
    assert!(outcome.batch_errors[0].starts_with("round 1 batch 2:"));

    let prompts = invoker.prompts.lock().clone();
    assert_eq!(prompts.len(), 4);
    assert_eq!(prompts[0], vec!["00-overview.md", "01-task-1.md"]);
    assert_eq!(prompts[3], vec!["02-task-2.md"]);

    let metrics = executor.metrics().snapshot();
    assert_eq!(metrics.total_calls, 4);
    assert_eq!(metrics.successful_calls, 2);
    assert_eq!(metrics.failed_calls, 2);
    assert_eq!(executor.breaker().state(), CircuitState::Closed);
    assert_eq!(executor.breaker().failure_count(), 0);

    let updates = collect.updates.lock().clone();
    assert!(updates.windows(2).all(|w| w[0].current <= w[1].current));
    assert!(updates.iter().all(|u| u.total == 3));
    assert!(updates.iter().any(|u| u.stage == ProgressStage::BatchFailed));
    let last = updates.last().unwrap();
    assert_eq!(last.stage, ProgressStage::Completed);
    assert_eq!(last.current, 3);

    let observed: BTreeSet<_> = updates
        .iter()
        .filter(|u| u.stage == ProgressStage::FileObserved)
        .filter_map(|u| u.artifact.as_ref().map(|a| a.file_name.clone()))
        .collect();
    assert_eq!(observed.len(), 3);

    let events = store.read_events("e2e").unwrap();
    assert_eq!(events.len(), updates.len());
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(store.latest("e2e").unwrap().unwrap().update.stage, ProgressStage::Completed);
}

fn plan(dir: &TempDir) -> WorkflowSpec {
    let input = dir.path().join("plan.md");
    fs::write(&input, "# Plan\n\nBuild a parser and an emitter.\n").unwrap();
    WorkflowSpec {
        workflow_id: "e2e".to_string(),
        primary_input: Some(input),
        secondary_inputs: Vec::new(),
        tasks: two_tasks(),
        output_dir: dir.path().join("out"),
    }
}

fn runner(dir: &TempDir, invoker: Arc<ScriptedInvoker>, resilience: &ResilienceConfig) -> WorkflowRunner {
    let (scheduler, _) = scheduler(invoker, resilience, batch_of_two());
    let store = IdempotencyStore::open(dir.path().join("state")).unwrap();
    WorkflowRunner::new(store, Arc::new(scheduler))
}

#[tokio::test]
async fn unchanged_inputs_skip_the_agent_entirely() {
    let dir = TempDir::new().unwrap();
    let spec = plan(&dir);
    let invoker = ScriptedInvoker::new(Vec::new());
    let runner = runner(&dir, invoker.clone(), &resilience_without_delay(0));
    let ctx = CallContext::new();

    let first = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    assert!(!first.reused);
    assert!(first.record.is_complete());
    assert_eq!(first.file_names().len(), 3);
    let calls = invoker.calls();
    assert_eq!(calls, 2);

    let second = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    assert!(second.reused);
    assert_eq!(second.record.input_checksum, first.record.input_checksum);
    assert_eq!(invoker.calls(), calls);

    let stored = runner.status("e2e").unwrap().unwrap();
    assert!(stored.is_complete());
    assert_eq!(stored.file("01-task-1.md").unwrap().task_id, "task-1");
}

#[tokio::test]
async fn changed_inputs_start_a_new_record_and_force_regenerates() {
    let dir = TempDir::new().unwrap();
    let spec = plan(&dir);
    let invoker = ScriptedInvoker::new(Vec::new());
    let runner = runner(&dir, invoker.clone(), &resilience_without_delay(0));
    let ctx = CallContext::new();

    let first = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    let calls = invoker.calls();

    fs::write(spec.primary_input.as_ref().unwrap(), "# Plan\n\nAlso a linker.\n").unwrap();
    let changed = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    assert!(!changed.reused);
    assert_ne!(changed.record.input_checksum, first.record.input_checksum);
    // Files already on disk are picked up by the pre-scan.
    assert_eq!(invoker.calls(), calls);
    assert_eq!(changed.file_names().len(), 3);

    let forced = runner.ensure_generated(&ctx, &spec, true).await.unwrap();
    assert!(!forced.reused);
    assert_eq!(forced.rounds, 1);
    assert_eq!(invoker.calls(), calls + 2);

    assert!(runner.reset("e2e").unwrap());
    assert!(runner.status("e2e").unwrap().is_none());
}

#[tokio::test]
async fn failed_generation_is_recorded_and_retried_on_next_call() {
    let dir = TempDir::new().unwrap();
    let spec = plan(&dir);
    // Rounds of two, three and three batches; every call is rejected.
    let invoker = ScriptedInvoker::new(vec![Script::Fail("invalid request: prompt rejected"); 8]);
    let resilience = ResilienceConfig {
        circuit_failure_threshold: 100,
        ..resilience_without_delay(0)
    };
    let runner = runner(&dir, invoker.clone(), &resilience);
    let ctx = CallContext::new();

    let err = runner.ensure_generated(&ctx, &spec, false).await.unwrap_err();
    assert!(err.to_string().contains("00-overview.md"));

    let stored = runner.status("e2e").unwrap().unwrap();
    assert!(!stored.is_complete());
    assert!(!stored.last_error.is_empty());

    let retried = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    assert!(!retried.reused);
    assert!(retried.record.is_complete());
    assert!(retried.record.last_error.is_empty());
}

#[tokio::test]
async fn adding_a_task_invalidates_the_completed_record() {
    let dir = TempDir::new().unwrap();
    let mut spec = plan(&dir);
    let invoker = ScriptedInvoker::new(Vec::new());
    let runner = runner(&dir, invoker.clone(), &resilience_without_delay(0));
    let ctx = CallContext::new();

    let first = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    let calls = invoker.calls();

    spec.tasks.push(TaskSpec {
        id: "task-3".to_string(),
        title: "Linker".to_string(),
        description: String::new(),
    });
    let extended = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    assert!(!extended.reused);
    assert_ne!(extended.record.input_checksum, first.record.input_checksum);
    assert!(extended.record.is_complete());
    assert_eq!(extended.file_names().len(), 4);
    assert!(spec.output_dir.join("03-task-3.md").exists());
    // Only the new artifact is requested; the rest come from the pre-scan.
    assert_eq!(invoker.calls(), calls + 1);

    spec.tasks[2].title = "Loader".to_string();
    let retitled = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    assert!(!retitled.reused);
}

#[tokio::test]
async fn invalid_plan_leaves_the_stored_record_untouched() {
    let dir = TempDir::new().unwrap();
    let mut spec = plan(&dir);
    let invoker = ScriptedInvoker::new(Vec::new());
    let runner = runner(&dir, invoker.clone(), &resilience_without_delay(0));
    let ctx = CallContext::new();

    let first = runner.ensure_generated(&ctx, &spec, false).await.unwrap();
    let calls = invoker.calls();

    spec.tasks.push(TaskSpec {
        id: "main".to_string(),
        title: "Clashes with the overview".to_string(),
        description: String::new(),
    });
    for force in [false, true] {
        let err = runner.ensure_generated(&ctx, &spec, force).await.unwrap_err();
        assert!(matches!(err, anvil::ApiError::InvalidManifest(_)), "{}", err);
    }

    let stored = runner.status("e2e").unwrap().unwrap();
    assert!(stored.is_complete());
    assert_eq!(stored.input_checksum, first.record.input_checksum);
    assert_eq!(stored.files.len(), 3);
    assert_eq!(invoker.calls(), calls);
}
