//! Adaptive batch scheduler.
//!
//! Drives rounds of (split missing work into batches, one resilient agent
//! call per batch, scan the destination). A failed batch is recorded and the
//! round goes on. Between rounds the batch size halves, down to 1. The
//! decision to continue always uses a scan taken after the round's last call.

use crate::error::{ApiError, StorageError};
use crate::generation::manifest::{ExpectedArtifact, Manifest};
use crate::generation::prompt::{BatchPrompt, PromptRenderer};
use crate::generation::scan::DestinationScanner;
use crate::generation::tracker::{GenerationTracker, Observation, StalePolicy};
use crate::progress::{ArtifactDescriptor, ProgressReporter, ProgressSink, ProgressStage};
use crate::provider::{CallContext, InvocationRequest, OutputFormat, ReasoningEffort};
use crate::resilience::ResilientExecutor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hard ceiling on artifacts per agent call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Extra rounds after the first (rounds = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-call timeout when the caller has no deadline, and the cap when it does
    #[serde(default = "default_fallback_timeout_secs")]
    pub fallback_timeout_secs: u64,

    /// Empty means the agent's own default
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,

    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    #[serde(default)]
    pub stale_policy: StalePolicy,

    /// Subtracted from the attempt start to absorb coarse filesystem mtimes
    #[serde(default = "default_mtime_tolerance_ms")]
    pub mtime_tolerance_ms: u64,
}

fn default_max_batch_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    2
}

fn default_fallback_timeout_secs() -> u64 {
    600
}

fn default_artifact_extension() -> String {
    "md".to_string()
}

fn default_mtime_tolerance_ms() -> u64 {
    1_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_retries: default_max_retries(),
            fallback_timeout_secs: default_fallback_timeout_secs(),
            model: String::new(),
            output_format: OutputFormat::default(),
            reasoning_effort: None,
            artifact_extension: default_artifact_extension(),
            stale_policy: StalePolicy::default(),
            mtime_tolerance_ms: default_mtime_tolerance_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }

    pub fn mtime_tolerance(&self) -> Duration {
        Duration::from_millis(self.mtime_tolerance_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be at least 1".to_string());
        }
        if self.fallback_timeout_secs == 0 {
            return Err("fallback_timeout_secs must be greater than 0".to_string());
        }
        let ext = self.artifact_extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(format!(
                "artifact_extension '{}' is not a usable file extension",
                self.artifact_extension
            ));
        }
        Ok(())
    }
}

/// One generation attempt for a workflow
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub workflow_id: String,
    pub output_dir: PathBuf,
    pub manifest: Manifest,
    /// Accept matching files already on disk before the first round
    pub reuse_existing: bool,
}

impl GenerationJob {
    pub fn new(workflow_id: impl Into<String>, output_dir: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            output_dir: output_dir.into(),
            manifest,
            reuse_existing: true,
        }
    }

    pub fn with_reuse_existing(mut self, reuse: bool) -> Self {
        self.reuse_existing = reuse;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Name the manifest asked for
    pub manifest_key: String,
    /// Name actually written, which may differ through fuzzy matching
    pub file_name: String,
    pub path: PathBuf,
    pub task_id: String,
    pub is_main: bool,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// In manifest order
    pub artifacts: Vec<GeneratedArtifact>,
    /// Rounds that invoked the agent; 0 when the pre-scan found everything
    pub rounds: u32,
    /// Artifacts accepted by the pre-scan
    pub reused: usize,
    /// Failures of batches that did not stop the attempt
    pub batch_errors: Vec<String>,
}

pub struct BatchScheduler {
    executor: Arc<ResilientExecutor>,
    scanner: Arc<dyn DestinationScanner>,
    renderer: Arc<dyn PromptRenderer>,
    progress: Option<Arc<dyn ProgressSink>>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(
        executor: Arc<ResilientExecutor>,
        scanner: Arc<dyn DestinationScanner>,
        renderer: Arc<dyn PromptRenderer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            scanner,
            renderer,
            progress: None,
            config,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }

    pub async fn run(
        &self,
        ctx: &CallContext,
        job: &GenerationJob,
    ) -> Result<GenerationOutcome, ApiError> {
        let tolerance = chrono::Duration::from_std(self.config.mtime_tolerance())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let started_at = Utc::now() - tolerance;
        let mut tracker = GenerationTracker::from_manifest(&job.manifest, started_at)
            .with_extension(&self.config.artifact_extension)
            .with_stale_policy(self.config.stale_policy);
        let reporter = ProgressReporter::new(
            self.progress.clone(),
            job.workflow_id.clone(),
            job.manifest.len(),
        );

        match self.run_rounds(ctx, job, &mut tracker, &reporter).await {
            Ok(outcome) => {
                reporter.report(
                    ProgressStage::Completed,
                    tracker.observed_count(),
                    None,
                    format!("{} artifact(s) generated", outcome.artifacts.len()),
                );
                info!(
                    workflow_id = %job.workflow_id,
                    artifacts = outcome.artifacts.len(),
                    rounds = outcome.rounds,
                    reused = outcome.reused,
                    "Generation complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                reporter.report(
                    ProgressStage::Failed,
                    tracker.observed_count(),
                    None,
                    err.to_string(),
                );
                warn!(workflow_id = %job.workflow_id, error = %err, "Generation failed");
                Err(err)
            }
        }
    }

    async fn run_rounds(
        &self,
        ctx: &CallContext,
        job: &GenerationJob,
        tracker: &mut GenerationTracker,
        reporter: &ProgressReporter,
    ) -> Result<GenerationOutcome, ApiError> {
        let scanner = self.scanner.as_ref();
        let reused = if job.reuse_existing {
            tracker.pre_scan(scanner, &job.output_dir)?.len()
        } else {
            0
        };
        reporter.report(
            ProgressStage::Started,
            tracker.observed_count(),
            None,
            format!("{reused} artifact(s) already present"),
        );
        info!(
            workflow_id = %job.workflow_id,
            expected = job.manifest.len(),
            reused,
            "Starting generation"
        );

        let max_attempts = self.config.max_attempts();
        let mut batch_size = self.config.max_batch_size.max(1);
        let mut batch_errors = Vec::new();
        let mut rounds = 0u32;

        for round in 1..=max_attempts {
            let pending = pending_artifacts(&job.manifest, tracker);
            if pending.is_empty() {
                break;
            }
            ctx.check()?;
            if rounds == 0 {
                std::fs::create_dir_all(&job.output_dir).map_err(StorageError::from)?;
            }
            rounds = round;

            let batches: Vec<&[ExpectedArtifact]> = pending.chunks(batch_size).collect();
            info!(
                workflow_id = %job.workflow_id,
                round,
                max_attempts,
                missing = pending.len(),
                batch_size,
                batches = batches.len(),
                "Starting generation round"
            );
            reporter.report(
                ProgressStage::RoundStarted,
                tracker.observed_count(),
                None,
                format!("round {round}: {} artifact(s) missing", pending.len()),
            );

            for (index, batch) in batches.iter().enumerate() {
                let batch_no = index + 1;
                reporter.report(
                    ProgressStage::BatchStarted,
                    tracker.observed_count(),
                    None,
                    format!("round {round} batch {batch_no}: {} artifact(s)", batch.len()),
                );

                match self.invoke_batch(ctx, job, batch, round).await {
                    Ok(()) => {
                        debug!(workflow_id = %job.workflow_id, round, batch = batch_no, "Batch completed");
                        reporter.report(
                            ProgressStage::BatchCompleted,
                            tracker.observed_count(),
                            None,
                            format!("round {round} batch {batch_no} completed"),
                        );
                    }
                    Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
                    Err(err) => {
                        warn!(
                            workflow_id = %job.workflow_id,
                            round,
                            batch = batch_no,
                            error = %err,
                            "Batch failed; continuing with the rest of the round"
                        );
                        let message = format!("round {round} batch {batch_no}: {err}");
                        reporter.report(
                            ProgressStage::BatchFailed,
                            tracker.observed_count(),
                            None,
                            message.clone(),
                        );
                        batch_errors.push(message);
                    }
                }
            }

            self.scan_and_report(job, tracker, reporter)?;

            if !tracker.is_complete() && round < max_attempts {
                let next = (batch_size / 2).max(1);
                if next != batch_size {
                    debug!(workflow_id = %job.workflow_id, from = batch_size, to = next, "Shrinking batch size");
                }
                batch_size = next;
            }
        }

        self.scan_and_report(job, tracker, reporter)?;
        let missing = tracker.missing_files();
        if !missing.is_empty() {
            return Err(ApiError::IncompleteGeneration {
                missing,
                batch_errors,
            });
        }

        let artifacts = job
            .manifest
            .artifacts()
            .iter()
            .filter_map(|expected| {
                tracker
                    .observation(&expected.file_name)
                    .map(|obs| generated(job, expected, obs))
            })
            .collect();

        Ok(GenerationOutcome {
            artifacts,
            rounds,
            reused,
            batch_errors,
        })
    }

    async fn invoke_batch(
        &self,
        ctx: &CallContext,
        job: &GenerationJob,
        batch: &[ExpectedArtifact],
        round: u32,
    ) -> Result<(), ApiError> {
        let timeout = ctx.timeout_for(self.config.fallback_timeout());
        if timeout.is_zero() {
            return Err(ApiError::Cancelled);
        }
        let prompt = self.renderer.render(&BatchPrompt {
            workflow_id: &job.workflow_id,
            output_dir: &job.output_dir,
            artifacts: batch,
            round,
        });
        let request = InvocationRequest {
            prompt,
            model: self.config.model.clone(),
            output_format: self.config.output_format,
            timeout,
            working_dir: job.output_dir.clone(),
            reasoning_effort: self.config.reasoning_effort,
        };
        self.executor.execute(ctx, request).await.map(|_| ())
    }

    fn scan_and_report(
        &self,
        job: &GenerationJob,
        tracker: &mut GenerationTracker,
        reporter: &ProgressReporter,
    ) -> Result<(), StorageError> {
        for observation in tracker.scan(self.scanner.as_ref(), &job.output_dir)? {
            let descriptor = job
                .manifest
                .get(&observation.manifest_key)
                .map(|expected| ArtifactDescriptor {
                    file_name: observation.file_name.clone(),
                    task_id: expected.task_id.clone(),
                    is_main: expected.is_main,
                });
            reporter.report(
                ProgressStage::FileObserved,
                tracker.observed_count(),
                descriptor,
                format!("observed {}", observation.file_name),
            );
        }
        Ok(())
    }
}

/// Manifest entries with no observation, in manifest order.
fn pending_artifacts(manifest: &Manifest, tracker: &GenerationTracker) -> Vec<ExpectedArtifact> {
    let missing: HashSet<String> = tracker.missing_files().into_iter().collect();
    manifest
        .artifacts()
        .iter()
        .filter(|a| missing.contains(&a.file_name))
        .cloned()
        .collect()
}

fn generated(job: &GenerationJob, expected: &ExpectedArtifact, obs: &Observation) -> GeneratedArtifact {
    GeneratedArtifact {
        manifest_key: obs.manifest_key.clone(),
        file_name: obs.file_name.clone(),
        path: job.output_dir.join(&obs.file_name),
        task_id: expected.task_id.clone(),
        is_main: expected.is_main,
        observed_at: obs.observed_at,
    }
}
