//! Workflow runner: "ensure artifacts for workflow W are generated".
//!
//! Consults the idempotency store before anything else; the scheduler only
//! runs when inputs changed, a previous attempt did not complete, or the
//! caller forces regeneration.

use crate::error::{ApiError, StorageError};
use crate::generation::{BatchScheduler, GenerationJob, GenerationOutcome, Manifest, TaskSpec};
use crate::idempotency::{compute_workflow_checksum, file_checksum, GenerationRecord, IdempotencyStore};
use crate::provider::CallContext;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A workflow plan, usually read from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub workflow_id: String,
    #[serde(default)]
    pub primary_input: Option<PathBuf>,
    #[serde(default)]
    pub secondary_inputs: Vec<PathBuf>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    pub output_dir: PathBuf,
}

impl WorkflowSpec {
    /// Parse a plan file. Relative paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ApiError::ConfigError(format!("Failed to read plan {}: {}", path.display(), e))
        })?;
        let mut spec: WorkflowSpec = toml::from_str(&raw).map_err(|e| {
            ApiError::ConfigError(format!("Failed to parse plan {}: {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        spec.resolve_paths(base);
        spec.validate()?;
        Ok(spec)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        self.primary_input = self.primary_input.as_ref().map(resolve);
        self.secondary_inputs = self.secondary_inputs.iter().map(resolve).collect();
        self.output_dir = resolve(&self.output_dir);
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.workflow_id.trim().is_empty() {
            return Err(ApiError::ConfigError(
                "workflow_id cannot be empty".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ApiError::ConfigError(
                "output_dir cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Checksum over the input files and the task list, so editing either
    /// invalidates a completed record.
    pub fn input_checksum(&self, extension: &str) -> Result<String, StorageError> {
        let plan = serde_json::to_vec(&(extension, &self.tasks))?;
        compute_workflow_checksum(self.primary_input.as_deref(), &self.secondary_inputs, &plan)
    }
}

#[derive(Debug, Clone)]
pub struct EnsureReport {
    pub record: GenerationRecord,
    /// True when a complete record matched and nothing was generated
    pub reused: bool,
    pub rounds: u32,
    pub batch_errors: Vec<String>,
}

impl EnsureReport {
    pub fn file_names(&self) -> Vec<String> {
        self.record.file_names()
    }
}

pub struct WorkflowRunner {
    store: IdempotencyStore,
    scheduler: Arc<BatchScheduler>,
}

impl WorkflowRunner {
    pub fn new(store: IdempotencyStore, scheduler: Arc<BatchScheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn store(&self) -> &IdempotencyStore {
        &self.store
    }

    pub async fn ensure_generated(
        &self,
        ctx: &CallContext,
        spec: &WorkflowSpec,
        force: bool,
    ) -> Result<EnsureReport, ApiError> {
        spec.validate()?;
        let extension = &self.scheduler.config().artifact_extension;
        let manifest = Manifest::build(&spec.tasks, extension)?;
        let checksum = spec.input_checksum(extension)?;
        let (stored, existing) = self
            .store
            .get_or_create_record(&spec.workflow_id, &checksum)?;

        if existing && stored.is_complete() && !force {
            info!(
                workflow_id = %spec.workflow_id,
                files = stored.files.len(),
                "Inputs unchanged; reusing generated artifacts"
            );
            return Ok(EnsureReport {
                record: stored,
                reused: true,
                rounds: 0,
                batch_errors: Vec::new(),
            });
        }

        let mut record = GenerationRecord::new(&spec.workflow_id, &checksum);
        if existing {
            // Issues already created for these inputs stay known across regeneration.
            record.issues = stored.issues;
        }
        self.store.save(&record)?;

        let job = GenerationJob::new(&spec.workflow_id, &spec.output_dir, manifest)
            .with_reuse_existing(!force);

        // From here on every failure is written to the record before it is returned.
        let attempt = match self.scheduler.run(ctx, &job).await {
            Ok(outcome) => artifact_checksums(&outcome).map(|sums| (outcome, sums)),
            Err(err) => Err(err),
        };
        let (outcome, checksums) = match attempt {
            Ok(done) => done,
            Err(err) => {
                record.mark_failed(err.to_string());
                if let Err(save_err) = self.store.save(&record) {
                    warn!(
                        workflow_id = %spec.workflow_id,
                        error = %save_err,
                        "Failed to persist failed generation record"
                    );
                }
                return Err(err);
            }
        };

        for (artifact, checksum) in outcome.artifacts.iter().zip(checksums) {
            record.mark_file_generated(
                &artifact.file_name,
                &artifact.task_id,
                artifact.is_main,
                checksum,
            );
        }
        record.mark_complete();
        self.store.save(&record)?;

        Ok(EnsureReport {
            record,
            reused: false,
            rounds: outcome.rounds,
            batch_errors: outcome.batch_errors,
        })
    }

    pub fn status(&self, workflow_id: &str) -> Result<Option<GenerationRecord>, ApiError> {
        Ok(self.store.load(workflow_id)?)
    }

    pub fn reset(&self, workflow_id: &str) -> Result<bool, ApiError> {
        let removed = self.store.delete(workflow_id)?;
        if removed {
            info!(workflow_id, "Generation record removed");
        }
        Ok(removed)
    }
}

/// Content checksums of the generated files, in outcome order.
fn artifact_checksums(outcome: &GenerationOutcome) -> Result<Vec<String>, ApiError> {
    outcome
        .artifacts
        .iter()
        .map(|artifact| file_checksum(&artifact.path).map_err(ApiError::from))
        .collect()
}
