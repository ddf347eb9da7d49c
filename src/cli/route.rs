//! CLI route: single route table and run context.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_ensure_report, format_status_json, format_status_text};
use crate::config::{AnvilConfig, ConfigLoader};
use crate::error::{ApiError, StorageError};
use crate::generation::{BatchScheduler, FsScanner, PlainPromptRenderer};
use crate::idempotency::IdempotencyStore;
use crate::progress::{FanoutSink, ProgressSink, ProgressStore, TracingProgressSink};
use crate::provider::{CallContext, CommandInvoker};
use crate::resilience::ResilientExecutor;
use crate::workflow::{WorkflowRunner, WorkflowSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace root and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: AnvilConfig,
}

impl RunContext {
    /// Load and validate configuration for the workspace.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load_with_file(&workspace_root, config_path.as_deref())?;
        config.ensure_valid()?;
        Ok(Self::with_config(workspace_root, config))
    }

    pub fn with_config(workspace_root: PathBuf, config: AnvilConfig) -> Self {
        Self {
            workspace_root,
            config,
        }
    }

    pub fn config(&self) -> &AnvilConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        info!(command = command.name(), workspace = %self.workspace_root.display(), "Running command");
        match command {
            Commands::Generate { plan, force } => self.handle_generate(plan, *force),
            Commands::Status { workflow, format } => self.handle_status(workflow, format),
            Commands::Reset { workflow } => self.handle_reset(workflow),
            Commands::Checksum { plan } => {
                let spec = WorkflowSpec::load(&self.resolve(plan))?;
                Ok(spec.input_checksum(&self.config.generation.artifact_extension)?)
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn idempotency_store(&self) -> Result<IdempotencyStore, ApiError> {
        Ok(IdempotencyStore::open(
            self.config.storage.state_dir_in(&self.workspace_root),
        )?)
    }

    fn open_progress_store(&self, create: bool) -> Result<Option<ProgressStore>, StorageError> {
        let path = self.config.storage.progress_db_in(&self.workspace_root);
        if !create && !path.exists() {
            return Ok(None);
        }
        ProgressStore::open(&path).map(Some)
    }

    fn handle_generate(&self, plan: &Path, force: bool) -> Result<String, ApiError> {
        let spec = WorkflowSpec::load(&self.resolve(plan))?;
        let progress = self.open_progress_store(true)?;

        let mut sink = FanoutSink::new(vec![Arc::new(TracingProgressSink) as Arc<dyn ProgressSink>]);
        if let Some(store) = &progress {
            sink.push(Arc::new(store.clone()));
        }
        let sink: Arc<dyn ProgressSink> = Arc::new(sink);

        let invoker = Arc::new(CommandInvoker::new(self.config.agent.clone()));
        let executor = Arc::new(ResilientExecutor::new(invoker, &self.config.resilience));
        let scheduler = BatchScheduler::new(
            executor.clone(),
            Arc::new(FsScanner),
            Arc::new(PlainPromptRenderer::new()),
            self.config.generation.clone(),
        )
        .with_progress(sink);
        let runner = WorkflowRunner::new(self.idempotency_store()?, Arc::new(scheduler));

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::GenerationFailed(format!("Failed to create runtime: {}", e)))?;

        let result = rt.block_on(async {
            let ctx = CallContext::new();
            let cancel = ctx.cancel_token().clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; cancelling generation");
                    cancel.cancel();
                }
            });
            let result = runner.ensure_generated(&ctx, &spec, force).await;
            interrupt.abort();
            result
        });

        if let Some(store) = &progress {
            if let Err(e) = store.flush() {
                warn!(error = %e, "Failed to flush progress events");
            }
        }

        let report = result?;
        let metrics = executor.metrics().snapshot();
        Ok(format_ensure_report(&report, Some(&metrics)))
    }

    fn handle_status(&self, workflow_id: &str, format: &str) -> Result<String, ApiError> {
        let record = self.idempotency_store()?.load(workflow_id)?;
        let latest = match self.open_progress_store(false)? {
            Some(store) => store.latest(workflow_id)?,
            None => None,
        };
        match format {
            "json" => format_status_json(workflow_id, record.as_ref(), latest.as_ref()),
            "text" => Ok(format_status_text(workflow_id, record.as_ref(), latest.as_ref())),
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn handle_reset(&self, workflow_id: &str) -> Result<String, ApiError> {
        let removed = self.idempotency_store()?.delete(workflow_id)?;
        let events = match self.open_progress_store(false)? {
            Some(store) => {
                let removed = store.delete_workflow(workflow_id)?;
                store.flush()?;
                removed
            }
            None => 0,
        };
        if removed {
            Ok(format!(
                "Removed generation record for workflow {} ({} progress event(s))",
                workflow_id, events
            ))
        } else {
            Ok(format!("No generation record for workflow {}", workflow_id))
        }
    }
}
