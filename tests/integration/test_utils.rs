//! Shared test utilities for integration tests
//!
//! Scripted agent invokers and environment isolation for config loading.

use anvil::error::ApiError;
use anvil::generation::{BatchScheduler, FsScanner, PlainPromptRenderer, SchedulerConfig};
use anvil::progress::{ProgressSink, ProgressUpdate};
use anvil::provider::{AgentInvoker, InvocationOutput, InvocationRequest};
use anvil::resilience::{ResilienceConfig, ResilientExecutor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Serializes tests that touch process-wide environment variables
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "ANVIL_ENV",
    "ANVIL__GENERATION__MAX_BATCH_SIZE",
];

/// File names listed in a plain prompt, in prompt order.
pub fn listed_files(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|l| l.strip_prefix("- "))
        .map(|l| l.trim().to_string())
        .collect()
}

/// Resilience settings with no waiting between retries.
pub fn resilience_without_delay(max_retries: u32) -> ResilienceConfig {
    ResilienceConfig {
        max_retries,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        ..ResilienceConfig::default()
    }
}

pub fn scheduler(
    invoker: Arc<dyn AgentInvoker>,
    resilience: &ResilienceConfig,
    config: SchedulerConfig,
) -> (BatchScheduler, Arc<ResilientExecutor>) {
    let executor = Arc::new(ResilientExecutor::new(invoker, resilience));
    let scheduler = BatchScheduler::new(
        executor.clone(),
        Arc::new(FsScanner),
        Arc::new(PlainPromptRenderer::new()),
        config,
    );
    (scheduler, executor)
}

/// Agent behaviour for one call: which listed files to write, and whether to fail.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    WriteAll,
    WriteFirst,
    Fail(&'static str),
}

/// Writes files named in the prompt into the request's working dir,
/// following a per-call script. Calls past the end of the script use `fallback`.
pub struct ScriptedInvoker {
    script: Mutex<Vec<Script>>,
    fallback: Script,
    pub prompts: Mutex<Vec<Vec<String>>>,
}

impl ScriptedInvoker {
    pub fn new(script: Vec<Script>) -> Arc<Self> {
        Self::with_fallback(script, Script::WriteAll)
    }

    pub fn with_fallback(mut script: Vec<Script>, fallback: Script) -> Arc<Self> {
        script.reverse();
        Arc::new(Self {
            script: Mutex::new(script),
            fallback,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Every call writes only the first listed file.
    pub fn one_per_call() -> Arc<Self> {
        Self::with_fallback(Vec::new(), Script::WriteFirst)
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

fn write_artifact(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), format!("# {name}\n")).unwrap();
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutput, ApiError> {
        let files = listed_files(&request.prompt);
        self.prompts.lock().push(files.clone());
        let step = self.script.lock().pop().unwrap_or(self.fallback);
        match step {
            Script::Fail(message) => {
                return Err(ApiError::ProviderRequestFailed(message.to_string()))
            }
            Script::WriteFirst => {
                if let Some(first) = files.first() {
                    write_artifact(&request.working_dir, first);
                }
            }
            Script::WriteAll => {
                for name in &files {
                    write_artifact(&request.working_dir, name);
                }
            }
        }
        Ok(InvocationOutput {
            text: "ok".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Records every progress update it sees.
#[derive(Default)]
pub struct CollectingSink {
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

impl ProgressSink for CollectingSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.updates.lock().push(update.clone());
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`, restoring
/// the previous values afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    let home = test_dir.path().join("home");
    let config_home = test_dir.path().join("xdg-config");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&config_home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    std::env::remove_var("ANVIL_ENV");
    std::env::remove_var("ANVIL__GENERATION__MAX_BATCH_SIZE");

    let result = f();

    for (name, value) in saved {
        match value {
            Some(v) => std::env::set_var(name, v),
            None => std::env::remove_var(name),
        }
    }
    result
}
