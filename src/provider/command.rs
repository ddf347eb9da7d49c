//! Subprocess agent invoker.
//!
//! Runs an agent CLI, writes the prompt to its stdin and returns stdout.
//! The agent is expected to write artifact files into the working directory.

use crate::error::ApiError;
use crate::provider::{AgentInvoker, InvocationOutput, InvocationRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// How to launch the agent CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommandConfig {
    /// Executable name or path
    #[serde(default = "default_program")]
    pub program: String,

    /// Fixed arguments passed before the generated flags
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Flag carrying the model identifier (omitted when unset)
    #[serde(default = "default_model_flag")]
    pub model_flag: Option<String>,

    /// Flag carrying the output format (omitted when unset)
    #[serde(default = "default_output_format_flag")]
    pub output_format_flag: Option<String>,

    /// Flag carrying the reasoning-effort hint (omitted when unset)
    #[serde(default)]
    pub reasoning_effort_flag: Option<String>,
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_model_flag() -> Option<String> {
    Some("--model".to_string())
}

fn default_output_format_flag() -> Option<String> {
    Some("--output-format".to_string())
}

impl Default for AgentCommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            model_flag: default_model_flag(),
            output_format_flag: default_output_format_flag(),
            reasoning_effort_flag: None,
        }
    }
}

impl AgentCommandConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("Agent program cannot be empty".to_string());
        }
        Ok(())
    }
}

pub struct CommandInvoker {
    config: AgentCommandConfig,
}

impl CommandInvoker {
    pub fn new(config: AgentCommandConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &InvocationRequest) -> Vec<String> {
        let mut args = self.config.args.clone();
        if let Some(flag) = &self.config.model_flag {
            if !request.model.is_empty() {
                args.push(flag.clone());
                args.push(request.model.clone());
            }
        }
        if let Some(flag) = &self.config.output_format_flag {
            args.push(flag.clone());
            args.push(request.output_format.as_str().to_string());
        }
        if let (Some(flag), Some(effort)) = (&self.config.reasoning_effort_flag, request.reasoning_effort) {
            args.push(flag.clone());
            args.push(effort.as_str().to_string());
        }
        args
    }
}

#[async_trait]
impl AgentInvoker for CommandInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutput, ApiError> {
        let args = self.build_args(&request);
        debug!(
            program = %self.config.program,
            working_dir = %request.working_dir.display(),
            timeout_ms = request.timeout.as_millis() as u64,
            prompt_bytes = request.prompt.len(),
            "Launching agent process"
        );

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ApiError::ProviderNotConfigured(format!(
                    "Failed to launch agent '{}': {}",
                    self.config.program, e
                ))
            })?;

        // The prompt write shares the timeout with the wait: an agent that never
        // drains stdin must not outlive the deadline.
        let stdin = child.stdin.take();
        let prompt = request.prompt.as_bytes();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(prompt).await {
                // The agent exited without reading; its exit status decides.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("Agent closed stdin before reading the whole prompt");
                    Ok(())
                }
                other => other,
            }
        };
        let exchange = async { tokio::join!(feed, child.wait_with_output()) };

        let (written, waited) = match tokio::time::timeout(request.timeout, exchange).await {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    program = %self.config.program,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Agent process timed out"
                );
                return Err(ApiError::ProviderTimeout(request.timeout));
            }
        };
        let output = waited.map_err(|e| {
            ApiError::ProviderRequestFailed(format!("Failed to wait for agent: {}", e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ApiError::ProviderRequestFailed(format!(
                "agent exited with {}: {}",
                output.status, detail
            )));
        }
        written.map_err(|e| {
            ApiError::ProviderRequestFailed(format!("Failed to write prompt to agent: {}", e))
        })?;

        Ok(InvocationOutput { text: stdout })
    }

    fn name(&self) -> &str {
        &self.config.program
    }
}
