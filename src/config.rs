//! Configuration System
//!
//! Layered configuration for the generation pipeline. Lowest to highest
//! precedence: built-in defaults, global file, workspace files, an explicit
//! `--config` file, then `ANVIL__SECTION__KEY` environment variables.

use crate::error::ApiError;
use crate::generation::SchedulerConfig;
use crate::logging::LoggingConfig;
use crate::provider::AgentCommandConfig;
use crate::resilience::ResilienceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;
pub use sources::workspace_file::{workspace_config_dir, WORKSPACE_DIR};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnvilConfig {
    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub generation: SchedulerConfig,

    #[serde(default)]
    pub agent: AgentCommandConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where durable state lives. Relative paths resolve against the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON generation record per workflow
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// sled database for progress events
    #[serde(default = "default_progress_db")]
    pub progress_db: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".anvil/state")
}

fn default_progress_db() -> PathBuf {
    PathBuf::from(".anvil/progress")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            progress_db: default_progress_db(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.state_dir.as_os_str().is_empty() {
            return Err("State directory cannot be empty".to_string());
        }
        if self.progress_db.as_os_str().is_empty() {
            return Err("Progress database path cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn state_dir_in(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.state_dir)
    }

    pub fn progress_db_in(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.progress_db)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Resilience(String),
    Generation(String),
    Agent(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Resilience(msg) => write!(f, "Resilience: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Agent(msg) => write!(f, "Agent: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AnvilConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.resilience.validate() {
            errors.push(ValidationError::Resilience(e));
        }
        if let Err(e) = self.generation.validate() {
            errors.push(ValidationError::Generation(e));
        }
        if let Err(e) = self.agent.validate() {
            errors.push(ValidationError::Agent(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate` folded into a single `ApiError::ConfigError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}
