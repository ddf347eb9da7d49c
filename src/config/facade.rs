//! Config loading entry point.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::AnvilConfig;
use config::{ConfigError, Environment, File};
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<AnvilConfig, ConfigError> {
        Self::load_with_file(workspace_root, None)
    }

    /// As `load`, with an explicit file layered above the workspace files.
    pub fn load_with_file(
        workspace_root: &Path,
        explicit: Option<&Path>,
    ) -> Result<AnvilConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        builder = workspace_file::add_to_builder(builder, workspace_root)?;
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            debug!(config_path = %path.display(), "Loading explicit config file");
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("ANVIL")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }

    /// Only the given file on top of defaults; no global, workspace or environment layers.
    pub fn load_from_file(path: &Path) -> Result<AnvilConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }
}
