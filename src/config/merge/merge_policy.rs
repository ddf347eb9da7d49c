//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Section structs carry serde defaults too; the values here keep the
/// storage layout visible to `config` so file layers merge field by field.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.state_dir", ".anvil/state")?
        .set_default("storage.progress_db", ".anvil/progress")?
        .set_default("generation.artifact_extension", "md")
}
