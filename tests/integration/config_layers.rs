//! Layered configuration: global file, workspace files, explicit file, environment.

use super::test_utils::with_isolated_env;
use anvil::cli::RunContext;
use anvil::config::ConfigLoader;
use anvil::error::ApiError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn defaults_apply_without_any_files() {
    let dir = TempDir::new().unwrap();
    with_isolated_env(&dir, || {
        let ws = dir.path().join("ws");
        fs::create_dir_all(&ws).unwrap();
        let config = ConfigLoader::load(&ws).unwrap();
        assert_eq!(config.generation.max_batch_size, 5);
        assert_eq!(config.generation.artifact_extension, "md");
        assert_eq!(config.resilience.max_retries, 3);
        assert_eq!(config.storage.state_dir, Path::new(".anvil/state"));
        assert!(config.validate().is_ok());
    });
}

#[test]
fn later_layers_override_earlier_ones() {
    let dir = TempDir::new().unwrap();
    with_isolated_env(&dir, || {
        let ws = dir.path().join("ws");
        write(
            &dir.path().join("xdg-config/anvil/config.toml"),
            "[resilience]\nmax_retries = 7\n\n[generation]\nmax_batch_size = 9\n",
        );
        write(
            &ws.join(".anvil/config.toml"),
            "[generation]\nmax_batch_size = 3\nartifact_extension = \"txt\"\n",
        );
        write(
            &ws.join(".anvil/development.toml"),
            "[agent]\nprogram = \"dev-agent\"\n",
        );
        let explicit = dir.path().join("explicit.toml");
        write(&explicit, "[generation]\nartifact_extension = \"rst\"\n");

        let config = ConfigLoader::load_with_file(&ws, Some(explicit.as_path())).unwrap();
        assert_eq!(config.resilience.max_retries, 7);
        assert_eq!(config.generation.max_batch_size, 3);
        assert_eq!(config.agent.program, "dev-agent");
        assert_eq!(config.generation.artifact_extension, "rst");

        std::env::set_var("ANVIL__GENERATION__MAX_BATCH_SIZE", "4");
        let config = ConfigLoader::load(&ws).unwrap();
        assert_eq!(config.generation.max_batch_size, 4);
        assert_eq!(config.generation.artifact_extension, "txt");
    });
}

#[test]
fn env_name_selects_the_workspace_override_file() {
    let dir = TempDir::new().unwrap();
    with_isolated_env(&dir, || {
        let ws = dir.path().join("ws");
        write(&ws.join(".anvil/development.toml"), "[agent]\nprogram = \"dev-agent\"\n");
        write(&ws.join(".anvil/ci.toml"), "[agent]\nprogram = \"ci-agent\"\n");

        std::env::set_var("ANVIL_ENV", "ci");
        let config = ConfigLoader::load(&ws).unwrap();
        assert_eq!(config.agent.program, "ci-agent");
    });
}

#[test]
fn run_context_rejects_invalid_configuration() {
    let dir = TempDir::new().unwrap();
    with_isolated_env(&dir, || {
        let ws = dir.path().join("ws");
        write(
            &ws.join(".anvil/config.toml"),
            "[generation]\nmax_batch_size = 0\n\n[resilience]\nbackoff_multiplier = 0.5\n",
        );

        let result = RunContext::new(ws.clone(), None);
        match result {
            Err(ApiError::ConfigError(message)) => {
                assert!(message.contains("max_batch_size"));
                assert!(message.contains("backoff_multiplier"));
            }
            Err(other) => panic!("expected ConfigError, got {other:?}"),
            Ok(_) => panic!("invalid configuration was accepted"),
        }

        let missing = RunContext::new(ws, Some(dir.path().join("absent.toml")));
        assert!(missing.is_err());
    });
}
