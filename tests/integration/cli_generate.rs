//! Generate, status and reset through the CLI route with a shell script as agent.
#![cfg(unix)]

use anvil::cli::{Commands, RunContext};
use anvil::config::AnvilConfig;
use anvil::provider::AgentCommandConfig;
use anvil::resilience::ResilienceConfig;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Writes `# <name>` into every `- <name>` file listed on stdin.
const WRITE_LISTED: &str = r#"while IFS= read -r line; do
  case "$line" in
    "- "*) f="${line#- }"; printf '# %s\n' "$f" > "$f" ;;
  esac
done"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("plan.md"), "# Compiler\n\nLexer and parser.\n").unwrap();
    fs::write(
        dir.path().join("plan.toml"),
        r#"
workflow_id = "compiler"
primary_input = "plan.md"
output_dir = "docs"

[[tasks]]
id = "lexer"
title = "Lexer"
description = "Tokens and spans"

[[tasks]]
id = "parser"
title = "Parser"
"#,
    )
    .unwrap();
    dir
}

fn context(dir: &TempDir, script: &str) -> RunContext {
    let config = AnvilConfig {
        agent: AgentCommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            model_flag: None,
            output_format_flag: None,
            reasoning_effort_flag: None,
        },
        resilience: ResilienceConfig {
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..ResilienceConfig::default()
        },
        ..AnvilConfig::default()
    };
    RunContext::with_config(dir.path().to_path_buf(), config)
}

fn generate(force: bool) -> Commands {
    Commands::Generate {
        plan: PathBuf::from("plan.toml"),
        force,
    }
}

#[test]
fn generate_then_reuse_then_status_and_reset() {
    let dir = workspace();
    let ctx = context(&dir, WRITE_LISTED);

    let out = ctx.execute(&generate(false)).unwrap();
    assert!(out.starts_with("Workflow compiler: generated 3 artifact(s) in 1 round(s)"));
    for name in ["00-overview.md", "01-lexer.md", "02-parser.md"] {
        let content = fs::read_to_string(dir.path().join("docs").join(name)).unwrap();
        assert_eq!(content, format!("# {name}\n"));
        assert!(out.contains(name));
    }

    let again = ctx.execute(&generate(false)).unwrap();
    assert!(again.starts_with("Workflow compiler: inputs unchanged, reusing 3 artifact(s)"));

    let status = ctx
        .execute(&Commands::Status {
            workflow: "compiler".to_string(),
            format: "json".to_string(),
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(parsed["complete"], true);
    assert_eq!(parsed["record"]["files"].as_array().unwrap().len(), 3);
    assert_eq!(parsed["last_progress"]["stage"], "completed");
    assert_eq!(parsed["last_progress"]["current"], 3);

    let text = ctx
        .execute(&Commands::Status {
            workflow: "compiler".to_string(),
            format: "text".to_string(),
        })
        .unwrap();
    assert!(text.contains("State: complete"));
    assert!(text.contains("Last progress: completed 3/3"));

    let reset = ctx
        .execute(&Commands::Reset {
            workflow: "compiler".to_string(),
        })
        .unwrap();
    assert!(reset.starts_with("Removed generation record for workflow compiler"));
    let status = ctx
        .execute(&Commands::Status {
            workflow: "compiler".to_string(),
            format: "text".to_string(),
        })
        .unwrap();
    assert_eq!(status, "No generation record for workflow compiler");
}

#[test]
fn agent_that_writes_nothing_fails_with_missing_artifacts() {
    let dir = workspace();
    let ctx = context(&dir, "cat > /dev/null");

    let err = ctx.execute(&generate(false)).unwrap_err();
    let message = anvil::cli::map_error(&err);
    for name in ["00-overview.md", "01-lexer.md", "02-parser.md"] {
        assert!(message.contains(name), "{message}");
    }

    let status = ctx
        .execute(&Commands::Status {
            workflow: "compiler".to_string(),
            format: "text".to_string(),
        })
        .unwrap();
    assert!(status.contains("State: failed"));
}

#[test]
fn checksum_command_tracks_input_changes() {
    let dir = workspace();
    let ctx = context(&dir, WRITE_LISTED);
    let checksum = || {
        ctx.execute(&Commands::Checksum {
            plan: PathBuf::from("plan.toml"),
        })
        .unwrap()
    };

    let before = checksum();
    assert_eq!(before, checksum());
    fs::write(dir.path().join("plan.md"), "# Compiler\n\nLexer, parser, codegen.\n").unwrap();
    assert_ne!(before, checksum());
}
