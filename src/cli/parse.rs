//! CLI parse: clap types for Anvil. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Anvil CLI - resilient, resumable artifact generation
#[derive(Parser)]
#[command(name = "anvil")]
#[command(about = "Generate workflow artifacts with an external agent, resuming and retrying until complete")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file layered over the global and workspace files
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the artifacts of a workflow plan, reusing prior output when inputs are unchanged
    Generate {
        /// Workflow plan (TOML)
        #[arg(long)]
        plan: PathBuf,
        /// Regenerate even if a complete record matches the inputs
        #[arg(long)]
        force: bool,
    },
    /// Show the stored generation record of a workflow
    Status {
        #[arg(long)]
        workflow: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove the stored generation record and progress events of a workflow
    Reset {
        #[arg(long)]
        workflow: String,
    },
    /// Print the input checksum of a workflow plan
    Checksum {
        #[arg(long)]
        plan: PathBuf,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Generate { .. } => "generate",
            Commands::Status { .. } => "status",
            Commands::Reset { .. } => "reset",
            Commands::Checksum { .. } => "checksum",
        }
    }
}
