//! Batch prompt rendering.

use crate::generation::manifest::ExpectedArtifact;
use std::fmt::Write;
use std::path::Path;

/// Everything a renderer may use to describe one batch
#[derive(Debug, Clone, Copy)]
pub struct BatchPrompt<'a> {
    pub workflow_id: &'a str,
    pub output_dir: &'a Path,
    pub artifacts: &'a [ExpectedArtifact],
    pub round: u32,
}

pub trait PromptRenderer: Send + Sync {
    fn render(&self, batch: &BatchPrompt<'_>) -> String;
}

/// Plain-text prompt: one `- <file name>` line per artifact, followed by the
/// task title and description when present.
#[derive(Debug, Default, Clone)]
pub struct PlainPromptRenderer {
    preamble: Option<String>,
}

impl PlainPromptRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        Self {
            preamble: Some(preamble.into()),
        }
    }
}

impl PromptRenderer for PlainPromptRenderer {
    fn render(&self, batch: &BatchPrompt<'_>) -> String {
        let mut out = String::new();
        if let Some(preamble) = &self.preamble {
            out.push_str(preamble.trim_end());
            out.push_str("\n\n");
        }
        let _ = writeln!(
            out,
            "Workflow {}: write each file below into {}.",
            batch.workflow_id,
            batch.output_dir.display()
        );
        out.push_str("Use exactly these file names and write non-empty content.\n\n");

        for artifact in batch.artifacts {
            let _ = writeln!(out, "- {}", artifact.file_name);
            if artifact.is_main {
                out.push_str("  Overview of the whole workflow and how the tasks fit together.\n");
            }
            if let Some(task) = &artifact.task {
                if !task.title.is_empty() {
                    let _ = writeln!(out, "  Title: {}", task.title);
                }
                for line in task.description.lines().filter(|l| !l.trim().is_empty()) {
                    let _ = writeln!(out, "  {}", line.trim_end());
                }
            }
        }
        out
    }
}
