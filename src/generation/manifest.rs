//! Expected-artifact manifest.
//!
//! One main artifact plus one artifact per task, in task order. Built once per
//! generation attempt and immutable afterwards.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAIN_TASK_ID: &str = "main";
pub const MAIN_ARTIFACT_STEM: &str = "00-overview";

/// A logical work item from the workflow plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedArtifact {
    pub file_name: String,
    /// "main" or the task id
    pub task_id: String,
    pub is_main: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    artifacts: Vec<ExpectedArtifact>,
}

impl Manifest {
    /// Main artifact first, then one `NN-<slug>.<ext>` per task.
    pub fn build(tasks: &[TaskSpec], extension: &str) -> Result<Self, ApiError> {
        let extension = extension.trim_start_matches('.');
        let mut artifacts = Vec::with_capacity(tasks.len() + 1);
        artifacts.push(ExpectedArtifact {
            file_name: format!("{MAIN_ARTIFACT_STEM}.{extension}"),
            task_id: MAIN_TASK_ID.to_string(),
            is_main: true,
            task: None,
        });

        for (index, task) in tasks.iter().enumerate() {
            let id = task.id.trim();
            if id.is_empty() {
                return Err(ApiError::InvalidManifest(format!(
                    "task at position {} has an empty id",
                    index + 1
                )));
            }
            if id == MAIN_TASK_ID {
                return Err(ApiError::InvalidManifest(format!(
                    "task id '{MAIN_TASK_ID}' is reserved for the main artifact"
                )));
            }
            let slug = slugify(id);
            if slug.is_empty() {
                return Err(ApiError::InvalidManifest(format!(
                    "task id '{id}' has no usable characters for a file name"
                )));
            }
            artifacts.push(ExpectedArtifact {
                file_name: format!("{:02}-{}.{}", index + 1, slug, extension),
                task_id: id.to_string(),
                is_main: false,
                task: Some(task.clone()),
            });
        }

        Self::from_artifacts(artifacts)
    }

    pub fn from_artifacts(artifacts: Vec<ExpectedArtifact>) -> Result<Self, ApiError> {
        let mut seen = HashSet::new();
        for artifact in &artifacts {
            if !seen.insert(artifact.file_name.as_str()) {
                return Err(ApiError::InvalidManifest(format!(
                    "duplicate artifact file name '{}'",
                    artifact.file_name
                )));
            }
        }
        Ok(Self { artifacts })
    }

    pub fn artifacts(&self) -> &[ExpectedArtifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, file_name: &str) -> Option<&ExpectedArtifact> {
        self.artifacts.iter().find(|a| a.file_name == file_name)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(|a| a.file_name.as_str())
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
