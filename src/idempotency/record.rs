//! Durable generation record for one workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFileRecord {
    pub name: String,
    pub task_id: String,
    pub is_main: bool,
    /// Hex BLAKE3 of the file content when it was recorded
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    /// External reference, usually the issue URL
    pub url: String,
    pub task_id: String,
    pub is_main: bool,
    pub created_at: DateTime<Utc>,
}

/// Complete iff `completed_at` is set and `last_error` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub workflow_id: String,
    pub input_checksum: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Vec<GeneratedFileRecord>,
    #[serde(default)]
    pub issues: Vec<IssueRecord>,
    #[serde(default)]
    pub last_error: String,
}

impl GenerationRecord {
    pub fn new(workflow_id: impl Into<String>, input_checksum: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            input_checksum: input_checksum.into(),
            started_at: Utc::now(),
            completed_at: None,
            files: Vec::new(),
            issues: Vec::new(),
            last_error: String::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some() && self.last_error.is_empty()
    }

    /// Record a generated file; a later entry with the same name replaces the earlier one.
    pub fn mark_file_generated(
        &mut self,
        name: impl Into<String>,
        task_id: impl Into<String>,
        is_main: bool,
        checksum: impl Into<String>,
    ) {
        let entry = GeneratedFileRecord {
            name: name.into(),
            task_id: task_id.into(),
            is_main,
            checksum: checksum.into(),
            created_at: Utc::now(),
        };
        match self.files.iter_mut().find(|f| f.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.files.push(entry),
        }
    }

    /// Record a created issue; the same issue number is recorded once.
    pub fn mark_issue_created(
        &mut self,
        number: u64,
        url: impl Into<String>,
        task_id: impl Into<String>,
        is_main: bool,
    ) {
        if self.issues.iter().any(|i| i.number == number) {
            return;
        }
        self.issues.push(IssueRecord {
            number,
            url: url.into(),
            task_id: task_id.into(),
            is_main,
            created_at: Utc::now(),
        });
    }

    pub fn mark_complete(&mut self) {
        self.completed_at = Some(Utc::now());
        self.last_error.clear();
    }

    /// Sets the error only; completion time is left as it is.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.last_error = error.into();
    }

    pub fn has_existing_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn existing_issue_numbers(&self) -> Vec<u64> {
        self.issues.iter().map(|i| i.number).collect()
    }

    pub fn file(&self, name: &str) -> Option<&GeneratedFileRecord> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}
