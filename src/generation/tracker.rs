//! Generation tracker: reconciles the expected manifest against what landed on disk.
//!
//! Two scans:
//! - `pre_scan` runs before an attempt and accepts matching files regardless
//!   of age, so a resumed run skips work an earlier crashed run already wrote.
//! - `scan` runs after every batch round and accepts pre-scanned files plus
//!   files modified at or after the attempt start. Older files are accepted
//!   only under `StalePolicy::Accept`.
//!
//! Zero-byte files count as not yet written.

use crate::error::StorageError;
use crate::generation::fuzzy::{fuzzy_match, MATCHERS};
use crate::generation::manifest::Manifest;
use crate::generation::scan::{DestinationScanner, ScannedEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// What to do with a matching file older than the attempt start that was not pre-scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    #[default]
    Reject,
    Accept,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Manifest entry this file satisfies
    pub manifest_key: String,
    /// Name actually found on disk
    pub file_name: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GenerationTracker {
    expected: BTreeMap<String, String>,
    observed: BTreeMap<String, Observation>,
    prescanned: BTreeSet<String>,
    started_at: DateTime<Utc>,
    extension: Option<String>,
    stale_policy: StalePolicy,
}

impl GenerationTracker {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            expected: BTreeMap::new(),
            observed: BTreeMap::new(),
            prescanned: BTreeSet::new(),
            started_at,
            extension: None,
            stale_policy: StalePolicy::Reject,
        }
    }

    pub fn from_manifest(manifest: &Manifest, started_at: DateTime<Utc>) -> Self {
        let mut tracker = Self::new(started_at);
        for artifact in manifest.artifacts() {
            tracker.add_expected(&artifact.file_name, &artifact.task_id);
        }
        tracker
    }

    /// Only files with this extension are considered by the scans.
    pub fn with_extension(mut self, extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_lowercase();
        self.extension = (!extension.is_empty()).then_some(extension);
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Register a manifest entry; a repeat call overwrites the logical id.
    pub fn add_expected(&mut self, name: &str, task_id: &str) {
        self.expected.insert(name.to_string(), task_id.to_string());
    }

    pub fn expected_count(&self) -> usize {
        self.expected.len()
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    pub fn task_id(&self, manifest_key: &str) -> Option<&str> {
        self.expected.get(manifest_key).map(String::as_str)
    }

    /// Manifest key a file name satisfies: the exact key, else the first
    /// fuzzy tier with a candidate. Within a tier unobserved keys win, then
    /// key order.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.expected.contains_key(name) {
            return Some(name.to_string());
        }
        for (_, matcher) in MATCHERS.iter() {
            let candidates: Vec<&String> = self
                .expected
                .keys()
                .filter(|key| matcher(name, key.as_str()))
                .collect();
            let chosen = candidates
                .iter()
                .find(|key| !self.observed.contains_key(key.as_str()))
                .or_else(|| candidates.first());
            if let Some(key) = chosen {
                return Some((*key).clone());
            }
        }
        None
    }

    /// Record that `name` exists. Returns the new observation, or None when
    /// the name matches nothing or its manifest entry was already observed.
    /// With an empty manifest every name is recorded under itself.
    pub fn mark_generated(&mut self, name: &str, timestamp: DateTime<Utc>) -> Option<Observation> {
        let key = if self.expected.is_empty() {
            name.to_string()
        } else {
            self.resolve(name)?
        };
        if self.observed.contains_key(&key) {
            return None;
        }
        let observation = Observation {
            manifest_key: key.clone(),
            file_name: name.to_string(),
            observed_at: timestamp,
        };
        self.observed.insert(key, observation.clone());
        Some(observation)
    }

    /// Timestamp at or after the attempt start, and the name is accepted by
    /// the manifest (exactly, fuzzily, or because the manifest is empty).
    pub fn is_valid_file(&self, name: &str, timestamp: DateTime<Utc>) -> bool {
        if timestamp < self.started_at {
            return false;
        }
        self.matches_manifest(name)
    }

    fn matches_manifest(&self, name: &str) -> bool {
        self.expected.is_empty()
            || self.expected.contains_key(name)
            || self.expected.keys().any(|key| fuzzy_match(name, key))
    }

    /// Manifest keys with no observation, sorted.
    pub fn missing_files(&self) -> Vec<String> {
        self.expected
            .keys()
            .filter(|key| !self.observed.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_files().is_empty()
    }

    pub fn observation(&self, manifest_key: &str) -> Option<&Observation> {
        self.observed.get(manifest_key)
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observed.values()
    }

    pub fn was_prescanned(&self, file_name: &str) -> bool {
        self.prescanned.contains(file_name)
    }

    fn is_candidate(&self, entry: &ScannedEntry) -> bool {
        if entry.is_dir || entry.size == 0 {
            return false;
        }
        match &self.extension {
            Some(ext) => Path::new(&entry.name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase() == *ext)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Accept every matching non-empty file already present, whatever its age.
    pub fn pre_scan(
        &mut self,
        scanner: &dyn DestinationScanner,
        dir: &Path,
    ) -> Result<Vec<Observation>, StorageError> {
        let mut found = Vec::new();
        for entry in sorted_listing(scanner, dir)? {
            if !self.is_candidate(&entry) || !self.matches_manifest(&entry.name) {
                continue;
            }
            self.prescanned.insert(entry.name.clone());
            if let Some(observation) = self.mark_generated(&entry.name, entry.modified) {
                debug!(
                    file = %observation.file_name,
                    manifest_key = %observation.manifest_key,
                    "Pre-scan found existing artifact"
                );
                found.push(observation);
            }
        }
        Ok(found)
    }

    /// Steady-state scan after a batch round. Returns newly observed artifacts.
    pub fn scan(
        &mut self,
        scanner: &dyn DestinationScanner,
        dir: &Path,
    ) -> Result<Vec<Observation>, StorageError> {
        let mut found = Vec::new();
        for entry in sorted_listing(scanner, dir)? {
            if !self.is_candidate(&entry) {
                continue;
            }
            let accepted = self.prescanned.contains(&entry.name)
                || self.is_valid_file(&entry.name, entry.modified)
                || (self.stale_policy == StalePolicy::Accept && self.matches_manifest(&entry.name));
            if !accepted {
                debug!(
                    file = %entry.name,
                    modified = %entry.modified,
                    started_at = %self.started_at,
                    "Ignoring file that predates the attempt or matches no artifact"
                );
                continue;
            }
            if let Some(observation) = self.mark_generated(&entry.name, entry.modified) {
                found.push(observation);
            }
        }
        Ok(found)
    }
}

/// Scanner output in name order, so ambiguous fuzzy matches resolve the same
/// way whatever order the scanner reports.
fn sorted_listing(
    scanner: &dyn DestinationScanner,
    dir: &Path,
) -> Result<Vec<ScannedEntry>, StorageError> {
    let mut entries = scanner.list(dir)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
