//! Run reports: per-(file, rule) outcomes and their summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result};

/// Whether a run may write to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Apply,
}

/// Outcome of running one rule against one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    SkippedNotApplicable,
    SkippedAlreadyApplied,
    CandidateDryrun,
    Modified,
    ManualReviewRequired,
    ReadError,
    WriteFailed,
    BackupFailed,
    ValidationFailed,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::SkippedNotApplicable,
        Status::SkippedAlreadyApplied,
        Status::CandidateDryrun,
        Status::Modified,
        Status::ManualReviewRequired,
        Status::ReadError,
        Status::WriteFailed,
        Status::BackupFailed,
        Status::ValidationFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::SkippedNotApplicable => "skipped_not_applicable",
            Status::SkippedAlreadyApplied => "skipped_already_applied",
            Status::CandidateDryrun => "candidate_dryrun",
            Status::Modified => "modified",
            Status::ManualReviewRequired => "manual_review_required",
            Status::ReadError => "read_error",
            Status::WriteFailed => "write_failed",
            Status::BackupFailed => "backup_failed",
            Status::ValidationFailed => "validation_failed",
        }
    }

    /// Filesystem or validation failures.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Status::ReadError | Status::WriteFailed | Status::BackupFailed | Status::ValidationFailed
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One report entry. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub path: PathBuf,
    pub rule: String,
    pub status: Status,
    pub backup: Option<PathBuf>,
    pub diagnostic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl RuleResult {
    pub fn new(path: impl Into<PathBuf>, rule: impl Into<String>, status: Status) -> Self {
        Self {
            path: path.into(),
            rule: rule.into(),
            status,
            backup: None,
            diagnostic: None,
            anchors: Vec::new(),
            preview: None,
        }
    }

    pub fn with_backup(mut self, backup: impl Into<PathBuf>) -> Self {
        self.backup = Some(backup.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_anchors(mut self, anchors: Vec<String>) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }
}

/// Report metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub apply: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// The full outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub meta: RunMeta,
    pub results: Vec<RuleResult>,
}

impl RunReport {
    /// Starts an empty report stamped with the current time.
    pub fn new(mode: RunMode, rules: Vec<String>) -> Self {
        Self {
            meta: RunMeta {
                dry_run: mode == RunMode::DryRun,
                apply: mode == RunMode::Apply,
                timestamp: Utc::now(),
                rules,
            },
            results: Vec::new(),
        }
    }

    pub fn mode(&self) -> RunMode {
        if self.meta.apply {
            RunMode::Apply
        } else {
            RunMode::DryRun
        }
    }

    pub fn push(&mut self, result: RuleResult) {
        self.results.push(result);
    }

    /// Counts results per status.
    pub fn summary(&self) -> Summary {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.status).or_insert(0) += 1;
        }
        Summary { counts }
    }

    /// Distinct paths with the given status, in first-seen order.
    pub fn paths_with(&self, statuses: &[Status]) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for result in &self.results {
            if statuses.contains(&result.status) && !paths.contains(&result.path) {
                paths.push(result.path.clone());
            }
        }
        paths
    }

    /// Paths of every `modified` entry.
    pub fn modified_paths(&self) -> Vec<PathBuf> {
        self.paths_with(&[Status::Modified])
    }

    /// Writes the report as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reads a prior report.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let report_error = |message: String| PatchError::ReportRead {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| report_error(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| report_error(e.to_string()))
    }
}

/// Result counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    counts: BTreeMap<Status, usize>,
}

impl Summary {
    pub fn count(&self, status: Status) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn failures(&self) -> usize {
        self.counts
            .iter()
            .filter(|(s, _)| s.is_failure())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Status, usize)> + '_ {
        self.counts.iter().map(|(s, n)| (*s, *n))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (status, count) in self.iter() {
            writeln!(f, "  {:<26}{:>6}", status.as_str(), count)?;
        }
        write!(f, "  {:<26}{:>6}", "total", self.total())
    }
}
