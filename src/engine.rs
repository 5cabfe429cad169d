//! Run orchestration and the fluent entry point.
//!
//! A run walks the candidate files once. For each file the selected rules
//! execute in registry order against the file's current content, so a later
//! rule sees what an earlier rule produced. Every (file, rule) pair that the
//! rule handles yields exactly one [`RuleResult`].
//!
//! # Example
//!
//! ```rust,no_run
//! use source_patch::prelude::*;
//!
//! let result = Patcher::in_dir("./backend/api")
//!     .rule("csrf-guard")
//!     .dry_run()
//!     .run()?;
//!
//! println!("{}", result.report.summary());
//! println!("{}", result.diff());
//! # Ok::<(), source_patch::error::PatchError>(())
//! ```

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::applier::PatchApplier;
use crate::config::EngineConfig;
use crate::diff::{DiffSummary, FileChange, splice_preview};
use crate::encoding::TextEncoding;
use crate::error::Result;
use crate::registry::ProcessedRegistry;
use crate::report::{RuleResult, RunMode, RunReport, Status};
use crate::rule::{Rule, RuleRegistry, SourceFile, check_anchors};
use crate::validator::ValidatorRegistry;
use crate::walker::FileWalker;

/// Maximum number of anchors rendered into a dry-run preview.
const PREVIEW_ANCHORS: usize = 3;

/// Outcome of re-validating every modified file of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateResult {
    pub checked: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Re-validates every `modified` entry of a report.
pub fn lint_report(report: &RunReport, validators: &ValidatorRegistry) -> GateResult {
    let mut gate = GateResult::default();
    for path in report.modified_paths() {
        gate.checked += 1;
        let validation = validators.validate(&path);
        if validation.passed {
            debug!(path = %path.display(), "gate: passed");
        } else {
            warn!(path = %path.display(), diagnostic = %validation.diagnostic, "gate: failed");
            gate.failures.push((path, validation.diagnostic));
        }
    }
    gate
}

/// The result of a run.
#[derive(Debug)]
pub struct RunResult {
    pub report: RunReport,
    pub changes: Vec<FileChange>,
    /// Set for apply runs that modified at least one file.
    pub gate: Option<GateResult>,
}

impl RunResult {
    /// Returns the number of files whose content changed.
    pub fn files_changed(&self) -> usize {
        self.changes.len()
    }

    /// Aggregated diff statistics.
    pub fn diff_summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for change in &self.changes {
            summary.merge(&change.summary());
        }
        summary
    }

    /// Generates a unified diff of all changes.
    pub fn diff(&self) -> String {
        self.changes
            .iter()
            .map(FileChange::diff)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Generates a colorized diff for terminal display.
    pub fn colorized_diff(&self) -> String {
        self.changes
            .iter()
            .map(FileChange::colorized_diff)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns true if any file failed or the acceptance gate rejected it.
    pub fn has_failures(&self) -> bool {
        self.report.summary().failures() > 0
            || self.gate.as_ref().is_some_and(|g| !g.passed())
    }

    /// Process exit code: `1` on any failure, `0` otherwise.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.has_failures())
    }
}

/// The fluent engine builder.
pub struct Patcher {
    config: EngineConfig,
    project_root: PathBuf,
    rule_ids: Vec<String>,
    custom_rules: Vec<Box<dyn Rule>>,
    mode: RunMode,
    files: Option<Vec<PathBuf>>,
    validators: Option<ValidatorRegistry>,
    registry_path: Option<PathBuf>,
    /// Set when re-driving a report; opt-in rules then run too.
    redrive: bool,
}

impl Patcher {
    /// Creates a run from a configuration, rooted at the current directory.
    pub fn new(config: EngineConfig) -> Self {
        let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config,
            project_root,
            rule_ids: Vec::new(),
            custom_rules: Vec::new(),
            mode: RunMode::DryRun,
            files: None,
            validators: None,
            registry_path: None,
            redrive: false,
        }
    }

    /// Creates a run over a single root that is also the project root.
    pub fn in_dir(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = EngineConfig {
            roots: vec![path.clone()],
            ..EngineConfig::default()
        };
        Self::new(config).project_root(path)
    }

    /// Adjusts the configuration.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(EngineConfig) -> EngineConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Sets the directory that relative rule targets resolve against.
    pub fn project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = path.into();
        self
    }

    /// Replaces the roots to walk.
    pub fn roots(mut self, roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.config.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Selects a built-in rule by id. Without any selection every default
    /// rule runs; opt-in rules run only when selected or re-driven.
    pub fn rule(mut self, id: impl Into<String>) -> Self {
        self.rule_ids.push(id.into());
        self
    }

    /// Selects several built-in rules by id.
    pub fn rules(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.rule_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds a rule that is not part of the built-in registry.
    pub fn custom_rule(mut self, rule: Box<dyn Rule>) -> Self {
        self.custom_rules.push(rule);
        self
    }

    /// Sets the run mode.
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Report-only mode: nothing is written.
    pub fn dry_run(self) -> Self {
        self.mode(RunMode::DryRun)
    }

    /// Mutating mode: backup, write, validate, roll back on failure.
    pub fn apply_changes(self) -> Self {
        self.mode(RunMode::Apply)
    }

    /// Uses an explicit candidate list instead of walking the roots.
    pub fn files(mut self, files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.files = Some(files.into_iter().map(Into::into).collect());
        self
    }

    /// Re-drives the files a prior run modified or would have modified.
    pub fn from_report(self, report: &RunReport) -> Self {
        let mut patcher =
            self.files(report.paths_with(&[Status::Modified, Status::CandidateDryrun]));
        patcher.redrive = true;
        patcher
    }

    /// Overrides the validators built from the configuration.
    pub fn validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = Some(validators);
        self
    }

    /// Persists and consults an already-processed registry at `path`.
    pub fn registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    fn select_rules(&mut self) -> Result<Vec<Box<dyn Rule>>> {
        let registry = RuleRegistry::new(&self.config.rules, &self.project_root)?;
        let mut rules = match (self.rule_ids.is_empty(), self.custom_rules.is_empty()) {
            (false, _) => registry.take(&self.rule_ids)?,
            (true, true) if self.redrive => registry.into_rules(),
            (true, true) => registry.into_default_rules(),
            (true, false) => Vec::new(),
        };
        rules.append(&mut self.custom_rules);
        Ok(rules)
    }

    /// Executes the run.
    pub fn run(mut self) -> Result<RunResult> {
        self.config.validate()?;
        let rules = self.select_rules()?;
        let validators = self
            .validators
            .take()
            .unwrap_or_else(|| ValidatorRegistry::from_config(&self.config));
        if self.mode == RunMode::Apply && validators.is_empty() {
            warn!("no validators configured; written files are not syntax-checked");
        }

        let files = match self.files.take() {
            Some(files) => files,
            None => FileWalker::from_config(&self.config).collect_all(&self.config.roots)?,
        };

        let mut registry = match &self.registry_path {
            Some(path) => Some(ProcessedRegistry::load(path)?),
            None => None,
        };

        let rule_ids: Vec<String> = rules.iter().map(|r| r.id().to_string()).collect();
        info!(
            mode = ?self.mode,
            files = files.len(),
            rules = %rule_ids.join(","),
            "starting run"
        );

        let applier = PatchApplier::new(self.mode, &validators)
            .backup_suffix(self.config.backup_suffix.clone())
            .restore_on_failure(self.config.restore_on_failure);

        let mut report = RunReport::new(self.mode, rule_ids);
        let mut changes = Vec::new();

        for path in &files {
            if let Some(change) =
                process_file(path, &rules, &applier, registry.as_mut(), &mut report)
            {
                changes.push(change);
            }
        }

        if self.mode == RunMode::Apply
            && let (Some(registry), Some(path)) = (registry.as_mut(), &self.registry_path)
        {
            registry.save(path)?;
        }

        let gate = if self.mode == RunMode::Apply && !report.modified_paths().is_empty() {
            let gate = lint_report(&report, &validators);
            info!(checked = gate.checked, failed = gate.failures.len(), "acceptance gate");
            Some(gate)
        } else {
            None
        };

        Ok(RunResult {
            report,
            changes,
            gate,
        })
    }
}

/// Runs every applicable rule against one file, recording one result per
/// rule. Returns the file's change when its content differs at the end.
fn process_file(
    path: &Path,
    rules: &[Box<dyn Rule>],
    applier: &PatchApplier<'_>,
    mut registry: Option<&mut ProcessedRegistry>,
    report: &mut RunReport,
) -> Option<FileChange> {
    let rules: Vec<&dyn Rule> = rules
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| r.applies_to(path))
        .collect();
    if rules.is_empty() {
        return None;
    }

    let original = match SourceFile::load(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read file");
            for rule in &rules {
                report.push(
                    RuleResult::new(path, rule.id(), Status::ReadError)
                        .with_diagnostic(e.to_string()),
                );
            }
            return None;
        }
    };

    if original.encoding != TextEncoding::Utf8 {
        debug!(path = %path.display(), encoding = original.encoding.as_str(), "not UTF-8");
    }
    let encoding = original.encoding;
    let mut current = original.content.clone();
    let mut contributed = Vec::new();

    for rule in rules {
        let (result, patched) =
            run_rule(rule, path, &current, encoding, applier, registry.as_deref());
        let status = result.status;
        if let Some(patched) = patched
            && matches!(status, Status::Modified | Status::CandidateDryrun)
        {
            if status == Status::Modified
                && let Some(registry) = registry.as_deref_mut()
            {
                registry.record(path, &patched, rule.id());
            }
            current = patched;
            contributed.push(rule.id().to_string());
        }
        report.push(result);

        if status.is_failure() {
            debug!(path = %path.display(), rule = rule.id(), "stopping rules for failed file");
            break;
        }
    }

    let change = FileChange {
        path: path.to_path_buf(),
        original: original.content,
        patched: current,
        rules: contributed,
    };
    change.has_changes().then_some(change)
}

/// Runs one rule against the current content of a file. Returns the result
/// and, when the rule produced new content, that content.
fn run_rule(
    rule: &dyn Rule,
    path: &Path,
    content: &str,
    encoding: TextEncoding,
    applier: &PatchApplier<'_>,
    registry: Option<&ProcessedRegistry>,
) -> (RuleResult, Option<String>) {
    let id = rule.id();

    if registry.is_some_and(|r| r.contains(path, content, id)) {
        debug!(path = %path.display(), rule = id, "already processed");
        let result = RuleResult::new(path, id, Status::SkippedAlreadyApplied)
            .with_diagnostic("content recorded in processed registry");
        return (result, None);
    }

    let file = SourceFile {
        encoding,
        ..SourceFile::new(path, content)
    };
    if !rule.detect(&file) {
        debug!(path = %path.display(), rule = id, "not applicable");
        return (RuleResult::new(path, id, Status::SkippedNotApplicable), None);
    }
    if rule.already_applied(&file) {
        debug!(path = %path.display(), rule = id, "already applied");
        return (RuleResult::new(path, id, Status::SkippedAlreadyApplied), None);
    }

    let anchors = rule.locate_all(&file);
    if anchors.is_empty() {
        info!(path = %path.display(), rule = id, "no safe anchor; manual review required");
        let result = RuleResult::new(path, id, Status::ManualReviewRequired)
            .with_diagnostic("no safe anchor found");
        return (result, None);
    }
    if let Err(reason) = check_anchors(&file, &anchors) {
        info!(path = %path.display(), rule = id, %reason, "unsafe anchor; manual review required");
        let result = RuleResult::new(path, id, Status::ManualReviewRequired).with_diagnostic(reason);
        return (result, None);
    }

    let patched = rule.transform_all(&file, &anchors);
    if patched == content {
        let result = RuleResult::new(path, id, Status::SkippedAlreadyApplied)
            .with_diagnostic("transform produced no change");
        return (result, None);
    }

    let (Some(old_bytes), Some(new_bytes)) = (encoding.encode(content), encoding.encode(&patched))
    else {
        info!(path = %path.display(), rule = id, "patch not representable; manual review required");
        let result = RuleResult::new(path, id, Status::ManualReviewRequired).with_diagnostic(
            format!("inserted text cannot be written as {}", encoding.as_str()),
        );
        return (result, None);
    };

    let outcome = applier.apply(path, &old_bytes, &new_bytes);
    let tags = anchors.iter().map(|a| a.tag.to_string()).collect();
    let mut result = RuleResult::new(path, id, outcome.status).with_anchors(tags);
    if let Some(backup) = outcome.backup {
        result = result.with_backup(backup);
    }
    result.diagnostic = outcome.diagnostic;

    if outcome.status == Status::CandidateDryrun {
        info!(path = %path.display(), rule = id, anchors = anchors.len(), "candidate");
        let preview = anchors
            .iter()
            .take(PREVIEW_ANCHORS)
            .map(|a| splice_preview(content, a.start, a.end, &rule.splice(&file, a)))
            .collect::<Vec<_>>()
            .join(" | ");
        result = result.with_preview(preview);
    }
    (result, Some(patched))
}
