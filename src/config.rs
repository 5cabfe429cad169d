//! Serializable engine configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PatchError, Result};

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = ".srcpatch.yaml";

/// An external syntax-check command.
///
/// The file path is appended as the final argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

fn globs(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

/// Settings for the `csrf-guard` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Path required before the guard call.
    pub include_path: String,
    /// The guard invocation statement.
    pub call: String,
    /// Globs, relative to the project root, of files the rule may touch.
    /// Empty means every file.
    pub paths: Vec<String>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            include_path: "backend/includes/csrf_check.php".to_string(),
            call: "csrf_check(true);".to_string(),
            paths: globs(&["backend/api/**"]),
        }
    }
}

/// Settings shared by the `api-bootstrap` and `api-bootstrap-include` rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Constant defined by the inlined block to mark it as present.
    pub marker_constant: String,
    /// Comment line introducing the inlined block.
    pub marker_comment: String,
    /// Project-relative path of the shared bootstrap include.
    pub include_target: String,
    pub paths: Vec<String>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            marker_constant: "API_BOOTSTRAP_V1".to_string(),
            marker_comment: "// API bootstrap (added by srcpatch)".to_string(),
            include_target: "backend/includes/api_bootstrap.php".to_string(),
            paths: globs(&["backend/api/**"]),
        }
    }
}

/// Settings for the `recovery-clause` rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub paths: Vec<String>,
}

/// Settings for the `label-for` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Bytes before a label searched for a preceding control.
    pub search_window: usize,
    pub paths: Vec<String>,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            search_window: 500,
            paths: Vec::new(),
        }
    }
}

/// Settings for the `img-alt` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAltSettings {
    pub placeholder: String,
    pub paths: Vec<String>,
}

impl Default for ImageAltSettings {
    fn default() -> Self {
        Self {
            placeholder: "TODO: add alt text".to_string(),
            paths: Vec::new(),
        }
    }
}

/// Settings for the `form-csrf-token` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormTokenSettings {
    /// Name of the hidden token field.
    pub field: String,
    pub paths: Vec<String>,
}

impl Default for FormTokenSettings {
    fn default() -> Self {
        Self {
            field: "csrf_token".to_string(),
            paths: Vec::new(),
        }
    }
}

/// Settings for the `header-include` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSettings {
    /// Line prepended to page files.
    pub include_line: String,
    /// Page directories; API endpoints and libraries live elsewhere.
    pub paths: Vec<String>,
}

impl Default for HeaderSettings {
    fn default() -> Self {
        Self {
            include_line: "<?php include_once __DIR__ . '/header.php'; ?>".to_string(),
            paths: globs(&[
                "backend/dashboard/**",
                "backend/admin/**",
                "backend/auth/**",
                "frontend/**",
            ]),
        }
    }
}

/// Per-rule settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub guard: GuardSettings,
    pub bootstrap: BootstrapSettings,
    pub recovery: RecoverySettings,
    pub label: LabelSettings,
    pub image_alt: ImageAltSettings,
    pub form_token: FormTokenSettings,
    pub header: HeaderSettings,
}

/// Engine configuration, loadable from YAML or JSON.
///
/// # Example YAML
///
/// ```yaml
/// roots:
///   - backend/api
/// extensions: [php]
/// include:
///   - "**/*.php"
/// exclude:
///   - "**/legacy/**"
/// backup_suffix: .bak
/// validator_timeout_secs: 10
/// validators:
///   php:
///     program: php
///     args: ["-l"]
/// rules:
///   guard:
///     include_path: includes/csrf.php
///     paths: ["backend/api/**", "backend/rpc/**"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories to scan.
    pub roots: Vec<PathBuf>,

    /// File extensions to consider (without the dot).
    pub extensions: Vec<String>,

    /// Glob patterns a file must match to be walked, matched on
    /// root-relative paths. Empty means every file.
    pub include: Vec<String>,

    /// Glob patterns excluded from the walk, matched on root-relative paths.
    pub exclude: Vec<String>,

    /// Plain path substrings excluded from the walk.
    pub exclude_fragments: Vec<String>,

    /// Restrict candidates to files tracked in the enclosing git repository.
    pub tracked_only: bool,

    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,

    /// Suffix appended to a file's path to form its backup path.
    pub backup_suffix: String,

    /// Restore the original from its backup when validation fails.
    pub restore_on_failure: bool,

    /// Upper bound on a single validator invocation.
    pub validator_timeout_secs: u64,

    /// Syntax-check command per file extension.
    pub validators: BTreeMap<String, CommandSpec>,

    /// Where the run report is written.
    pub report_path: PathBuf,

    /// Where the already-processed registry is persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,

    pub rules: RuleSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut validators = BTreeMap::new();
        validators.insert("php".to_string(), CommandSpec::new("php", &["-l"]));
        for ext in ["js", "cjs", "mjs"] {
            validators.insert(ext.to_string(), CommandSpec::new("node", &["--check"]));
        }

        Self {
            roots: vec![PathBuf::from(".")],
            extensions: ["php", "js", "cjs", "mjs", "html", "htm"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_fragments: ["/vendor/", "/node_modules/", "/.git/", "/reports/", "/tools/"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            tracked_only: false,
            max_file_size: 2 * 1024 * 1024,
            backup_suffix: ".bak".to_string(),
            restore_on_failure: true,
            validator_timeout_secs: 30,
            validators,
            report_path: PathBuf::from("reports/srcpatch_report.json"),
            registry_path: None,
            rules: RuleSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a config file, choosing JSON for `.json` and YAML otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(path)
        } else {
            Self::from_yaml(path)
        }
    }

    /// Loads `path` if given, else [`DEFAULT_CONFIG_FILE`] in `dir` if it
    /// exists, else the defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        serde_yaml::from_str(&content).map_err(|e| {
            PatchError::InvalidConfig(format!("Failed to parse YAML config: {}", e))
        })
    }

    /// Load config from a JSON file.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            PatchError::InvalidConfig(format!("Failed to parse JSON config: {}", e))
        })
    }

    /// Save config to a YAML file.
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| {
            PatchError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Save config to a JSON file.
    pub fn to_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            PatchError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Returns the registry path, defaulting to `<report stem>.registry.json`
    /// next to the report.
    pub fn registry_path(&self) -> PathBuf {
        if let Some(path) = &self.registry_path {
            return path.clone();
        }
        let stem = self
            .report_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("srcpatch_report");
        self.report_path
            .with_file_name(format!("{}.registry.json", stem))
    }

    /// Returns the validator timeout as a [`Duration`].
    pub fn validator_timeout(&self) -> Duration {
        Duration::from_secs(self.validator_timeout_secs)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backup_suffix.is_empty() {
            return Err(PatchError::InvalidConfig(
                "backup_suffix must not be empty".to_string(),
            ));
        }
        if self.roots.is_empty() {
            return Err(PatchError::InvalidConfig(
                "at least one root is required".to_string(),
            ));
        }
        if self.validator_timeout_secs == 0 {
            return Err(PatchError::InvalidConfig(
                "validator_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        PatchError::InvalidConfig(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })
}
