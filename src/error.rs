//! Error types for the patch engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for run-level failures.
///
/// File-scoped failures (unreadable file, failed backup, failed validation)
/// are not errors: they are recorded as [`crate::report::RuleResult`]s so one
/// file never aborts the run for the others.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Cannot read report {path}: {message}")]
    ReportRead { path: PathBuf, message: String },

    #[error("Validator could not be started for {path}: {message}")]
    ValidatorSpawn { path: PathBuf, message: String },

    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),
}

impl PatchError {
    /// Returns true if this error should map to the usage exit code.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            PatchError::UnknownRule(_)
                | PatchError::ReportRead { .. }
                | PatchError::InvalidConfig(_)
                | PatchError::RootNotFound(_)
        )
    }
}

/// A specialized Result type for patch engine operations.
pub type Result<T> = std::result::Result<T, PatchError>;
