//! Durable, transactional application of rule output.
//!
//! In apply mode every write is preceded by a byte-identical backup written
//! to a fresh path (`<file><suffix>`, then `<suffix>1`, `<suffix>2`, ...), so
//! an existing backup is never overwritten. After the write the file is
//! validated; on failure the original is copied back from the backup. The
//! backup itself is never deleted.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::report::{RunMode, Status};
use crate::validator::ValidatorRegistry;

const MAX_BACKUP_ATTEMPTS: usize = 10_000;

/// What happened to one file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub status: Status,
    pub backup: Option<PathBuf>,
    pub diagnostic: Option<String>,
}

impl ApplyOutcome {
    fn new(status: Status) -> Self {
        Self {
            status,
            backup: None,
            diagnostic: None,
        }
    }
}

/// Writes rule output to disk with backup, validation and rollback.
pub struct PatchApplier<'a> {
    mode: RunMode,
    backup_suffix: String,
    restore_on_failure: bool,
    validators: &'a ValidatorRegistry,
}

impl<'a> PatchApplier<'a> {
    pub fn new(mode: RunMode, validators: &'a ValidatorRegistry) -> Self {
        Self {
            mode,
            backup_suffix: ".bak".to_string(),
            restore_on_failure: true,
            validators,
        }
    }

    pub fn backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    pub fn restore_on_failure(mut self, restore: bool) -> Self {
        self.restore_on_failure = restore;
        self
    }

    /// Returns the `n`-th candidate backup path for `path`.
    fn backup_candidate(&self, path: &Path, n: usize) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(&self.backup_suffix);
        if n > 0 {
            name.push(n.to_string());
        }
        PathBuf::from(name)
    }

    /// Writes `content` to the first backup path that does not exist yet.
    pub fn write_backup(&self, path: &Path, content: &[u8]) -> std::io::Result<PathBuf> {
        for n in 0..MAX_BACKUP_ATTEMPTS {
            let candidate = self.backup_candidate(path, n);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut file) => {
                    file.write_all(content)?;
                    file.sync_all()?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free backup path for {}", path.display()),
        ))
    }

    /// Makes `new` durable at `path`, whose current bytes are `old`.
    ///
    /// Dry-run mode performs no filesystem writes.
    pub fn apply(&self, path: &Path, old: &[u8], new: &[u8]) -> ApplyOutcome {
        if self.mode == RunMode::DryRun {
            return ApplyOutcome::new(Status::CandidateDryrun);
        }

        let backup = match self.write_backup(path, old) {
            Ok(backup) => backup,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "backup failed");
                let mut outcome = ApplyOutcome::new(Status::BackupFailed);
                outcome.diagnostic = Some(e.to_string());
                return outcome;
            }
        };
        info!(path = %path.display(), backup = %backup.display(), "backup written");

        let mut outcome = ApplyOutcome::new(Status::Modified);
        outcome.backup = Some(backup.clone());

        if let Err(e) = std::fs::write(path, new) {
            warn!(path = %path.display(), error = %e, "write failed; backup left in place");
            outcome.status = Status::WriteFailed;
            outcome.diagnostic = Some(e.to_string());
            return outcome;
        }

        let validation = self.validators.validate(path);
        if validation.passed {
            info!(path = %path.display(), "modified");
            return outcome;
        }

        warn!(path = %path.display(), diagnostic = %validation.diagnostic, "validation failed");
        outcome.status = Status::ValidationFailed;
        let mut diagnostic = validation.diagnostic;
        if self.restore_on_failure {
            match std::fs::copy(&backup, path) {
                Ok(_) => {
                    warn!(path = %path.display(), backup = %backup.display(), "restored original from backup");
                    diagnostic.push_str("\n(original restored from backup)");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "rollback failed");
                    diagnostic.push_str(&format!("\n(rollback failed: {})", e));
                }
            }
        }
        outcome.diagnostic = Some(diagnostic);
        outcome
    }
}
