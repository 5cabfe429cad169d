//! Syntax validation through the target language's own checker.

use crate::config::{CommandSpec, EngineConfig};
use crate::error::{PatchError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of validating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub passed: bool,
    pub diagnostic: String,
}

impl Validation {
    pub fn pass(diagnostic: impl Into<String>) -> Self {
        Self {
            passed: true,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Confirms that a file on disk is still syntactically well formed.
pub trait Validator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Checks the file at `path`.
    ///
    /// An `Err` means the check could not run at all, which callers treat
    /// as a failed validation.
    fn validate(&self, path: &Path) -> Result<Validation>;
}

/// Runs an external checker such as `php -l` or `node --check`, bounded by
/// a timeout. The file path is appended as the last argument; a zero exit
/// status passes.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    spec: CommandSpec,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(spec: CommandSpec, timeout: Duration) -> Self {
        Self { spec, timeout }
    }

    fn spawn(&self, path: &Path) -> Result<Child> {
        Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PatchError::ValidatorSpawn {
                path: path.to_path_buf(),
                message: format!("{}: {}", self.spec.program, e),
            })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

impl Validator for CommandValidator {
    fn name(&self) -> &str {
        &self.spec.program
    }

    fn validate(&self, path: &Path) -> Result<Validation> {
        let mut child = self.spawn(path)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if started.elapsed() >= self.timeout {
                warn!(path = %path.display(), validator = %self.spec.program, "validator timed out");
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let mut output = stdout.join().unwrap_or_default();
        output.push_str(&stderr.join().unwrap_or_default());
        let output = output.trim().to_string();

        match status {
            None => Ok(Validation::fail(format!(
                "{} timed out after {}s",
                self.spec.program,
                self.timeout.as_secs_f32()
            ))),
            Some(status) if status.success() => {
                debug!(path = %path.display(), validator = %self.spec.program, "validation passed");
                Ok(Validation::pass(output))
            }
            Some(status) => {
                let diagnostic = if output.is_empty() {
                    format!("{} exited with {}", self.spec.program, status)
                } else {
                    output
                };
                Ok(Validation::fail(diagnostic))
            }
        }
    }
}

/// Validators keyed by lowercase file extension.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Box<dyn Validator>>,
}

impl ValidatorRegistry {
    /// Creates an empty registry: every file passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates command validators for every configured extension.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        for (ext, spec) in &config.validators {
            registry.register(
                ext,
                Box::new(CommandValidator::new(spec.clone(), config.validator_timeout())),
            );
        }
        registry
    }

    /// Registers a validator for an extension, replacing any previous one.
    pub fn register(&mut self, ext: &str, validator: Box<dyn Validator>) {
        self.validators.insert(ext.to_ascii_lowercase(), validator);
    }

    /// Returns the validator for the file's extension.
    pub fn for_path(&self, path: &Path) -> Option<&dyn Validator> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.validators.get(&ext).map(|v| v.as_ref())
    }

    /// Validates a file; files without a validator pass.
    pub fn validate(&self, path: &Path) -> Validation {
        match self.for_path(path) {
            Some(validator) => validator
                .validate(path)
                .unwrap_or_else(|e| Validation::fail(e.to_string())),
            None => Validation::pass(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
