//! # Source Patch
//!
//! A rule-driven engine for safe, idempotent source rewrites across PHP,
//! JavaScript and HTML trees.
//!
//! This crate provides:
//! - File discovery by root, extension, glob and path fragment, optionally
//!   limited to files tracked by Git
//! - A quote, comment and brace aware scanner that keeps insertions out of
//!   string literals and comments
//! - Built-in rules that detect a weakness, find a safe anchor and splice in
//!   a fix
//! - Transactional application: backup, write, validate, roll back
//! - JSON run reports and a re-validation gate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use source_patch::prelude::*;
//!
//! // Preview recovery clauses for try blocks without catch or finally
//! let result = Patcher::in_dir("./frontend")
//!     .rule("recovery-clause")
//!     .dry_run()
//!     .run()?;
//!
//! println!("{}", result.report.summary());
//! println!("{}", result.diff());
//! # Ok::<(), source_patch::error::PatchError>(())
//! ```
//!
//! ## Applying and gating
//!
//! ```rust,no_run
//! use source_patch::prelude::*;
//!
//! let config = EngineConfig::discover(None, std::path::Path::new("."))?;
//! let registry = config.registry_path();
//! let result = Patcher::new(config)
//!     .rules(["csrf-guard", "form-csrf-token"])
//!     .registry(registry)
//!     .apply_changes()
//!     .run()?;
//!
//! if let Some(gate) = &result.gate {
//!     println!("re-validated {} file(s)", gate.checked);
//! }
//! # Ok::<(), source_patch::error::PatchError>(())
//! ```
//!
//! ## Writing a rule
//!
//! A rule implements [`Rule`]: `detect` decides whether the weakness is
//! present, `already_applied` recognises prior output, `locate_all` returns
//! the anchors and `splice` renders the text for one anchor. The engine
//! checks every anchor before anything is spliced.

pub mod applier;
pub mod config;
pub mod diff;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod registry;
pub mod report;
pub mod rule;
pub mod validator;
pub mod walker;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::applier::{ApplyOutcome, PatchApplier};
    pub use crate::config::{CommandSpec, EngineConfig, RuleSettings};
    pub use crate::diff::{DiffSummary, FileChange};
    pub use crate::engine::{GateResult, Patcher, RunResult, lint_report};
    pub use crate::encoding::TextEncoding;
    pub use crate::error::{PatchError, Result};
    pub use crate::lexer::{CodeMap, Scanner};
    pub use crate::registry::ProcessedRegistry;
    pub use crate::report::{RuleResult, RunMode, RunReport, Status, Summary};
    pub use crate::rule::{
        Anchor, AnchorTag, BootstrapInsertion, BootstrapReplacement, CsrfGuard, FormToken,
        HeaderInclude, ImageAlt, LabelAssociation, RecoveryClause, Rule, RuleRegistry, ScopedRule,
        SourceFile,
    };
    pub use crate::validator::{CommandValidator, Validation, Validator, ValidatorRegistry};
    pub use crate::walker::FileWalker;
}

pub use prelude::*;
