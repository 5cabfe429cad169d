//! Path scoping for rules.
//!
//! A rule written for API endpoints has no business in a vendored library or
//! a page template. [`ScopedRule`] limits another rule to files whose
//! project-relative path matches one of its globs.

use super::{Anchor, Rule, SourceFile};
use crate::error::Result;
use crate::walker::build_glob_set;
use globset::GlobSet;
use std::path::{Component, Path, PathBuf};

/// Wraps a rule so it only applies under the given path globs.
pub struct ScopedRule {
    inner: Box<dyn Rule>,
    roots: Vec<PathBuf>,
    globs: GlobSet,
    patterns: Vec<String>,
}

impl ScopedRule {
    /// Scopes `inner` to `patterns`, matched against paths relative to
    /// `project_root`.
    pub fn new(inner: Box<dyn Rule>, patterns: &[String], project_root: &Path) -> Result<Self> {
        let globs = build_glob_set(patterns)?;
        let mut roots = vec![project_root.to_path_buf()];
        if let Ok(canonical) = project_root.canonicalize()
            && canonical != project_root
        {
            roots.push(canonical);
        }
        Ok(Self {
            inner,
            roots,
            globs,
            patterns: patterns.to_vec(),
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if `path` falls under one of the scope's globs.
    ///
    /// Relative paths are taken as already relative to the project root.
    pub fn contains(&self, path: &Path) -> bool {
        if path.is_relative() {
            let rel: PathBuf = path
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            return self.globs.is_match(rel);
        }
        self.roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .any(|rel| self.globs.is_match(rel))
    }
}

impl Rule for ScopedRule {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn extensions(&self) -> &[&'static str] {
        self.inner.extensions()
    }

    fn detect(&self, file: &SourceFile) -> bool {
        self.inner.detect(file)
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        self.inner.already_applied(file)
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        self.inner.locate(file)
    }

    fn locate_all(&self, file: &SourceFile) -> Vec<Anchor> {
        self.inner.locate_all(file)
    }

    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
        self.inner.splice(file, anchor)
    }

    fn transform(&self, file: &SourceFile, anchor: &Anchor) -> String {
        self.inner.transform(file, anchor)
    }

    fn transform_all(&self, file: &SourceFile, anchors: &[Anchor]) -> String {
        self.inner.transform_all(file, anchors)
    }

    fn runs_by_default(&self) -> bool {
        self.inner.runs_by_default()
    }

    fn applies_to(&self, path: &Path) -> bool {
        self.inner.applies_to(path) && self.contains(path)
    }
}
