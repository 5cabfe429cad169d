//! Candidate file discovery.
//!
//! The walker enumerates files under one or more roots and filters them by
//! extension, include/exclude globs, plain path fragments, size, and
//! optionally git index membership. Backup files written by the applier are
//! never returned, so a run never patches its own backups.

mod tracked;

pub use tracked::TrackedFiles;

use crate::config::EngineConfig;
use crate::error::{PatchError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Enumerates candidate source files.
#[derive(Default, Clone)]
pub struct FileWalker {
    extensions: Vec<String>,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
    exclude_fragments: Vec<String>,
    backup_suffix: Option<String>,
    max_size: Option<u64>,
    tracked_only: bool,
}

impl FileWalker {
    /// Creates a new walker that accepts every file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a walker from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut walker = Self::new()
            .extensions(config.extensions.iter().cloned())
            .backup_suffix(config.backup_suffix.clone())
            .max_size(config.max_file_size)
            .tracked_only(config.tracked_only);
        for pattern in &config.include {
            walker = walker.include(pattern.as_str());
        }
        for pattern in &config.exclude {
            walker = walker.exclude(pattern.as_str());
        }
        for fragment in &config.exclude_fragments {
            walker = walker.exclude_fragment(fragment.as_str());
        }
        walker
    }

    /// Matches files with the given extension (without dot).
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extensions.push(ext.into());
        self
    }

    /// Matches files with any of the given extensions.
    pub fn extensions(mut self, exts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extensions.extend(exts.into_iter().map(Into::into));
        self
    }

    /// Includes only files matching the glob pattern.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_globs.push(pattern.into());
        self
    }

    /// Excludes files matching the glob pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_globs.push(pattern.into());
        self
    }

    /// Excludes files whose root-relative path, with a leading `/`,
    /// contains `fragment` (e.g. `/vendor/`).
    pub fn exclude_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.exclude_fragments.push(fragment.into());
        self
    }

    /// Skips backup files carrying this suffix, with or without a numeric
    /// collision counter.
    pub fn backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = Some(suffix.into());
        self
    }

    /// Skips files larger than the given size in bytes.
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Restricts the walk to files tracked by git.
    pub fn tracked_only(mut self, tracked: bool) -> Self {
        self.tracked_only = tracked;
        self
    }

    /// Collects matching files under every root, sorted and deduplicated.
    pub fn collect_all(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for root in roots {
            files.extend(self.collect(root)?);
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Collects all matching files from the given root directory.
    ///
    /// Returned paths are absolute.
    pub fn collect(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let root = root
            .canonicalize()
            .map_err(|_| PatchError::RootNotFound(root.to_path_buf()))?;
        let include_set = build_glob_set(&self.include_globs)?;
        let exclude_set = build_glob_set(&self.exclude_globs)?;
        let tracked = if self.tracked_only {
            let tracked = TrackedFiles::discover(&root)?;
            if tracked.is_empty() {
                warn!(root = %root.display(), "git index is empty; no files will match");
            } else {
                debug!(root = %root.display(), tracked = tracked.len(), "loaded git index");
            }
            Some(tracked)
        } else {
            None
        };

        let mut matched = Vec::new();

        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }

            if !self.extensions.is_empty() {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if !self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
                    continue;
                }
            }

            let rel_path = path.strip_prefix(&root).unwrap_or(path);

            if !self.include_globs.is_empty() && !include_set.is_match(rel_path) {
                continue;
            }

            if !self.exclude_globs.is_empty() && exclude_set.is_match(rel_path) {
                continue;
            }

            let slashed = format!("/{}", rel_path.to_string_lossy().replace('\\', "/"));
            if let Some(fragment) = self
                .exclude_fragments
                .iter()
                .find(|f| slashed.contains(f.as_str()))
            {
                debug!(path = %path.display(), fragment = %fragment, "excluded by fragment");
                continue;
            }

            if let Some(suffix) = &self.backup_suffix
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| is_backup_name(name, suffix))
            {
                continue;
            }

            if let Some(max) = self.max_size
                && let Ok(metadata) = fs::metadata(path)
                && metadata.len() > max
            {
                debug!(path = %path.display(), size = metadata.len(), "skipping oversized file");
                continue;
            }

            if let Some(tracked) = &tracked
                && !tracked.contains(path)
            {
                continue;
            }

            matched.push(path.to_path_buf());
        }

        Ok(matched)
    }
}

/// Returns true if `name` ends with `suffix` optionally followed by digits.
pub fn is_backup_name(name: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    name.rfind(suffix).is_some_and(|idx| {
        name[idx + suffix.len()..]
            .bytes()
            .all(|b| b.is_ascii_digit())
    })
}

pub(crate) fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
