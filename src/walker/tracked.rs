//! Git index lookup for `tracked_only` walks.

use crate::error::Result;
use git2::Repository;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The set of files tracked in the index of the repository enclosing a root.
#[derive(Debug, Clone, Default)]
pub struct TrackedFiles {
    paths: HashSet<PathBuf>,
}

impl TrackedFiles {
    /// Reads the index of the repository containing `root`.
    pub fn discover(root: &Path) -> Result<Self> {
        let repo = Repository::discover(root)?;
        let workdir = match repo.workdir() {
            Some(dir) => dir.canonicalize()?,
            None => return Ok(Self::default()),
        };

        let index = repo.index()?;
        let paths = index
            .iter()
            .filter_map(|entry| {
                let rel = std::str::from_utf8(&entry.path).ok()?;
                Some(workdir.join(rel))
            })
            .collect();
        Ok(Self { paths })
    }

    /// Returns true if `path` (absolute, canonical) is in the index.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
