//! Already-processed registry keyed by (path, content hash, rule id).
//!
//! After a rule modifies a file, the hash of the new content is recorded
//! for that rule. A later run that finds the same content short-circuits to
//! `skipped_already_applied` without consulting the rule's textual markers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// One processed (file, content, rule) triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub path: PathBuf,
    pub hash: String,
    pub rule: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedRegistry {
    entries: BTreeSet<ProcessedEntry>,
    #[serde(skip)]
    dirty: bool,
}

/// Hex blake3 digest of file content.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

impl ProcessedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the registry, or starts empty when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the registry if it changed since loading.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        self.dirty = false;
        Ok(())
    }

    /// Returns true if `rule` produced exactly this content at `path`.
    pub fn contains(&self, path: &Path, content: &str, rule: &str) -> bool {
        self.entries.contains(&ProcessedEntry {
            path: path.to_path_buf(),
            hash: content_hash(content),
            rule: rule.to_string(),
        })
    }

    /// Records that `rule` produced `content` at `path`.
    pub fn record(&mut self, path: &Path, content: &str, rule: &str) {
        let inserted = self.entries.insert(ProcessedEntry {
            path: path.to_path_buf(),
            hash: content_hash(content),
            rule: rule.to_string(),
        });
        self.dirty |= inserted;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_lookup() {
        let mut registry = ProcessedRegistry::new();
        let path = Path::new("/p/a.php");
        registry.record(path, "<?php\nnew();\n", "csrf-guard");

        assert!(registry.contains(path, "<?php\nnew();\n", "csrf-guard"));
        assert!(!registry.contains(path, "<?php\nnew();\n", "recovery-clause"));
        assert!(!registry.contains(path, "<?php\nedited();\n", "csrf-guard"));
        assert!(!registry.contains(Path::new("/p/b.php"), "<?php\nnew();\n", "csrf-guard"));
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("reports/run.registry.json");

        let mut registry = ProcessedRegistry::load(&file).unwrap();
        assert!(registry.is_empty());
        registry.record(Path::new("a.js"), "x", "recovery-clause");
        registry.record(Path::new("a.js"), "x", "recovery-clause");
        assert_eq!(registry.len(), 1);
        registry.save(&file).unwrap();

        let loaded = ProcessedRegistry::load(&file).unwrap();
        assert!(loaded.contains(Path::new("a.js"), "x", "recovery-clause"));
    }

    #[test]
    fn test_clean_registry_not_written() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("registry.json");
        ProcessedRegistry::new().save(&file).unwrap();
        assert!(!file.exists());
    }
}
