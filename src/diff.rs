//! Diffs and previews of pending changes.

use similar::{ChangeTag, TextDiff};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const PREVIEW_CONTEXT: usize = 40;

/// Original and patched content of one file after every selected rule ran.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub original: String,
    pub patched: String,
    /// Ids of the rules that contributed, in execution order.
    pub rules: Vec<String>,
}

impl FileChange {
    /// Returns true if the content changed.
    pub fn has_changes(&self) -> bool {
        self.original != self.patched
    }

    pub fn diff(&self) -> String {
        unified_diff(&self.original, &self.patched, &self.path)
    }

    pub fn colorized_diff(&self) -> String {
        colorized_diff(&self.original, &self.patched, &self.path)
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diff(&self.original, &self.patched)
    }
}

/// Generates a unified diff between two strings.
pub fn unified_diff(original: &str, modified: &str, path: &Path) -> String {
    render(original, modified, path, false)
}

/// Colorized diff output for terminal display.
pub fn colorized_diff(original: &str, modified: &str, path: &Path) -> String {
    render(original, modified, path, true)
}

fn render(original: &str, modified: &str, path: &Path, color: bool) -> String {
    const RED: &str = "\x1b[31m";
    const GREEN: &str = "\x1b[32m";
    const CYAN: &str = "\x1b[36m";
    const RESET: &str = "\x1b[0m";

    let paint = |code: &'static str| if color { code } else { "" };
    let diff = TextDiff::from_lines(original, modified);
    let mut output = String::new();

    let _ = writeln!(output, "{}--- a/{}{}", paint(CYAN), path.display(), paint(RESET));
    let _ = writeln!(output, "{}+++ b/{}{}", paint(CYAN), path.display(), paint(RESET));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push('\n');
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, code) = match change.tag() {
                    ChangeTag::Delete => ("-", paint(RED)),
                    ChangeTag::Insert => ("+", paint(GREEN)),
                    ChangeTag::Equal => (" ", ""),
                };
                let reset = if code.is_empty() { "" } else { RESET };
                let _ = write!(output, "{}{}{}{}", code, sign, change.value(), reset);
                if change.missing_newline() {
                    output.push('\n');
                }
            }
        }
    }

    output
}

/// Builds a one-line preview of a splice: a short slice of the old content
/// before the anchor, the new text between `[+` and `+]`, and the start of
/// the old content after it.
pub fn splice_preview(content: &str, start: usize, end: usize, text: &str) -> String {
    let mut before_start = start.saturating_sub(PREVIEW_CONTEXT);
    while !content.is_char_boundary(before_start) {
        before_start += 1;
    }
    let mut after_end = (end + PREVIEW_CONTEXT).min(content.len());
    while !content.is_char_boundary(after_end) {
        after_end -= 1;
    }

    let mut preview = String::new();
    if end > start {
        let _ = write!(
            preview,
            "{}[-{}-][+{}+]{}",
            &content[before_start..start],
            &content[start..end],
            text,
            &content[end..after_end]
        );
    } else {
        let _ = write!(
            preview,
            "{}[+{}+]{}",
            &content[before_start..start],
            text,
            &content[end..after_end]
        );
    }
    preview.replace('\n', "\\n")
}

/// Represents a summary of changes.
#[derive(Debug, Default)]
pub struct DiffSummary {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffSummary {
    /// Creates a summary from original and modified content.
    pub fn from_diff(original: &str, modified: &str) -> Self {
        let diff = TextDiff::from_lines(original, modified);
        let mut insertions = 0;
        let mut deletions = 0;

        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => insertions += 1,
                ChangeTag::Delete => deletions += 1,
                ChangeTag::Equal => {}
            }
        }

        Self {
            files_changed: usize::from(insertions > 0 || deletions > 0),
            insertions,
            deletions,
        }
    }

    /// Combines two summaries.
    pub fn merge(&mut self, other: &DiffSummary) {
        self.files_changed += other.files_changed;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} file(s) changed, {} insertions(+), {} deletions(-)",
            self.files_changed, self.insertions, self.deletions
        )
    }
}
