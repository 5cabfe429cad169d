//! Recovery clause: closes bare `try { }` blocks with a logging `catch`.

use regex::Regex;
use std::sync::LazyLock;

use super::{Anchor, AnchorTag, Rule, SourceFile, in_regions, php_regions};
use crate::lexer::{line_indent, skip_whitespace_and_comments};

/// Text embedded in every inserted clause.
pub const RECOVERY_MARKER: &str = "Auto-inserted recovery clause";

static TRY_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btry\s*\{").expect("invalid regex"));

/// A `try` keyword found in code, with its block end if it balances.
#[derive(Debug, Clone, Copy)]
struct TrySite {
    close: Option<usize>,
    recovered: bool,
}

/// Appends a minimal logging `catch` clause to every `try` block that is
/// followed by neither `catch` nor `finally`.
///
/// Inside PHP regions of `.php` files the clause catches `\Throwable` and
/// logs through `error_log`; everywhere else it is a JavaScript clause
/// logging through `console.error`. The clause keeps the indentation of the
/// block's closing line.
#[derive(Debug, Clone, Default)]
pub struct RecoveryClause;

impl RecoveryClause {
    pub fn new() -> Self {
        Self
    }

    /// Finds `try` blocks in the file's code regions. A block must close
    /// within the region it opens in.
    fn sites(file: &SourceFile) -> Vec<TrySite> {
        let mut code = file.code_map();
        let mut sites = Vec::new();
        for m in TRY_OPEN.find_iter(&file.content) {
            if !code.is_code(m.start()) {
                continue;
            }
            let close = code.matching_close(m.end() - 1);
            let recovered =
                close.is_some_and(|c| followed_by_handler(code.through_region(c), c + 1));
            sites.push(TrySite { close, recovered });
        }
        sites
    }

    fn is_php_site(file: &SourceFile, offset: usize) -> bool {
        file.extension().as_deref() == Some("php")
            && in_regions(&php_regions(&file.content), offset)
    }
}

fn followed_by_handler(content: &str, from: usize) -> bool {
    let next = skip_whitespace_and_comments(content, from);
    let rest = content[next..].as_bytes();
    ["catch", "finally"].iter().any(|kw| {
        rest.len() >= kw.len()
            && rest[..kw.len()].eq_ignore_ascii_case(kw.as_bytes())
            && rest
                .get(kw.len())
                .is_none_or(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
    })
}

impl Rule for RecoveryClause {
    fn id(&self) -> &str {
        "recovery-clause"
    }

    fn description(&self) -> &str {
        "Append a logging catch clause to try blocks without catch or finally"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php", "js", "cjs", "mjs", "ts", "html", "htm"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        file.content.contains(RECOVERY_MARKER) || Self::sites(file).iter().any(|s| !s.recovered)
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        file.content.contains(RECOVERY_MARKER)
            && Self::sites(file).iter().all(|s| s.recovered)
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        self.locate_all(file).into_iter().next()
    }

    /// Fixes every bare block or none: a file with an unbalanced bare
    /// block gets no anchors, so it is reviewed as a whole.
    fn locate_all(&self, file: &SourceFile) -> Vec<Anchor> {
        let bare: Vec<TrySite> = Self::sites(file)
            .into_iter()
            .filter(|s| !s.recovered)
            .collect();
        bare.iter()
            .map(|s| {
                s.close
                    .map(|close| Anchor::insert(close + 1, AnchorTag::MatchingCloseBrace))
            })
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default()
    }

    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
        let indent = line_indent(&file.content, anchor.start.saturating_sub(1));
        if Self::is_php_site(file, anchor.start) {
            format!(
                " catch (\\Throwable $e) {{\n{indent}    error_log('{RECOVERY_MARKER}: ' . $e->getMessage());\n{indent}}}"
            )
        } else {
            format!(
                " catch (e) {{\n{indent}    console.error('{RECOVERY_MARKER}:', e);\n{indent}}}"
            )
        }
    }
}
