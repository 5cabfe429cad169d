//! Remediation rules: detect, check, locate, transform.
//!
//! A [`Rule`] packages one remediation concern as pure functions over a
//! file's content. The engine drives every rule through the same sequence:
//!
//! 1. [`Rule::detect`] - is the file a candidate at all?
//! 2. [`Rule::already_applied`] - is the fix already present?
//! 3. [`Rule::locate_all`] - where exactly may text be spliced?
//! 4. [`Rule::transform_all`] - produce the new content.
//!
//! Rules never touch the disk. A rule that cannot find a safe splice point
//! returns no anchors, and the engine records the file for manual review
//! instead of guessing.
//!
//! # Example
//!
//! ```rust
//! use source_patch::rule::{Rule, SourceFile, RecoveryClause};
//!
//! let rule = RecoveryClause::new();
//! let file = SourceFile::new("app.js", "try {\n  risky();\n}\n");
//!
//! assert!(rule.detect(&file));
//! assert!(!rule.already_applied(&file));
//!
//! let anchors = rule.locate_all(&file);
//! let patched = rule.transform_all(&file, &anchors);
//! assert!(patched.starts_with("try {\n  risky();\n} catch (e) {"));
//! ```

mod bootstrap;
mod form_token;
mod guard;
mod header;
mod image_alt;
mod label;
mod markup;
mod recovery;
mod scope;

pub use bootstrap::{BootstrapInsertion, BootstrapReplacement};
pub use form_token::FormToken;
pub use guard::CsrfGuard;
pub use header::HeaderInclude;
pub use image_alt::ImageAlt;
pub use label::LabelAssociation;
pub use recovery::RecoveryClause;
pub use scope::ScopedRule;

use crate::config::RuleSettings;
use crate::encoding::TextEncoding;
use crate::error::{PatchError, Result};
use crate::lexer::{CodeMap, skip_whitespace_and_comments};
use markup::MarkupMap;
use regex::Regex;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// A file on disk loaded for scanning.
///
/// The content is immutable for the duration of a rule pass.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
    /// How `content` maps back to bytes on disk.
    pub encoding: TextEncoding,
}

impl SourceFile {
    /// Creates a source file from a path and in-memory content.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: TextEncoding::Utf8,
        }
    }

    /// Reads a source file from disk. Bytes that are not UTF-8 are decoded
    /// one character per byte.
    pub fn load(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let (content, encoding) = TextEncoding::decode(std::fs::read(&path)?);
        Ok(Self {
            path,
            content,
            encoding,
        })
    }

    /// Returns a scanner over the file's code regions.
    ///
    /// PHP files scan their PHP blocks and any `<script>` bodies outside
    /// them; HTML files scan only `<script>` bodies. Everything else is code
    /// throughout. Page text between regions never opens a string.
    pub fn code_map(&self) -> CodeMap<'_> {
        let content = self.content.as_str();
        match self.extension().as_deref() {
            Some("php") => {
                let php = php_regions(content);
                let mut regions: Vec<Range<usize>> = markup::script_bodies(content)
                    .into_iter()
                    .filter(|s| !php.iter().any(|p| p.start < s.end && s.start < p.end))
                    .collect();
                regions.extend(php);
                CodeMap::new(content, regions)
            }
            Some("html" | "htm") => CodeMap::new(content, markup::script_bodies(content)),
            _ => CodeMap::whole(content),
        }
    }

    /// Returns the lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Returns the file name as a string, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Why a locator chose a splice point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorTag {
    /// Right after a `<?php` opening tag and its leading whitespace.
    AfterOpenTag,
    /// After a `declare(...);` prologue that must stay the first statement.
    AfterDeclare,
    /// Immediately after the `}` closing a block.
    MatchingCloseBrace,
    /// A form control after a label, which receives the given id.
    NextSiblingControl { id: String },
    /// A form control before a label, which receives the given id.
    PreviousSiblingControl { id: String },
    /// A label whose reference is rewritten to the given id.
    LabelReference { id: String },
    /// A marker-introduced block up to one of the ordered fallback anchors.
    FallbackAnchor { anchor: String },
    /// Inside a markup tag, just before its closing `>` or `/>`.
    BeforeTagClose,
    /// Right after a `<form ...>` opening tag.
    AfterFormOpen,
    /// The very beginning of the file.
    FileStart,
}

impl AnchorTag {
    /// Returns the stable rationale name of this tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorTag::AfterOpenTag => "after-open-tag",
            AnchorTag::AfterDeclare => "after-declare",
            AnchorTag::MatchingCloseBrace => "matching-close-brace",
            AnchorTag::NextSiblingControl { .. } => "next-sibling-control",
            AnchorTag::PreviousSiblingControl { .. } => "previous-sibling-control",
            AnchorTag::LabelReference { .. } => "label-reference",
            AnchorTag::FallbackAnchor { .. } => "fallback-anchor",
            AnchorTag::BeforeTagClose => "before-tag-close",
            AnchorTag::AfterFormOpen => "after-form-open",
            AnchorTag::FileStart => "file-start",
        }
    }

    /// Returns true if the anchor edits markup rather than code.
    pub fn is_markup(&self) -> bool {
        matches!(
            self,
            AnchorTag::NextSiblingControl { .. }
                | AnchorTag::PreviousSiblingControl { .. }
                | AnchorTag::LabelReference { .. }
                | AnchorTag::BeforeTagClose
                | AnchorTag::AfterFormOpen
                | AnchorTag::FileStart
        )
    }
}

impl std::fmt::Display for AnchorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located splice point: the byte range `[start, end)` is replaced by the
/// rule's splice text. `start == end` is a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub start: usize,
    pub end: usize,
    pub tag: AnchorTag,
}

impl Anchor {
    /// Creates an insertion anchor.
    pub fn insert(at: usize, tag: AnchorTag) -> Self {
        Self {
            start: at,
            end: at,
            tag,
        }
    }

    /// Creates a replacement anchor.
    pub fn replace(range: Range<usize>, tag: AnchorTag) -> Self {
        Self {
            start: range.start,
            end: range.end,
            tag,
        }
    }

    /// Returns true if this anchor inserts without removing text.
    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }
}

/// A remediation concern expressed as pure functions over file content.
pub trait Rule: Send + Sync {
    /// Stable identifier used on the command line and in reports.
    fn id(&self) -> &str;

    /// Human-readable description of what the rule fixes.
    fn description(&self) -> &str;

    /// Lowercase file extensions this rule considers; empty means all.
    fn extensions(&self) -> &[&'static str] {
        &[]
    }

    /// Cheap heuristic: does this file plausibly need the fix?
    fn detect(&self, file: &SourceFile) -> bool;

    /// Is the rule's own signature already present?
    fn already_applied(&self, file: &SourceFile) -> bool;

    /// Finds the splice point, or `None` when no safe anchor exists.
    fn locate(&self, file: &SourceFile) -> Option<Anchor>;

    /// Finds every splice point. Rules that fix several sites per file
    /// override this; the default wraps [`Rule::locate`].
    fn locate_all(&self, file: &SourceFile) -> Vec<Anchor> {
        self.locate(file).into_iter().collect()
    }

    /// Returns the text that replaces the anchor's range.
    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String;

    /// Applies a single anchor to the file content.
    fn transform(&self, file: &SourceFile, anchor: &Anchor) -> String {
        let text = self.splice(file, anchor);
        splice_text(&file.content, anchor, &text)
    }

    /// Applies every anchor bottom-to-top, so earlier offsets stay valid.
    fn transform_all(&self, file: &SourceFile, anchors: &[Anchor]) -> String {
        let mut ordered: Vec<&Anchor> = anchors.iter().collect();
        ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

        let mut content = file.content.clone();
        for anchor in ordered {
            let text = self.splice(file, anchor);
            content.replace_range(anchor.start..anchor.end, &text);
        }
        content
    }

    /// Returns false for rules that only run when selected by id or when
    /// re-driven from a report.
    fn runs_by_default(&self) -> bool {
        true
    }

    /// Returns true if this rule handles the file's extension.
    fn applies_to(&self, path: &Path) -> bool {
        let exts = self.extensions();
        if exts.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// Replaces the anchor's range in `content` with `text`.
pub fn splice_text(content: &str, anchor: &Anchor, text: &str) -> String {
    let mut out = String::with_capacity(content.len() + text.len());
    out.push_str(&content[..anchor.start]);
    out.push_str(text);
    out.push_str(&content[anchor.end..]);
    out
}

/// Checks that anchors are in bounds, on character boundaries, outside any
/// string or comment, and mutually non-overlapping.
///
/// Code anchors must fall in a code region of the file. Markup anchors must
/// stay out of markup comments, attribute values and embedded code. Both
/// edges of a replacement are checked.
///
/// Returns a diagnostic describing the first violation.
pub fn check_anchors(file: &SourceFile, anchors: &[Anchor]) -> std::result::Result<(), String> {
    let content = file.content.as_str();
    let mut ordered: Vec<&Anchor> = anchors.iter().collect();
    ordered.sort_by_key(|a| (a.start, a.end));

    let mut code = file.code_map();
    let mut markup: Option<MarkupMap> = None;
    let mut previous: Option<&Anchor> = None;
    for anchor in ordered {
        if anchor.start > anchor.end || anchor.end > content.len() {
            return Err(format!(
                "anchor {}..{} ({}) out of bounds",
                anchor.start, anchor.end, anchor.tag
            ));
        }
        if !content.is_char_boundary(anchor.start) || !content.is_char_boundary(anchor.end) {
            return Err(format!(
                "anchor {}..{} ({}) splits a character",
                anchor.start, anchor.end, anchor.tag
            ));
        }

        let edges: &[usize] = if anchor.is_insertion() {
            &[anchor.start]
        } else {
            &[anchor.start, anchor.end]
        };
        for &offset in edges {
            if anchor.tag.is_markup() {
                let map = markup.get_or_insert_with(|| MarkupMap::new(content));
                if let Some(span) = map.span_at(offset) {
                    return Err(format!(
                        "anchor at {} ({}) lies inside {}",
                        offset,
                        anchor.tag,
                        span.describe()
                    ));
                }
            } else {
                match code.position(offset) {
                    None => {
                        return Err(format!(
                            "anchor at {} ({}) lies outside code",
                            offset, anchor.tag
                        ));
                    }
                    Some(pos) if !pos.is_code() => {
                        return Err(format!(
                            "anchor at {} ({}) lies inside a string or comment",
                            offset, anchor.tag
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(prev) = previous
            && (anchor.start < prev.end || anchor.start == prev.start)
        {
            return Err(format!(
                "anchors {}..{} and {}..{} overlap",
                prev.start, prev.end, anchor.start, anchor.end
            ));
        }
        previous = Some(anchor);
    }
    Ok(())
}

static DECLARE_PROLOGUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*declare\s*\(.*?\)\s*;").expect("invalid regex"));

static NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^namespace\b").expect("invalid regex"));

/// Locates the insertion point after a file's first `<?php` open tag.
///
/// A leading `declare(...);` prologue is skipped so it remains the first
/// statement. Trailing whitespace is consumed up to and including the last
/// newline, so the inserted text starts on a fresh line without stealing the
/// next statement's indentation.
///
/// Returns `None` when a `namespace` declaration follows: statements cannot
/// precede it, so such files need a human.
pub(crate) fn php_open_anchor(content: &str) -> Option<Anchor> {
    let open = php_regions(content)
        .into_iter()
        .map(|r| r.start)
        .find(|&pos| content[pos..].starts_with("<?php"))?;

    let after_tag = open + "<?php".len();
    let rest = &content[after_tag..];
    let (base, tag) = match DECLARE_PROLOGUE.find(rest) {
        Some(m) => (after_tag + m.end(), AnchorTag::AfterDeclare),
        None => (after_tag, AnchorTag::AfterOpenTag),
    };

    let statement = skip_whitespace_and_comments(content, base);
    if NAMESPACE.is_match(&content[statement..]) {
        return None;
    }

    let tail = &content[base..];
    let ws_len = tail.len() - tail.trim_start().len();
    let insertion = match tail[..ws_len].rfind('\n') {
        Some(nl) => base + nl + 1,
        None => base + ws_len,
    };
    Some(Anchor::insert(insertion, tag))
}

/// Returns `"\n"` when the text before `at` does not already end in
/// whitespace, so inserted statements never fuse with a preceding token.
pub(crate) fn lead_separator(content: &str, at: usize) -> &'static str {
    match content[..at].chars().next_back() {
        Some(c) if !c.is_whitespace() => "\n",
        _ => "",
    }
}

/// Returns the byte ranges of PHP blocks: each `<?`, `<?php` or `<?=` up to
/// the following `?>`, or to the end of the file when unterminated.
pub(crate) fn php_regions(content: &str) -> Vec<Range<usize>> {
    let mut regions = Vec::new();
    let mut from = 0;
    while let Some(rel) = content[from..].find("<?") {
        let start = from + rel;
        let end = php_block_end(content, start);
        regions.push(start..end);
        from = end;
    }
    regions
}

/// Returns the offset just past the `?>` closing the PHP block opened at
/// `start`, or the end of the content.
pub(crate) fn php_block_end(content: &str, start: usize) -> usize {
    content[start + 2..]
        .find("?>")
        .map_or(content.len(), |e| start + 2 + e + 2)
}

/// Returns true if `offset` lies in any of the ranges.
pub(crate) fn in_regions(regions: &[Range<usize>], offset: usize) -> bool {
    regions.iter().any(|r| r.contains(&offset))
}

/// Registry of the built-in rules, in their fixed execution order.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// Creates a registry with every built-in rule configured from
    /// `settings`. Each rule is scoped to its configured `paths`, which are
    /// resolved against `project_root` when relative.
    pub fn new(settings: &RuleSettings, project_root: &Path) -> Result<Self> {
        let mut registry = Self::default();
        let root = project_root;
        registry.register_scoped(
            CsrfGuard::with_settings(settings.guard.clone()),
            &settings.guard.paths,
            root,
        )?;
        registry.register_scoped(
            BootstrapInsertion::with_settings(settings.bootstrap.clone()),
            &settings.bootstrap.paths,
            root,
        )?;
        registry.register_scoped(
            BootstrapReplacement::with_settings(settings.bootstrap.clone(), root),
            &settings.bootstrap.paths,
            root,
        )?;
        registry.register_scoped(RecoveryClause::new(), &settings.recovery.paths, root)?;
        registry.register_scoped(
            LabelAssociation::with_window(settings.label.search_window),
            &settings.label.paths,
            root,
        )?;
        registry.register_scoped(
            ImageAlt::with_placeholder(settings.image_alt.placeholder.clone()),
            &settings.image_alt.paths,
            root,
        )?;
        registry.register_scoped(
            FormToken::with_field(settings.form_token.field.clone()),
            &settings.form_token.paths,
            root,
        )?;
        registry.register_scoped(
            HeaderInclude::with_line(settings.header.include_line.clone()),
            &settings.header.paths,
            root,
        )?;
        Ok(registry)
    }

    /// Registers `rule` limited to `paths`; an empty list leaves it unscoped.
    fn register_scoped<R: Rule + 'static>(
        &mut self,
        rule: R,
        paths: &[String],
        project_root: &Path,
    ) -> Result<()> {
        if paths.is_empty() {
            self.register(Box::new(rule));
        } else {
            let id = rule.id().to_string();
            let scoped = ScopedRule::new(Box::new(rule), paths, project_root)
                .map_err(|e| PatchError::InvalidConfig(format!("paths of rule {id}: {e}")))?;
            self.register(Box::new(scoped));
        }
        Ok(())
    }

    /// Registers a rule at the end of the execution order.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Finds a rule by id.
    pub fn by_id(&self, id: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|r| r.id().eq_ignore_ascii_case(id))
            .map(|r| r.as_ref())
    }

    /// Removes and returns the rules with the given ids, in registry order.
    pub fn take(self, ids: &[String]) -> Result<Vec<Box<dyn Rule>>> {
        for id in ids {
            if self.by_id(id).is_none() {
                return Err(PatchError::UnknownRule(id.clone()));
            }
        }
        Ok(self
            .rules
            .into_iter()
            .filter(|r| ids.iter().any(|id| r.id().eq_ignore_ascii_case(id)))
            .collect())
    }

    /// Returns all registered rules.
    pub fn all(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Box<dyn Rule>> {
        self.rules
    }

    /// Returns the rules that run when none are selected.
    pub fn into_default_rules(self) -> Vec<Box<dyn Rule>> {
        self.rules
            .into_iter()
            .filter(|r| r.runs_by_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_php_open_anchor_plain() {
        let src = "<?php\nfoo();\n";
        let anchor = php_open_anchor(src).unwrap();
        assert_eq!(anchor.start, 6);
        assert_eq!(anchor.tag, AnchorTag::AfterOpenTag);
    }

    #[test]
    fn test_php_open_anchor_keeps_indentation() {
        let src = "<?php\n\n    foo();\n";
        let anchor = php_open_anchor(src).unwrap();
        assert_eq!(&src[anchor.start..], "    foo();\n");
    }

    #[test]
    fn test_php_open_anchor_after_declare() {
        let src = "<?php\ndeclare(strict_types=1);\n\nfoo();\n";
        let anchor = php_open_anchor(src).unwrap();
        assert_eq!(anchor.tag, AnchorTag::AfterDeclare);
        assert_eq!(&src[anchor.start..], "foo();\n");
    }

    #[test]
    fn test_php_open_anchor_missing() {
        assert!(php_open_anchor("<html></html>").is_none());
    }

    #[test]
    fn test_php_open_anchor_skips_short_echo_and_text() {
        let src = "<p>Don't panic</p>\n<?= $title ?>\n<?php\nsave();\n";
        let anchor = php_open_anchor(src).unwrap();
        assert_eq!(&src[anchor.start..], "save();\n");
    }

    #[test]
    fn test_php_open_anchor_refuses_namespace() {
        assert!(php_open_anchor("<?php\nnamespace App;\n\nfoo();\n").is_none());
        assert!(
            php_open_anchor("<?php\ndeclare(strict_types=1);\n// app\nnamespace App;\n").is_none()
        );
    }

    #[test]
    fn test_php_regions() {
        let src = "<p><?= $a ?></p><?php if ($x) {";
        let regions = php_regions(src);
        assert_eq!(regions.len(), 2);
        assert_eq!(&src[regions[0].clone()], "<?= $a ?>");
        assert_eq!(regions[1].end, src.len());
        assert!(in_regions(&regions, src.find("$x").unwrap()));
        assert!(!in_regions(&regions, src.find("</p>").unwrap()));
    }

    #[test]
    fn test_check_anchors_rejects_string_and_overlap() {
        let file = SourceFile::new("a.js", "a 'b' c");
        let inside = Anchor::insert(3, AnchorTag::MatchingCloseBrace);
        assert!(check_anchors(&file, &[inside]).is_err());

        let a = Anchor::replace(0..1, AnchorTag::MatchingCloseBrace);
        let b = Anchor::insert(0, AnchorTag::MatchingCloseBrace);
        assert!(check_anchors(&file, &[a, b]).is_err());

        let ok = Anchor::insert(6, AnchorTag::MatchingCloseBrace);
        assert!(check_anchors(&file, &[ok]).is_ok());

        let past_end = Anchor::insert(99, AnchorTag::MatchingCloseBrace);
        assert!(check_anchors(&file, &[past_end]).is_err());
    }

    #[test]
    fn test_check_anchors_checks_replacement_end() {
        let file = SourceFile::new("a.js", "x = 'abc';");
        let into_string = Anchor::replace(0..6, AnchorTag::MatchingCloseBrace);
        let err = check_anchors(&file, &[into_string]).unwrap_err();
        assert!(err.contains("at 6"));
    }

    #[test]
    fn test_check_anchors_page_text_is_not_code() {
        let src = "<p>Don't forget</p>\n<?php\nsave();\n";
        let file = SourceFile::new("page.php", src);
        let in_php = Anchor::insert(src.find("save").unwrap(), AnchorTag::AfterOpenTag);
        assert!(check_anchors(&file, &[in_php]).is_ok());

        let in_text = Anchor::insert(src.find("forget").unwrap(), AnchorTag::AfterOpenTag);
        let err = check_anchors(&file, &[in_text]).unwrap_err();
        assert!(err.contains("outside code"));
    }

    #[test]
    fn test_check_anchors_markup_spans() {
        let src = "<p>It's here</p><!-- <img src=x> --><img src=\"a.png\" title='x'>";
        let file = SourceFile::new("page.html", src);
        let live = src.rfind("<img").unwrap();
        let close = live + src[live..].find('>').unwrap();
        assert!(check_anchors(&file, &[Anchor::insert(close, AnchorTag::BeforeTagClose)]).is_ok());

        let commented = src.find("<img").unwrap() + 4;
        let err =
            check_anchors(&file, &[Anchor::insert(commented, AnchorTag::BeforeTagClose)])
                .unwrap_err();
        assert!(err.contains("a markup comment"));

        let in_value = src.find("'x").unwrap() + 1;
        let err = check_anchors(&file, &[Anchor::insert(in_value, AnchorTag::BeforeTagClose)])
            .unwrap_err();
        assert!(err.contains("an attribute value"));
    }

    #[test]
    fn test_code_map_covers_scripts_outside_php() {
        let src = "<p>Don't</p><script>let a = 1;</script><?php $b = '<script>'; ?>";
        let file = SourceFile::new("page.php", src);
        let mut code = file.code_map();
        assert!(code.is_code(src.find("let a").unwrap()));
        assert!(code.is_code(src.find("$b").unwrap()));
        assert!(code.position(src.find("Don").unwrap()).is_none());
    }

    #[test]
    fn test_load_keeps_single_byte_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.php");
        std::fs::write(&path, b"<?php\n// caf\xe9\n").unwrap();
        let file = SourceFile::load(&path).unwrap();
        assert_eq!(file.encoding, TextEncoding::Latin1);
        assert_eq!(file.encoding.encode(&file.content).unwrap(), b"<?php\n// caf\xe9\n");
    }

    #[test]
    fn test_transform_all_bottom_to_top() {
        struct Upper;
        impl Rule for Upper {
            fn id(&self) -> &str {
                "upper"
            }
            fn description(&self) -> &str {
                "test"
            }
            fn detect(&self, _: &SourceFile) -> bool {
                true
            }
            fn already_applied(&self, _: &SourceFile) -> bool {
                false
            }
            fn locate(&self, _: &SourceFile) -> Option<Anchor> {
                None
            }
            fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
                file.content[anchor.start..anchor.end].to_uppercase()
            }
        }

        let file = SourceFile::new("x.txt", "ab cd ef");
        let anchors = vec![
            Anchor::replace(0..2, AnchorTag::FileStart),
            Anchor::replace(6..8, AnchorTag::FileStart),
        ];
        assert_eq!(Upper.transform_all(&file, &anchors), "AB cd EF");
    }

    #[test]
    fn test_registry_lookup_and_take() {
        let registry = RuleRegistry::new(&RuleSettings::default(), Path::new("/project")).unwrap();
        assert!(registry.by_id("csrf-guard").is_some());
        assert!(registry.by_id("recovery-clause").is_some());
        assert!(registry.by_id("missing").is_none());

        let rules = registry
            .take(&["label-for".to_string(), "csrf-guard".to_string()])
            .unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["csrf-guard", "label-for"]);
    }

    #[test]
    fn test_registry_take_unknown() {
        let registry = RuleRegistry::new(&RuleSettings::default(), Path::new("/project")).unwrap();
        let err = registry.take(&["nope".to_string()]).err().unwrap();
        assert!(matches!(err, PatchError::UnknownRule(_)));
    }

    #[test]
    fn test_default_rules_leave_out_opt_in_rules() {
        let registry = RuleRegistry::new(&RuleSettings::default(), Path::new("/project")).unwrap();
        let ids: Vec<String> = registry
            .into_default_rules()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert!(ids.contains(&"api-bootstrap".to_string()));
        assert!(!ids.contains(&"api-bootstrap-include".to_string()));
    }

    #[test]
    fn test_registry_scopes_rules_to_paths() {
        let registry = RuleRegistry::new(&RuleSettings::default(), Path::new("/project")).unwrap();
        let guard = registry.by_id("csrf-guard").unwrap();
        assert!(guard.applies_to(Path::new("/project/backend/api/save.php")));
        assert!(!guard.applies_to(Path::new("/project/vendor/lib/save.php")));

        let recovery = registry.by_id("recovery-clause").unwrap();
        assert!(recovery.applies_to(Path::new("/elsewhere/app.js")));
    }

    #[test]
    fn test_registry_rejects_bad_glob() {
        let mut settings = RuleSettings::default();
        settings.guard.paths = vec!["backend/[".to_string()];
        let err = RuleRegistry::new(&settings, Path::new("/project")).err().unwrap();
        assert!(err.is_usage());
        assert!(err.to_string().contains("csrf-guard"));
    }
}
