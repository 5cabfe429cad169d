//! API bootstrap rules: inline a guarded bootstrap block, and later collapse
//! it into a single include of the shared bootstrap file.

use regex::Regex;
use std::path::{Component, Path, PathBuf};

use super::{Anchor, AnchorTag, Rule, SourceFile, lead_separator, php_open_anchor};
use crate::config::BootstrapSettings;
use crate::lexer::find_matching_close;

/// Anchors tried in order when the guarded block cannot be matched.
/// Entries starting with a newline match at a line start; the others end
/// the replaced range at the start of their line.
const FALLBACK_ANCHORS: &[&str] = &[
    "\nif (session_status",
    "session_start()",
    "\nnamespace ",
    "\nrequire_once ",
    "\nheader(",
    "\ntry {",
    "\n//",
];

fn include_name(settings: &BootstrapSettings) -> &str {
    settings
        .include_target
        .rsplit('/')
        .next()
        .unwrap_or(&settings.include_target)
}

/// Inserts an output-buffering bootstrap block after the opening tag of
/// API endpoints. The block defines a marker constant so it runs once even
/// when several endpoints include each other.
#[derive(Debug, Clone, Default)]
pub struct BootstrapInsertion {
    settings: BootstrapSettings,
}

impl BootstrapInsertion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: BootstrapSettings) -> Self {
        Self { settings }
    }

    fn block(&self) -> String {
        let constant = &self.settings.marker_constant;
        format!(
            "{comment}
if (!defined('{constant}')) {{
    define('{constant}', true);
    ob_start();
    register_shutdown_function(function () {{
        $out = (string) @ob_get_clean();
        if ($out !== '') {{
            error_log('API emitted HTML: ' . substr(strip_tags($out), 0, 200));
        }}
    }});
}}
",
            comment = self.settings.marker_comment
        )
    }
}

impl Rule for BootstrapInsertion {
    fn id(&self) -> &str {
        "api-bootstrap"
    }

    fn description(&self) -> &str {
        "Insert a guarded output-buffering bootstrap block into API endpoints"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        file.content.trim_start().starts_with("<?php") || self.already_applied(file)
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        file.content.contains(&self.settings.marker_constant)
            || file.content.contains("ob_start();")
            || file.content.contains(include_name(&self.settings))
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        php_open_anchor(&file.content)
    }

    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
        format!(
            "{}{}\n",
            lead_separator(&file.content, anchor.start),
            self.block()
        )
    }
}

/// Replaces an inlined bootstrap block, from its marker comment through
/// the end of the guarded block, with a `require_once` of the shared
/// bootstrap file relative to the patched file.
///
/// The shared file must exist before endpoints point at it, so this rule
/// only runs when selected by id or re-driven from a report.
#[derive(Debug, Clone)]
pub struct BootstrapReplacement {
    settings: BootstrapSettings,
    target: PathBuf,
    guard: Regex,
}

impl BootstrapReplacement {
    /// Creates the rule; a relative include target is resolved against
    /// `project_root`.
    pub fn with_settings(settings: BootstrapSettings, project_root: &Path) -> Self {
        let target = normalize(&absolute(&project_root.join(&settings.include_target)));
        let guard = Regex::new(&format!(
            r#"if\s*\(\s*!\s*defined\s*\(\s*['"]{}['"]\s*\)\s*\)\s*\{{"#,
            regex::escape(&settings.marker_constant)
        ))
        .expect("invalid regex");
        Self {
            settings,
            target,
            guard,
        }
    }

    fn include_statement(&self, file: &SourceFile) -> String {
        let dir = file
            .path
            .parent()
            .map(|p| normalize(&absolute(p)))
            .unwrap_or_default();
        format!(
            "require_once __DIR__ . '/{}';",
            relative_path(&dir, &self.target)
        )
    }

    fn block_end(&self, content: &str, from: usize) -> Option<usize> {
        let m = self.guard.find_at(content, from)?;
        let close = find_matching_close(content, m.end() - 1)?;
        let after = close + 1;
        let ws = content[after..].len() - content[after..].trim_start().len();
        Some(after + ws)
    }

    fn fallback_end(content: &str, from: usize) -> Option<(usize, &'static str)> {
        FALLBACK_ANCHORS.iter().find_map(|anchor| {
            let p = from + content[from..].find(anchor)?;
            let end = if anchor.starts_with('\n') {
                p + 1
            } else {
                content[..p].rfind('\n').map(|i| i + 1).unwrap_or(0).max(from)
            };
            Some((end, anchor.trim()))
        })
    }
}

impl Rule for BootstrapReplacement {
    fn id(&self) -> &str {
        "api-bootstrap-include"
    }

    fn description(&self) -> &str {
        "Collapse inlined API bootstrap blocks into a require_once of the shared bootstrap"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        file.content.contains(&self.settings.marker_comment)
            || file.content.contains(include_name(&self.settings))
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        !file.content.contains(&self.settings.marker_comment)
            && file.content.contains(include_name(&self.settings))
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        let content = file.content.as_str();
        let start = content.find(&self.settings.marker_comment)?;
        let after_marker = start + self.settings.marker_comment.len();

        if let Some(end) = self.block_end(content, after_marker) {
            return Some(Anchor::replace(start..end, AnchorTag::MatchingCloseBrace));
        }
        let (end, anchor) = Self::fallback_end(content, after_marker)?;
        Some(Anchor::replace(
            start..end,
            AnchorTag::FallbackAnchor {
                anchor: anchor.to_string(),
            },
        ))
    }

    fn splice(&self, file: &SourceFile, _anchor: &Anchor) -> String {
        format!("{}\n\n", self.include_statement(file))
    }

    fn runs_by_default(&self) -> bool {
        false
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Resolves `.` and `..` components lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns the `/`-separated path from directory `from` to `to`.
fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
