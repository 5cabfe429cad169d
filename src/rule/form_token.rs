//! Hidden CSRF token fields for HTML forms.

use regex::Regex;
use std::sync::LazyLock;

use super::markup::{MarkupMap, attr_regex, attr_value, tag_regex};
use super::{Anchor, AnchorTag, Rule, SourceFile};
use crate::lexer::line_indent;

static FORM_TAG: LazyLock<Regex> = LazyLock::new(|| tag_regex("form"));
static FORM_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?form\b").expect("invalid regex"));
static INPUT_TAG: LazyLock<Regex> = LazyLock::new(|| tag_regex("input"));
static TYPE_ATTR: LazyLock<Regex> = LazyLock::new(|| attr_regex("type"));
static NAME_ATTR: LazyLock<Regex> = LazyLock::new(|| attr_regex("name"));

/// A rendered `<form>` opening tag and whether its body carries the token.
#[derive(Debug, Clone, Copy)]
struct Form {
    open_end: usize,
    has_token: bool,
}

/// Inserts a hidden token input right after every `<form ...>` opening tag
/// whose body lacks one.
///
/// A form's body runs to its `</form>`, the next `<form`, or the end of the
/// file. Forms echoed from PHP blocks cannot be edited safely; a file with
/// one that lacks the token gets no anchors and is left for manual review.
#[derive(Debug, Clone)]
pub struct FormToken {
    field: String,
}

impl Default for FormToken {
    fn default() -> Self {
        Self {
            field: "csrf_token".to_string(),
        }
    }
}

impl FormToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    fn input(&self) -> String {
        format!(
            "<input type=\"hidden\" name=\"{0}\" value=\"<?php echo htmlspecialchars($_SESSION['{0}'] ?? ''); ?>\">",
            self.field
        )
    }

    /// Returns true if `body` holds `<input type="hidden" name="<field>">`.
    fn has_token(&self, body: &str) -> bool {
        INPUT_TAG.find_iter(body).any(|m| {
            let tag = m.as_str();
            attr_value(&TYPE_ATTR, tag).is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
                && attr_value(&NAME_ATTR, tag) == Some(self.field.as_str())
        })
    }

    fn forms(&self, content: &str, map: &MarkupMap) -> Vec<(Form, bool)> {
        FORM_TAG
            .find_iter(content)
            .filter(|m| map.is_live(m.start()))
            .map(|m| {
                let body_end = FORM_BOUNDARY
                    .find_at(content, m.end())
                    .map_or(content.len(), |b| b.start());
                let form = Form {
                    open_end: m.end(),
                    has_token: self.has_token(&content[m.end()..body_end]),
                };
                (form, map.is_splice_safe(m.end()))
            })
            .collect()
    }
}

impl Rule for FormToken {
    fn id(&self) -> &str {
        "form-csrf-token"
    }

    fn description(&self) -> &str {
        "Insert a hidden CSRF token input into forms"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        let map = MarkupMap::new(&file.content);
        FORM_TAG
            .find_iter(&file.content)
            .any(|m| map.is_live(m.start()))
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        let forms = self.forms(&file.content, &MarkupMap::new(&file.content));
        !forms.is_empty() && forms.iter().all(|(form, _)| form.has_token)
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        self.locate_all(file).into_iter().next()
    }

    fn locate_all(&self, file: &SourceFile) -> Vec<Anchor> {
        let forms = self.forms(&file.content, &MarkupMap::new(&file.content));
        let missing: Vec<(Form, bool)> = forms.into_iter().filter(|(f, _)| !f.has_token).collect();
        if missing.iter().any(|(_, safe)| !safe) {
            tracing::debug!(path = %file.path.display(), "form without token inside embedded code");
            return Vec::new();
        }
        missing
            .into_iter()
            .map(|(form, _)| Anchor::insert(form.open_end, AnchorTag::AfterFormOpen))
            .collect()
    }

    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
        let indent = line_indent(&file.content, anchor.start.saturating_sub(1));
        format!("\n{indent}    {}", self.input())
    }
}
