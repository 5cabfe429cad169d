//! Label association: repairs `<label for>` references to missing ids.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use super::markup::{MarkupMap, attr_regex, attr_value, starts_line, tag_regex, with_attribute};
use super::{Anchor, AnchorTag, Rule, SourceFile};
use crate::lexer::line_indent;

/// Comment placed before every label or control this rule edits.
pub const LABEL_MARKER: &str = "<!-- Fixed label-for/id mismatch for accessibility -->";

static LABEL_TAG: LazyLock<Regex> = LazyLock::new(|| tag_regex("label"));
static CONTROL_TAG: LazyLock<Regex> = LazyLock::new(|| tag_regex("input|select|textarea"));
static FOR_ATTR: LazyLock<Regex> = LazyLock::new(|| attr_regex("for"));
static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| attr_regex("id"));

#[derive(Debug, Clone)]
struct Tag<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

/// Makes every `<label for="x">` point at a real form control.
///
/// For a label whose target id appears nowhere in the file, the nearest
/// following control is chosen; only when no control follows is the
/// nearest control within the search window before the label used. If the
/// chosen control already has an id the label is rewritten to it,
/// otherwise the control gains the label's id.
#[derive(Debug, Clone)]
pub struct LabelAssociation {
    search_window: usize,
}

impl Default for LabelAssociation {
    fn default() -> Self {
        Self { search_window: 500 }
    }
}

impl LabelAssociation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(search_window: usize) -> Self {
        Self { search_window }
    }

    fn existing_ids(content: &str, map: &MarkupMap) -> HashSet<String> {
        let mut ids = HashSet::new();
        for tag in tags(&ANY_TAG, content, map) {
            if let Some(id) = attr_value(&ID_ATTR, tag.text) {
                ids.insert(id.to_string());
            }
        }
        ids
    }

    /// Labels whose `for` value matches no id in the file.
    fn dangling<'a>(
        content: &'a str,
        ids: &HashSet<String>,
        map: &MarkupMap,
    ) -> Vec<(Tag<'a>, &'a str)> {
        tags(&LABEL_TAG, content, map)
            .into_iter()
            .filter_map(|tag| {
                let target = attr_value(&FOR_ATTR, tag.text)?;
                (!target.is_empty() && !ids.contains(target)).then_some((tag, target))
            })
            .collect()
    }

    fn marker_prefix(content: &str, start: usize) -> String {
        if starts_line(content, start) {
            format!("{}\n{}", LABEL_MARKER, line_indent(content, start))
        } else {
            LABEL_MARKER.to_string()
        }
    }
}

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| tag_regex(r"[a-z][a-z0-9-]*"));

/// Tags that render: those inside markup comments or attribute values are
/// skipped.
fn tags<'a>(re: &Regex, content: &'a str, map: &MarkupMap) -> Vec<Tag<'a>> {
    re.find_iter(content)
        .filter(|m| map.is_live(m.start()))
        .map(|m| Tag {
            start: m.start(),
            end: m.end(),
            text: m.as_str(),
        })
        .collect()
}

impl Rule for LabelAssociation {
    fn id(&self) -> &str {
        "label-for"
    }

    fn description(&self) -> &str {
        "Point label for-attributes at an existing form control id"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php", "html", "htm"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        file.content.contains(LABEL_MARKER) || {
            let map = MarkupMap::new(&file.content);
            let ids = Self::existing_ids(&file.content, &map);
            !Self::dangling(&file.content, &ids, &map).is_empty()
        }
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        let map = MarkupMap::new(&file.content);
        let ids = Self::existing_ids(&file.content, &map);
        file.content.contains(LABEL_MARKER) && Self::dangling(&file.content, &ids, &map).is_empty()
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        self.locate_all(file).into_iter().next()
    }

    /// Repairs every dangling label or none: when one label has no control
    /// in reach, the file gets no anchors and is reviewed as a whole.
    fn locate_all(&self, file: &SourceFile) -> Vec<Anchor> {
        let content = file.content.as_str();
        let map = MarkupMap::new(content);
        let mut ids = Self::existing_ids(content, &map);
        let controls = tags(&CONTROL_TAG, content, &map);
        // ids promised to controls by earlier labels in this pass
        let mut assigned: HashMap<usize, String> = HashMap::new();
        let mut anchors = Vec::new();

        for (label, target) in Self::dangling(content, &ids, &map) {
            if ids.contains(target) {
                continue;
            }

            let following = controls.iter().find(|c| c.start >= label.end);
            let window_start = label.start.saturating_sub(self.search_window);
            let preceding = || {
                controls
                    .iter()
                    .rev()
                    .find(|c| c.end <= label.start && c.start >= window_start)
            };
            let (control, is_next) = match following {
                Some(c) => (c, true),
                None => match preceding() {
                    Some(c) => (c, false),
                    None => {
                        tracing::debug!(
                            path = %file.path.display(),
                            label_for = target,
                            "no form control near label"
                        );
                        return Vec::new();
                    }
                },
            };

            let current_id = assigned
                .get(&control.start)
                .map(String::as_str)
                .or_else(|| attr_value(&ID_ATTR, control.text));

            match current_id {
                Some(id) => anchors.push(Anchor::replace(
                    label.start..label.end,
                    AnchorTag::LabelReference { id: id.to_string() },
                )),
                None => {
                    let tag = if is_next {
                        AnchorTag::NextSiblingControl {
                            id: target.to_string(),
                        }
                    } else {
                        AnchorTag::PreviousSiblingControl {
                            id: target.to_string(),
                        }
                    };
                    assigned.insert(control.start, target.to_string());
                    ids.insert(target.to_string());
                    anchors.push(Anchor::replace(control.start..control.end, tag));
                }
            }
        }
        anchors
    }

    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
        let content = file.content.as_str();
        let original = &content[anchor.start..anchor.end];
        let prefix = Self::marker_prefix(content, anchor.start);
        match &anchor.tag {
            AnchorTag::LabelReference { id } => {
                let rewritten = FOR_ATTR.replace(original, |caps: &regex::Captures| {
                    let whole = &caps[0];
                    let old = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                    let quote = if caps.get(2).is_some() { '"' } else { '\'' };
                    let from = format!("{quote}{old}{quote}");
                    let to = format!("{quote}{id}{quote}");
                    whole.replacen(&from, &to, 1)
                });
                format!("{prefix}{rewritten}")
            }
            AnchorTag::NextSiblingControl { id } | AnchorTag::PreviousSiblingControl { id } => {
                format!("{prefix}{}", with_attribute(original, "id", id))
            }
            _ => original.to_string(),
        }
    }
}
