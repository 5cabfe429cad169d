//! Image alt placeholders for `<img>` tags without an `alt` attribute.

use regex::Regex;
use std::sync::LazyLock;

use super::markup::{MarkupMap, attr_insertion_offset, attr_regex, attr_value, tag_regex};
use super::{Anchor, AnchorTag, Rule, SourceFile};

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| tag_regex("img"));
static ALT_ATTR: LazyLock<Regex> = LazyLock::new(|| attr_regex("alt"));

#[derive(Debug, Clone)]
pub struct ImageAlt {
    placeholder: String,
}

impl Default for ImageAlt {
    fn default() -> Self {
        Self {
            placeholder: "TODO: add alt text".to_string(),
        }
    }
}

impl ImageAlt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholder(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
        }
    }

    /// Rendered `<img>` tags without `alt`. Images echoed by embedded code
    /// count, so a file with one is left for review rather than half fixed.
    fn missing_alt(content: &str) -> Vec<regex::Match<'_>> {
        let map = MarkupMap::new(content);
        IMG_TAG
            .find_iter(content)
            .filter(|m| map.is_live(m.start()) && attr_value(&ALT_ATTR, m.as_str()).is_none())
            .collect()
    }
}

impl Rule for ImageAlt {
    fn id(&self) -> &str {
        "img-alt"
    }

    fn description(&self) -> &str {
        "Add a placeholder alt attribute to img tags that lack one"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php", "html", "htm"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        !Self::missing_alt(&file.content).is_empty() || file.content.contains(&self.placeholder)
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        file.content.contains(&self.placeholder) && Self::missing_alt(&file.content).is_empty()
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        self.locate_all(file).into_iter().next()
    }

    fn locate_all(&self, file: &SourceFile) -> Vec<Anchor> {
        Self::missing_alt(&file.content)
            .into_iter()
            .map(|m| Anchor::insert(m.start() + attr_insertion_offset(m.as_str()), AnchorTag::BeforeTagClose))
            .collect()
    }

    fn splice(&self, _file: &SourceFile, _anchor: &Anchor) -> String {
        format!(" alt=\"{}\"", self.placeholder)
    }
}
