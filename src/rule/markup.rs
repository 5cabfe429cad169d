//! Quote-aware helpers for locating and editing markup tags.
//!
//! Page text is not code: an apostrophe in `<p>Don't</p>` opens nothing.
//! [`MarkupMap`] instead records the parts of a page where a tag-level edit
//! is unsafe: comments, quoted attribute values and embedded code (PHP blocks,
//! `<script>` and `<style>` bodies).

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

use super::php_block_end;

static SCRIPT_OPEN: LazyLock<Regex> = LazyLock::new(|| tag_regex("script"));
static SCRIPT_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</script\s*>").expect("invalid regex"));

/// What a span of markup holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Span {
    Comment,
    Value,
    Code,
}

impl Span {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Span::Comment => "a markup comment",
            Span::Value => "an attribute value",
            Span::Code => "embedded code",
        }
    }
}

/// Spans of a page that markup edits must not touch.
#[derive(Debug, Clone, Default)]
pub(crate) struct MarkupMap {
    spans: Vec<(Range<usize>, Span)>,
}

impl MarkupMap {
    pub(crate) fn new(content: &str) -> Self {
        let bytes = content.as_bytes();
        let mut spans = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'<' {
                i += 1;
                continue;
            }
            let rest = &bytes[i..];
            if rest.starts_with(b"<?") {
                let end = php_block_end(content, i);
                spans.push((i..end, Span::Code));
                i = end;
            } else if rest.starts_with(b"<!--") {
                let end = content[i + 4..]
                    .find("-->")
                    .map_or(bytes.len(), |e| i + 4 + e + 3);
                spans.push((i..end, Span::Comment));
                i = end;
            } else if rest.get(1).is_some_and(u8::is_ascii_alphabetic) {
                i = scan_tag(content, i, &mut spans);
            } else {
                i += 1;
            }
        }
        Self { spans }
    }

    /// Returns the span strictly containing `offset`. The offsets at a
    /// span's edges are outside it.
    pub(crate) fn span_at(&self, offset: usize) -> Option<Span> {
        self.spans
            .iter()
            .find(|(r, _)| r.start < offset && offset < r.end)
            .map(|(_, span)| *span)
    }

    /// Returns true if a tag starting at `offset` is rendered markup rather
    /// than text inside a comment or attribute value. Tags emitted by
    /// embedded code count as live.
    pub(crate) fn is_live(&self, offset: usize) -> bool {
        !matches!(self.span_at(offset), Some(Span::Comment | Span::Value))
    }

    /// Returns true if text may be spliced at `offset`.
    pub(crate) fn is_splice_safe(&self, offset: usize) -> bool {
        self.span_at(offset).is_none()
    }
}

/// Scans one tag starting at its `<`, recording quoted values, embedded PHP
/// and raw-text bodies. Returns the offset after the tag (or its body).
fn scan_tag(content: &str, start: usize, spans: &mut Vec<(Range<usize>, Span)>) -> usize {
    let bytes = content.as_bytes();
    let name_len = bytes[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-')
        .count();
    let name = &content[start + 1..start + 1 + name_len];

    let mut i = start + 1 + name_len;
    while i < bytes.len() {
        match bytes[i] {
            b'>' => {
                i += 1;
                if name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style") {
                    let needle = format!("</{}", name.to_ascii_lowercase());
                    let end = content[i..]
                        .to_ascii_lowercase()
                        .find(&needle)
                        .map_or(bytes.len(), |p| i + p);
                    if end > i {
                        spans.push((i..end, Span::Code));
                    }
                    return end;
                }
                return i;
            }
            quote @ (b'"' | b'\'') => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote {
                    j = if bytes[j..].starts_with(b"<?") {
                        php_block_end(content, j)
                    } else {
                        j + 1
                    };
                }
                let end = (j + 1).min(bytes.len());
                spans.push((i..end, Span::Value));
                i = end;
            }
            b'<' if bytes[i..].starts_with(b"<?") => {
                let end = php_block_end(content, i);
                spans.push((i..end, Span::Code));
                i = end;
            }
            _ => i += 1,
        }
    }
    i
}

/// Returns the byte ranges of `<script>` element bodies.
pub(crate) fn script_bodies(content: &str) -> Vec<Range<usize>> {
    let mut bodies = Vec::new();
    let mut from = 0;
    while let Some(open) = SCRIPT_OPEN.find_at(content, from) {
        let start = open.end();
        let end = SCRIPT_CLOSE
            .find_at(content, start)
            .map_or(content.len(), |m| m.start());
        bodies.push(start..end);
        from = end;
    }
    bodies
}

/// Builds a regex matching an opening tag whose name matches `names`
/// (an alternation such as `input|select`). Quoted attribute values may
/// contain `>`, so embedded template output such as `<?= $x ?>` inside an
/// attribute does not end the tag early.
pub(crate) fn tag_regex(names: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)<(?:{names})\b(?:[^>"']|"[^"]*"|'[^']*')*>"#
    ))
    .expect("invalid regex")
}

/// Builds a regex capturing the value of the named attribute.
pub(crate) fn attr_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)(?:^|[\s"'])({name})\s*=\s*(?:"([^"]*)"|'([^']*)')"#
    ))
    .expect("invalid regex")
}

/// Returns the value of the first attribute matched by `attr` in `tag`.
pub(crate) fn attr_value<'t>(attr: &Regex, tag: &'t str) -> Option<&'t str> {
    attr.captures(tag)
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| m.as_str())
}

/// Returns the offset within `tag` at which a new attribute is inserted:
/// after the last attribute, before trailing whitespace and `/>` or `>`.
pub(crate) fn attr_insertion_offset(tag: &str) -> usize {
    let body = tag.strip_suffix('>').unwrap_or(tag);
    let body = body.strip_suffix('/').unwrap_or(body);
    body.trim_end().len()
}

/// Returns `tag` with ` name="value"` inserted before its close.
pub(crate) fn with_attribute(tag: &str, name: &str, value: &str) -> String {
    let at = attr_insertion_offset(tag);
    format!("{} {}=\"{}\"{}", &tag[..at], name, value, &tag[at..])
}

/// Returns true if only spaces and tabs precede `offset` on its line.
pub(crate) fn starts_line(content: &str, offset: usize) -> bool {
    let line_start = content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    content[line_start..offset]
        .bytes()
        .all(|b| b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_regex_quote_aware() {
        let re = tag_regex("img");
        let src = r#"<p><img src="<?= $u ?>" class='a>b'> tail"#;
        let m = re.find(src).unwrap();
        assert_eq!(m.as_str(), r#"<img src="<?= $u ?>" class='a>b'>"#);
        assert!(re.find("<imgur>").is_none());
    }

    #[test]
    fn test_attr_value() {
        let id = attr_regex("id");
        assert_eq!(attr_value(&id, r#"<input type="text" id="email">"#), Some("email"));
        assert_eq!(attr_value(&id, "<input id='x'/>"), Some("x"));
        assert_eq!(attr_value(&id, r#"<input data-id="nope">"#), None);
        assert_eq!(attr_value(&id, r#"<input ID = "Up">"#), Some("Up"));
    }

    #[test]
    fn test_with_attribute() {
        assert_eq!(with_attribute("<input>", "id", "x"), r#"<input id="x">"#);
        assert_eq!(
            with_attribute(r#"<input name="x" />"#, "id", "x"),
            r#"<input name="x" id="x" />"#
        );
        assert_eq!(
            with_attribute(r#"<img src="a.png">"#, "alt", "TODO"),
            r#"<img src="a.png" alt="TODO">"#
        );
    }

    #[test]
    fn test_apostrophes_in_text_are_plain_text() {
        let src = "<p>We're open</p>\n<img src=\"a.png\">";
        let map = MarkupMap::new(src);
        let img = src.find("<img").unwrap();
        assert!(map.is_live(img));
        assert!(map.is_splice_safe(img + attr_insertion_offset("<img src=\"a.png\">")));
    }

    #[test]
    fn test_markup_spans() {
        let src = "<!-- <img src=x> --><a title='it\"s >' href=\"<?= $u ?>\">x</a><script>if (a < b) {}</script>";
        let map = MarkupMap::new(src);

        assert_eq!(map.span_at(src.find("<img").unwrap()), Some(Span::Comment));
        assert!(!map.is_live(src.find("<img").unwrap()));
        assert_eq!(map.span_at(src.find("s >").unwrap()), Some(Span::Value));
        assert_eq!(map.span_at(src.find("$u").unwrap()), Some(Span::Value));
        assert_eq!(map.span_at(src.find("a < b").unwrap()), Some(Span::Code));
        assert!(map.is_splice_safe(src.find("x</a>").unwrap()));

        let quote = src.find("'it").unwrap();
        assert!(map.is_splice_safe(quote));
        assert!(!map.is_splice_safe(quote + 1));
    }

    #[test]
    fn test_php_blocks_are_code_and_live() {
        let src = "<?php echo '<img src=\"a\">'; ?>\n<img src=\"b\">";
        let map = MarkupMap::new(src);
        let echoed = src.find("<img").unwrap();
        assert_eq!(map.span_at(echoed), Some(Span::Code));
        assert!(map.is_live(echoed));
        assert!(!map.is_splice_safe(echoed));
        assert!(map.is_splice_safe(src.rfind("<img").unwrap()));
    }

    #[test]
    fn test_script_bodies() {
        let src = "<script src=\"x.js\"></script>\n<SCRIPT type=\"module\">\ntry { go(); }\n</script >\n<script>open(";
        let bodies = script_bodies(src);
        assert_eq!(bodies.len(), 3);
        assert!(bodies[0].is_empty());
        assert_eq!(&src[bodies[1].clone()], "\ntry { go(); }\n");
        assert_eq!(bodies[2].end, src.len());
    }

    #[test]
    fn test_starts_line() {
        let src = "  <label>\n<p><label>";
        assert!(starts_line(src, 2));
        assert!(!starts_line(src, src.rfind("<label").unwrap()));
        assert!(starts_line(src, 0));
    }
}
