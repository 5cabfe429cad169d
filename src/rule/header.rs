//! Header include for page files.

use regex::Regex;
use std::sync::LazyLock;

use super::{Anchor, AnchorTag, Rule, SourceFile};
use crate::lexer::skip_whitespace_and_comments;

static EXISTING_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/includes/(?:header|index-header|dashboard_header)\.php").expect("invalid regex")
});
static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!DOCTYPE\b").expect("invalid regex"));
static LIBRARY_PROLOGUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:namespace|declare|use|return|interface|trait|enum|(?:(?:abstract|final|readonly)\s+)*class)\b",
    )
    .expect("invalid regex")
});
static JSON_RESPONSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)header\s*\(\s*['"]Content-Type:\s*application/json"#)
        .expect("invalid regex")
});

/// Returns true if the file opens with PHP whose first statement makes it a
/// library: a namespace, declare, import, type definition, or a returned
/// value such as a config array.
fn is_library(content: &str) -> bool {
    let Some(rest) = content.trim_start().strip_prefix("<?php") else {
        return false;
    };
    let statement = skip_whitespace_and_comments(rest, 0);
    LIBRARY_PROLOGUE.is_match(&rest[statement..])
}

/// Prepends a header include line to page files.
///
/// API endpoints (`*_api.php` or JSON responders), library files and
/// complete documents with their own DOCTYPE are not pages and are left
/// alone.
#[derive(Debug, Clone)]
pub struct HeaderInclude {
    line: String,
}

impl Default for HeaderInclude {
    fn default() -> Self {
        Self {
            line: "<?php include_once __DIR__ . '/header.php'; ?>".to_string(),
        }
    }
}

impl HeaderInclude {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    fn has_header(&self, content: &str) -> bool {
        content.contains(&self.line) || EXISTING_HEADER.is_match(content)
    }
}

impl Rule for HeaderInclude {
    fn id(&self) -> &str {
        "header-include"
    }

    fn description(&self) -> &str {
        "Prepend the shared header include to page files"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        if file.file_name().is_some_and(|n| n.ends_with("_api.php")) {
            return false;
        }
        if is_library(&file.content) || JSON_RESPONSE.is_match(&file.content) {
            return false;
        }
        self.has_header(&file.content) || !DOCTYPE.is_match(&file.content)
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        self.has_header(&file.content)
    }

    fn locate(&self, _file: &SourceFile) -> Option<Anchor> {
        Some(Anchor::insert(0, AnchorTag::FileStart))
    }

    fn splice(&self, _file: &SourceFile, _anchor: &Anchor) -> String {
        format!("{}\n", self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepends_to_page() {
        let rule = HeaderInclude::new();
        let file = SourceFile::new("dashboard/index.php", "<main>Hi</main>\n");
        assert!(rule.detect(&file));
        let anchor = rule.locate(&file).unwrap();
        let out = rule.transform(&file, &anchor);
        assert_eq!(
            out,
            "<?php include_once __DIR__ . '/header.php'; ?>\n<main>Hi</main>\n"
        );
        assert!(rule.already_applied(&SourceFile::new("dashboard/index.php", out)));
    }

    #[test]
    fn test_skips_non_pages() {
        let rule = HeaderInclude::new();
        assert!(!rule.detect(&SourceFile::new("users_api.php", "<?php echo 1;")));
        assert!(!rule.detect(&SourceFile::new("Model.php", "<?php\nclass Model {}\n")));
        assert!(!rule.detect(&SourceFile::new(
            "full.php",
            "<!DOCTYPE html>\n<html></html>"
        )));
    }

    #[test]
    fn test_skips_library_files() {
        let rule = HeaderInclude::new();
        for content in [
            "<?php\nnamespace App\\Auth;\n\nfunction login() {}\n",
            "<?php\ndeclare(strict_types=1);\n\nfunction f() {}\n",
            "<?php\n/** helpers */\nuse App\\Db;\n",
            "<?php\nreturn ['db' => 'main'];\n",
            "<?php\nfinal readonly class Token {}\n",
            "<?php\nenum Role { case Admin; }\n",
        ] {
            assert!(!rule.detect(&SourceFile::new("lib.php", content)), "{content}");
        }
    }

    #[test]
    fn test_skips_json_responders() {
        let rule = HeaderInclude::new();
        let file = SourceFile::new(
            "status.php",
            "<?php\nheader('Content-Type: application/json');\necho json_encode([]);\n",
        );
        assert!(!rule.detect(&file));
    }

    #[test]
    fn test_page_with_leading_logic_is_a_page() {
        let rule = HeaderInclude::new();
        let file = SourceFile::new(
            "dashboard/home.php",
            "<?php\nsession_start();\n?>\n<main></main>\n",
        );
        assert!(rule.detect(&file));
        assert!(!rule.already_applied(&file));
    }

    #[test]
    fn test_existing_header_counts_as_applied() {
        let rule = HeaderInclude::new();
        let file = SourceFile::new(
            "admin/users.php",
            "<?php include __DIR__ . '/../includes/dashboard_header.php'; ?>\n<!DOCTYPE html>",
        );
        assert!(rule.detect(&file));
        assert!(rule.already_applied(&file));
    }
}
