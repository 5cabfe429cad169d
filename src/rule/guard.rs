//! Guard insertion: adds a CSRF check to request-handling PHP endpoints.

use regex::Regex;
use std::sync::LazyLock;

use super::{Anchor, Rule, SourceFile, lead_separator, php_open_anchor};
use crate::config::GuardSettings;

static REQUEST_HANDLING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\$_POST\b|\$_SERVER\s*\[\s*['"]REQUEST_METHOD['"]"#).expect("invalid regex")
});

/// Inserts `require_once '<include>';` plus the guard call right after the
/// opening `<?php` tag of files that read POST data or branch on the
/// request method.
#[derive(Debug, Clone, Default)]
pub struct CsrfGuard {
    settings: GuardSettings,
}

impl CsrfGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: GuardSettings) -> Self {
        Self { settings }
    }

    /// The function-call prefix of the guard, e.g. `csrf_check(`.
    fn call_prefix(&self) -> &str {
        let call = self.settings.call.as_str();
        match call.find('(') {
            Some(paren) => &call[..=paren],
            None => call,
        }
    }

    fn include_name(&self) -> &str {
        self.settings
            .include_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.settings.include_path)
    }

    /// Only mentions in PHP code count; page text and strings do not.
    fn handles_requests(file: &SourceFile) -> bool {
        let mut code = file.code_map();
        REQUEST_HANDLING
            .find_iter(&file.content)
            .any(|m| code.is_code(m.start()))
    }
}

impl Rule for CsrfGuard {
    fn id(&self) -> &str {
        "csrf-guard"
    }

    fn description(&self) -> &str {
        "Insert a CSRF guard after the opening tag of request-handling PHP files"
    }

    fn extensions(&self) -> &[&'static str] {
        &["php"]
    }

    fn detect(&self, file: &SourceFile) -> bool {
        Self::handles_requests(file) || self.already_applied(file)
    }

    fn already_applied(&self, file: &SourceFile) -> bool {
        file.content.contains(self.call_prefix()) || file.content.contains(self.include_name())
    }

    fn locate(&self, file: &SourceFile) -> Option<Anchor> {
        php_open_anchor(&file.content)
    }

    fn splice(&self, file: &SourceFile, anchor: &Anchor) -> String {
        format!(
            "{}require_once '{}';\n{}\n\n",
            lead_separator(&file.content, anchor.start),
            self.settings.include_path,
            self.settings.call
        )
    }
}
