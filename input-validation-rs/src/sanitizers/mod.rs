//! Input sanitization utilities
//!
//! Text normalization and HTML sanitization. Every sanitizer reports whether
//! it changed its input so callers can record what was altered.

pub mod html;
pub mod string;

pub use html::{
    encode_html_entities, sanitize_html, strip_html_tags, HtmlSanitizeOptions,
    ParseFailurePolicy, DEFAULT_MAX_HTML_DEPTH,
};
pub use string::{
    collapse_whitespace, limit_length, normalize_string, normalize_unicode,
    remove_control_chars, to_lowercase, trim_whitespace, NormalizationOptions,
};

/// Sanitization result containing the sanitized content and information
/// about whether changes were made during sanitization
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeResult<T> {
    /// Sanitized content
    pub sanitized: T,
    /// Whether any changes were made during sanitization
    pub was_modified: bool,
    /// Optional details about what was modified
    pub details: Option<String>,
}

impl<T> SanitizeResult<T> {
    /// Create a new sanitization result
    pub fn new(sanitized: T, was_modified: bool, details: Option<String>) -> Self {
        Self {
            sanitized,
            was_modified,
            details,
        }
    }

    /// Create a result with unmodified content
    pub fn unmodified(content: T) -> Self {
        Self {
            sanitized: content,
            was_modified: false,
            details: None,
        }
    }

    /// Create a result with modified content
    pub fn modified(content: T, details: Option<String>) -> Self {
        Self {
            sanitized: content,
            was_modified: true,
            details,
        }
    }

    /// Map the sanitized content
    pub fn map<U, F>(self, f: F) -> SanitizeResult<U>
    where
        F: FnOnce(T) -> U,
    {
        SanitizeResult {
            sanitized: f(self.sanitized),
            was_modified: self.was_modified,
            details: self.details,
        }
    }
}

/// Apply `sanitizers` in order, each to the previous output. Details of the
/// steps that changed something are joined with `; `.
pub fn chain_sanitizers<T, F>(input: T, sanitizers: Vec<F>) -> SanitizeResult<T>
where
    F: FnOnce(T) -> SanitizeResult<T>,
{
    let mut current = input;
    let mut was_modified = false;
    let mut steps: Vec<String> = Vec::new();

    for sanitizer in sanitizers {
        let step = sanitizer(current);
        current = step.sanitized;
        if step.was_modified {
            was_modified = true;
            steps.extend(step.details);
        }
    }

    let details = (!steps.is_empty()).then(|| steps.join("; "));
    SanitizeResult::new(current, was_modified, details)
}
