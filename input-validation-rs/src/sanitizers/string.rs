//! String normalization utilities
//!
//! [`normalize_string`] is the canonical text pipeline applied to every
//! free-text field before validation and scanning. The individual steps are
//! exposed for callers that only need one of them.

use super::{chain_sanitizers, strip_html_tags, SanitizeResult};
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Pipeline re-application bound; one pass almost always reaches the fixpoint
const MAX_NORMALIZATION_PASSES: usize = 4;

lazy_static! {
    // C0 minus tab/newline/carriage return, DEL, C1, and invisible
    // direction/format characters (ZWJ and ZWNJ are kept for emoji and scripts)
    static ref CONTROL_CHARS_REGEX: Regex = Regex::new(
        r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x9F\x{200B}\x{200E}\x{200F}\x{202A}-\x{202E}\x{2066}-\x{2069}\x{FEFF}]"
    )
    .unwrap();
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// Which steps [`normalize_string`] applies. Steps always run in the order
/// of the fields below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationOptions {
    pub strip_html: bool,
    pub unicode_normalize: bool,
    pub strip_control_chars: bool,
    pub collapse_whitespace: bool,
    pub trim: bool,
    pub case_fold: bool,
    /// Maximum length in characters
    pub max_length: Option<usize>,
}

impl NormalizationOptions {
    /// Every step disabled; normalization becomes the identity.
    pub fn none() -> Self {
        Self {
            strip_html: false,
            unicode_normalize: false,
            strip_control_chars: false,
            collapse_whitespace: false,
            trim: false,
            case_fold: false,
            max_length: None,
        }
    }

    /// Every step enabled with the given length cap.
    pub fn strict(max_length: usize) -> Self {
        Self {
            strip_html: true,
            unicode_normalize: true,
            strip_control_chars: true,
            collapse_whitespace: true,
            trim: true,
            case_fold: true,
            max_length: Some(max_length),
        }
    }
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        Self {
            strip_html: false,
            unicode_normalize: true,
            strip_control_chars: true,
            collapse_whitespace: false,
            trim: true,
            case_fold: false,
            max_length: Some(crate::DEFAULT_MAX_STRING_LENGTH),
        }
    }
}

type StringSanitizer = Box<dyn Fn(String) -> SanitizeResult<String>>;

fn pipeline(options: &NormalizationOptions) -> Vec<StringSanitizer> {
    let mut steps: Vec<StringSanitizer> = Vec::new();

    if options.strip_html {
        steps.push(Box::new(|s| strip_html_tags(&s)));
    }
    if options.unicode_normalize {
        steps.push(Box::new(|s| normalize_unicode(&s)));
    }
    if options.strip_control_chars {
        steps.push(Box::new(|s| remove_control_chars(&s)));
    }
    if options.collapse_whitespace {
        steps.push(Box::new(|s| collapse_whitespace(&s)));
    }
    if options.trim {
        steps.push(Box::new(|s| trim_whitespace(&s)));
    }
    if options.case_fold {
        steps.push(Box::new(|s| to_lowercase(&s)));
    }
    if let Some(max_length) = options.max_length {
        let trim = options.trim;
        steps.push(Box::new(move |s| {
            let limited = limit_length(&s, max_length);
            if trim && limited.was_modified {
                let end_trimmed = limited.sanitized.trim_end().to_string();
                SanitizeResult::modified(end_trimmed, limited.details)
            } else {
                limited
            }
        }));
    }

    steps
}

/// Normalize a string: strip tags, NFC, remove control characters, collapse
/// whitespace, trim, case fold, truncate.
///
/// The pipeline is re-applied until it reaches a fixpoint, so the result is
/// stable under repeated normalization with the same options.
pub fn normalize_string(input: &str, options: &NormalizationOptions) -> SanitizeResult<String> {
    let mut result = SanitizeResult::unmodified(input.to_string());
    let mut details: Vec<String> = Vec::new();

    for _ in 0..MAX_NORMALIZATION_PASSES {
        let pass = chain_sanitizers(result.sanitized, pipeline(options));
        result.sanitized = pass.sanitized;
        if !pass.was_modified {
            break;
        }
        result.was_modified = true;
        if let Some(detail) = pass.details {
            if !details.contains(&detail) {
                details.push(detail);
            }
        }
    }

    if !details.is_empty() {
        result.details = Some(details.join("; "));
    }
    result
}

/// Remove control characters from a string
pub fn remove_control_chars(input: &str) -> SanitizeResult<String> {
    let sanitized = CONTROL_CHARS_REGEX.replace_all(input, "").to_string();

    if sanitized == input {
        SanitizeResult::unmodified(input.to_string())
    } else {
        SanitizeResult::modified(sanitized, Some("Removed control characters".to_string()))
    }
}

/// Limit string length to a maximum number of characters
pub fn limit_length(input: &str, max_length: usize) -> SanitizeResult<String> {
    let char_count = input.chars().count();
    if char_count <= max_length {
        SanitizeResult::unmodified(input.to_string())
    } else {
        let truncated = input.chars().take(max_length).collect::<String>();
        SanitizeResult::modified(
            truncated,
            Some(format!(
                "Truncated string from {} to {} characters",
                char_count, max_length
            )),
        )
    }
}

/// Normalize Unicode text (NFC form)
pub fn normalize_unicode(input: &str) -> SanitizeResult<String> {
    let normalized = input.nfc().collect::<String>();

    if normalized == input {
        SanitizeResult::unmodified(input.to_string())
    } else {
        SanitizeResult::modified(
            normalized,
            Some("Normalized Unicode characters".to_string()),
        )
    }
}

/// Trim whitespace from beginning and end
pub fn trim_whitespace(input: &str) -> SanitizeResult<String> {
    let trimmed = input.trim();

    if trimmed == input {
        SanitizeResult::unmodified(input.to_string())
    } else {
        SanitizeResult::modified(trimmed.to_string(), Some("Trimmed whitespace".to_string()))
    }
}

/// Collapse multiple whitespace characters into a single space
pub fn collapse_whitespace(input: &str) -> SanitizeResult<String> {
    let result = WHITESPACE_REGEX.replace_all(input, " ");

    if result == input {
        SanitizeResult::unmodified(input.to_string())
    } else {
        SanitizeResult::modified(result.into_owned(), Some("Collapsed whitespace".to_string()))
    }
}

/// Convert string to lowercase
pub fn to_lowercase(input: &str) -> SanitizeResult<String> {
    let result = input.to_lowercase();

    if result == input {
        SanitizeResult::unmodified(input.to_string())
    } else {
        SanitizeResult::modified(result, Some("Converted to lowercase".to_string()))
    }
}
