//! # Input Validation Library
//!
//! Normalization, sanitization and schema validation for every externally
//! supplied value entering the knowledge-graph input-security pipeline.
//!
//! ## Features
//!
//! - Canonical text normalization ([`sanitizers::normalize_string`])
//! - Allow-list HTML sanitization over a parsed node tree
//! - URL validation that blocks script schemes and internal hosts
//! - Recursive JSON schema validation with a cache-backed registry
//! - Size- and time-bounded regular expression matching

mod errors;
pub mod registry;
pub mod sanitizers;
pub mod schema;
pub mod validators;

pub use errors::{InputError, InputResult};
pub use registry::{builtin_schemas, SchemaLookup, SchemaRegistry};
pub use sanitizers::{
    normalize_string, sanitize_html, HtmlSanitizeOptions, NormalizationOptions,
    ParseFailurePolicy, SanitizeResult,
};
pub use schema::{
    JsonSchema, PropertySchema, SchemaType, ValidationConstraints, ValidationError,
    ValidationErrorCode, ValidationResult, ValidationSeverity,
};
pub use validators::{validate_url, Deadline, UrlPolicy, ValidatedUrl};

/// Re-export commonly used items for convenience
pub mod prelude {
    pub use crate::errors::{InputError, InputResult};
    pub use crate::registry::{SchemaLookup, SchemaRegistry};
    pub use crate::sanitizers;
    pub use crate::schema::{JsonSchema, PropertySchema, ValidationResult};
    pub use crate::validators;
}

/// Version of the validation library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Limit for max request payload size (10 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum allowed length for strings
pub const DEFAULT_MAX_STRING_LENGTH: usize = 32_768;

/// Default maximum depth for nested objects
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Reject payloads above `max` bytes before any parsing happens
pub fn check_payload_size(payload: &str, max: usize) -> InputResult<()> {
    if payload.len() > max {
        Err(InputError::PayloadTooLarge {
            size: payload.len(),
            max,
        })
    } else {
        Ok(())
    }
}

impl From<&shared_types_rs::config::NormalizationSettings> for NormalizationOptions {
    fn from(settings: &shared_types_rs::config::NormalizationSettings) -> Self {
        Self {
            strip_html: settings.strip_html,
            unicode_normalize: settings.unicode_normalize,
            strip_control_chars: settings.strip_control_chars,
            collapse_whitespace: settings.collapse_whitespace,
            trim: settings.trim,
            case_fold: settings.case_fold,
            max_length: settings.max_length,
        }
    }
}

impl From<&shared_types_rs::config::HtmlSettings> for HtmlSanitizeOptions {
    fn from(settings: &shared_types_rs::config::HtmlSettings) -> Self {
        let mut options = HtmlSanitizeOptions::default();
        if !settings.allowed_tags.is_empty() {
            options = options.with_tags(&settings.allowed_tags);
        }
        if !settings.allowed_attributes.is_empty() {
            options = options.with_attributes(&settings.allowed_attributes);
        }
        options.allow_data_attributes = settings.allow_data_attributes;
        if let Some(policy) = &settings.on_parse_failure {
            options.on_parse_failure = ParseFailurePolicy::from(policy.as_str());
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types_rs::config::{HtmlSettings, NormalizationSettings};

    #[test]
    fn test_payload_size_limit() {
        assert!(check_payload_size("small", DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
        assert_eq!(
            check_payload_size("0123456789", 4),
            Err(InputError::PayloadTooLarge { size: 10, max: 4 })
        );
    }

    #[test]
    fn test_options_from_settings() {
        let options = NormalizationOptions::from(&NormalizationSettings::default());
        assert!(options.trim);
        assert!(!options.case_fold);

        let html = HtmlSanitizeOptions::from(&HtmlSettings {
            allowed_tags: vec!["P".to_string()],
            on_parse_failure: Some("return_original".to_string()),
            ..HtmlSettings::default()
        });
        assert!(html.allowed_tags.contains("p"));
        assert_eq!(html.allowed_tags.len(), 1);
        assert_eq!(html.on_parse_failure, ParseFailurePolicy::ReturnOriginal);
    }
}
