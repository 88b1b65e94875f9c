//! Validator functions and utilities
//!
//! URL validation and the time/size-bounded pattern matching used by every
//! stage that runs regular expressions over untrusted input.

pub mod redos;
pub mod url;

pub use redos::{
    cached_pattern, compile_bounded, find_all_bounded, is_match_bounded, safe_pattern_match,
    safe_pattern_match_with_timeout, Deadline, DEFAULT_REGEX_TIMEOUT_MS,
};
pub use url::{is_internal_host, is_safe_url, validate_url, UrlPolicy, ValidatedUrl, FORBIDDEN_SCHEMES};
