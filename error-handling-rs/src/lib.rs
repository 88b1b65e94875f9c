//! # Error Handling
//!
//! Boundary error handling for the input-security pipeline: a tagged error
//! type, the mapping from error kinds to a small set of safe external codes,
//! correlation ids linking a response to its audit record, and structured
//! logging setup.
//!
//! ## Features
//!
//! - [`Error`] with an explicit [`ErrorKind`] set at the failure site
//! - Flat kind -> [`SafeErrorCode`] table with a catch-all default
//! - [`ErrorSanitizer`] producing [`ErrorResponse`]s that never carry
//!   internal detail outside development deployments
//! - `tracing-subscriber` initialisation from [`LoggingSettings`]
//!
//! [`LoggingSettings`]: shared_types_rs::config::LoggingSettings

pub mod logging;
pub mod mapping;
pub mod sanitization;
pub mod types;

// Re-export commonly used types
pub use logging::{generate_correlation_id, init_logging, log_structured_error};
pub use mapping::{mapping_for, ErrorMapping, SafeErrorCode, DEFAULT_MAPPING};
pub use sanitization::{sanitize_error, sanitize_message, DebugInfo, ErrorResponse, ErrorSanitizer};
pub use types::{Error, ErrorKind, Result, Severity};

/// Installs logging from a loaded configuration and returns the sanitizer
/// for that deployment
pub fn init(config: &shared_types_rs::PipelineConfig) -> Result<ErrorSanitizer> {
    init_logging(&config.logging)?;
    Ok(ErrorSanitizer::from_config(config))
}
