//! Mapping of stage failures onto boundary [`Error`]s.
//!
//! Each stage reports failures in its own error type. Before anything leaves
//! the pipeline it is tagged with the [`ErrorKind`] that decides how the
//! error sanitizer presents it.

use std::error::Error as StdError;

use content_scanner_rs::{ScanError, ScanResult};
use error_handling_rs::{Error, ErrorKind};
use input_validation_rs::{InputError, ValidationResult};
use query_sanitizer_rs::{ComplexityLimits, QueryError, QueryValidationResult};
use rate_limiter_rs::{RateLimitError, RateLimitKey, RateLimitResult};

/// Tags a stage error with the kind it presents as at the boundary.
pub trait ToBoundaryError {
    fn to_boundary_error(&self) -> Error;
}

fn tagged<E>(kind: ErrorKind, err: &E) -> Error
where
    E: StdError + Clone + Send + Sync + 'static,
{
    Error::new(kind, err.to_string()).cause(err.clone())
}

impl ToBoundaryError for InputError {
    fn to_boundary_error(&self) -> Error {
        match self {
            InputError::Timeout { .. } => tagged(ErrorKind::Timeout, self),
            InputError::PayloadTooLarge { max, .. } => {
                tagged(ErrorKind::Validation, self).detail("limit", max)
            }
            InputError::InvalidPattern { .. } => tagged(ErrorKind::Configuration, self),
            err if err.is_security_rejection() => tagged(ErrorKind::ThreatDetected, self),
            _ => tagged(ErrorKind::Validation, self),
        }
    }
}

impl ToBoundaryError for ScanError {
    fn to_boundary_error(&self) -> Error {
        match self {
            ScanError::ContentTooLarge { max, .. } => {
                tagged(ErrorKind::Validation, self).detail("limit", max)
            }
            ScanError::Timeout { .. } => tagged(ErrorKind::Timeout, self),
            ScanError::InvalidPattern(_) => tagged(ErrorKind::Configuration, self),
        }
    }
}

impl ToBoundaryError for QueryError {
    fn to_boundary_error(&self) -> Error {
        match self {
            QueryError::MissingParameter(name)
            | QueryError::UnusedParameter(name)
            | QueryError::InvalidParameterName(name) => {
                tagged(ErrorKind::Validation, self).detail("field", name)
            }
            QueryError::ForbiddenConstruct(_) => tagged(ErrorKind::ThreatDetected, self),
            QueryError::Execution(_) => tagged(ErrorKind::External, self),
        }
    }
}

impl ToBoundaryError for RateLimitError {
    fn to_boundary_error(&self) -> Error {
        let kind = match self {
            RateLimitError::InvalidPolicy(_) => ErrorKind::Configuration,
            RateLimitError::Store(_) => ErrorKind::Unavailable,
            RateLimitError::StoreTimeout(_) => ErrorKind::Timeout,
            RateLimitError::CorruptState { .. } => ErrorKind::Storage,
        };
        tagged(kind, self)
    }
}

/// A refused quota check, with the metadata a client needs to back off
pub fn rate_limited(key: &RateLimitKey, result: &RateLimitResult) -> Error {
    Error::new(
        ErrorKind::RateLimited,
        format!(
            "Rate limit exceeded for {} ({} of {})",
            key, result.current_count, result.limit
        ),
    )
    .detail("limit", result.limit)
    .detail("remaining", result.remaining)
    .detail("resetAt", result.window_reset_at.to_rfc3339())
    .detail("retryAfterSeconds", result.retry_after_secs().unwrap_or(1))
    .detail("degraded", result.degraded)
}

pub fn unknown_schema(schema_id: &str) -> Error {
    Error::validation(format!("Unknown schema '{}'", schema_id)).detail("schemaId", schema_id)
}

/// A payload that failed its schema. The first failing path is exposed as
/// `field`; the full list stays internal.
pub fn schema_violation(result: &ValidationResult) -> Error {
    let summary: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
    let mut error = Error::new(
        ErrorKind::SchemaViolation,
        format!(
            "Payload does not match schema '{}': {}",
            result.schema_id,
            summary.join("; ")
        ),
    )
    .detail("schemaId", &result.schema_id)
    .detail("errors", &result.errors);

    if let Some(first) = result.errors.iter().find(|e| !e.path.is_empty()) {
        error = error.detail("field", &first.path);
    }
    error
}

pub fn threat_detected(result: &ScanResult) -> Error {
    let mut types: Vec<&str> = result.threats.iter().map(|t| t.threat_type.as_str()).collect();
    types.sort_unstable();
    types.dedup();
    Error::new(
        ErrorKind::ThreatDetected,
        format!(
            "Content blocked at threat level {}: {}",
            result.threat_level,
            types.join(", ")
        ),
    )
    .detail("threatLevel", result.threat_level)
    .detail("threats", &result.threats)
}

/// `None` when the query is well formed and within `limits`
pub fn query_rejected(result: &QueryValidationResult, limits: &ComplexityLimits) -> Option<Error> {
    if !result.is_valid {
        let summary: Vec<String> = result
            .errors
            .iter()
            .map(|e| format!("{} at {}", e.message, e.position))
            .collect();
        return Some(
            Error::new(
                ErrorKind::QuerySyntax,
                format!("Malformed query: {}", summary.join("; ")),
            )
            .detail("errors", &result.errors),
        );
    }

    if result.complexity.exceeds_limits {
        let complexity = &result.complexity;
        return Some(
            Error::new(
                ErrorKind::QueryComplexity,
                format!(
                    "Query complexity over limits: depth {}/{}, joins {}/{}, cost {}/{}",
                    complexity.nesting_depth,
                    limits.max_nesting_depth,
                    complexity.join_count,
                    limits.max_joins,
                    complexity.estimated_cost,
                    limits.max_cost
                ),
            )
            .detail("limit", limits.max_cost)
            .detail("complexity", complexity),
        );
    }

    None
}
