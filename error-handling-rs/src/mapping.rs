// error-handling-rs/src/mapping.rs
// Kind -> safe external code table

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::types::{ErrorKind, Severity};

/// The closed set of codes a caller outside the system can see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafeErrorCode {
    ValidationError,
    RateLimited,
    AuthenticationRequired,
    AccessDenied,
    NotFound,
    Conflict,
    RequestTimeout,
    ServiceUnavailable,
    SecurityViolation,
    InternalError,
}

impl SafeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafeErrorCode::ValidationError => "VALIDATION_ERROR",
            SafeErrorCode::RateLimited => "RATE_LIMITED",
            SafeErrorCode::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            SafeErrorCode::AccessDenied => "ACCESS_DENIED",
            SafeErrorCode::NotFound => "NOT_FOUND",
            SafeErrorCode::Conflict => "CONFLICT",
            SafeErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            SafeErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            SafeErrorCode::SecurityViolation => "SECURITY_VIOLATION",
            SafeErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for SafeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one kind is presented and logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorMapping {
    pub code: SafeErrorCode,
    pub message: &'static str,
    pub status: u16,
    pub log_level: Severity,
    /// Whether allow-listed details may be attached to the response
    pub include_safe_details: bool,
}

const fn mapping(
    code: SafeErrorCode,
    message: &'static str,
    status: u16,
    log_level: Severity,
    include_safe_details: bool,
) -> ErrorMapping {
    ErrorMapping {
        code,
        message,
        status,
        log_level,
        include_safe_details,
    }
}

/// Used for every kind without an entry, including the wrapper kinds whose
/// cause chain holds nothing more specific
pub const DEFAULT_MAPPING: ErrorMapping = mapping(
    SafeErrorCode::InternalError,
    "An unexpected error occurred. Please try again later.",
    500,
    Severity::Major,
    false,
);

static MAPPINGS: Lazy<HashMap<ErrorKind, ErrorMapping>> = Lazy::new(|| {
    use ErrorKind::*;
    use SafeErrorCode as C;

    HashMap::from([
        (Validation, mapping(C::ValidationError, "The request contains invalid data.", 400, Severity::Minor, true)),
        (SchemaViolation, mapping(C::ValidationError, "The request does not match the expected format.", 400, Severity::Minor, true)),
        (QuerySyntax, mapping(C::ValidationError, "The query could not be processed.", 400, Severity::Minor, false)),
        (QueryComplexity, mapping(C::ValidationError, "The query is too complex.", 400, Severity::Minor, true)),
        (ThreatDetected, mapping(C::SecurityViolation, "The request was rejected by a security policy.", 400, Severity::Critical, false)),
        (RateLimited, mapping(C::RateLimited, "Too many requests. Please try again later.", 429, Severity::Info, true)),
        (Authentication, mapping(C::AuthenticationRequired, "Authentication is required.", 401, Severity::Minor, false)),
        (Authorization, mapping(C::AccessDenied, "You do not have permission to perform this action.", 403, Severity::Minor, false)),
        (NotFound, mapping(C::NotFound, "The requested resource was not found.", 404, Severity::Info, true)),
        (Conflict, mapping(C::Conflict, "The request conflicts with the current state.", 409, Severity::Minor, false)),
        (Timeout, mapping(C::RequestTimeout, "The operation timed out. Please try again later.", 408, Severity::Major, false)),
        (Unavailable, mapping(C::ServiceUnavailable, "The service is temporarily unavailable.", 503, Severity::Major, false)),
        (Storage, mapping(C::ServiceUnavailable, "The service is temporarily unavailable.", 503, Severity::Critical, false)),
        (External, mapping(C::ServiceUnavailable, "A dependent service is unavailable.", 503, Severity::Major, false)),
        (Configuration, mapping(C::InternalError, "The service is misconfigured.", 500, Severity::Critical, false)),
        (Io, DEFAULT_MAPPING),
        (Serialization, DEFAULT_MAPPING),
    ])
});

/// The table entry for `kind`, else [`DEFAULT_MAPPING`]
pub fn mapping_for(kind: ErrorKind) -> &'static ErrorMapping {
    MAPPINGS.get(&kind).unwrap_or(&DEFAULT_MAPPING)
}

/// HTTP reason phrase used as the response's `error` field
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}
