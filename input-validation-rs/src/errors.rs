//! Error handling for the validation library
//!
//! Operational failures (bad URLs, blown time budgets, oversized payloads)
//! surface as [`InputError`]. Schema findings are data, not errors, and live
//! in [`crate::schema::ValidationResult`].

use thiserror::Error;

/// Result type for input operations
pub type InputResult<T> = Result<T, InputError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Input could not be parsed as an absolute URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL scheme is on the forbidden list or missing from the allow-list
    #[error("URL scheme '{0}' is not allowed")]
    ForbiddenScheme(String),

    /// URL host points at a loopback, private or otherwise internal address
    #[error("URL host '{0}' is not publicly routable")]
    PrivateHost(String),

    /// URL embeds a username or password
    #[error("URL contains embedded credentials")]
    EmbeddedCredentials,

    /// Stage exceeded its time budget
    #[error("{stage} exceeded its {budget_ms}ms time budget")]
    Timeout { stage: String, budget_ms: u64 },

    /// Payload size exceeds maximum
    #[error("Payload too large: {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Regex pattern failed to compile or exceeded the size budget
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Markup could not be parsed into a tree
    #[error("Malformed HTML: {0}")]
    MalformedHtml(String),
}

impl InputError {
    /// Timeouts are transient; the caller may retry the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InputError::Timeout { .. })
    }

    /// Returns true if this error reflects a rejected, potentially hostile input
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            InputError::ForbiddenScheme(_)
                | InputError::PrivateHost(_)
                | InputError::EmbeddedCredentials
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = InputError::Timeout {
            stage: "scan".to_string(),
            budget_ms: 100,
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_security_rejection());
        assert_eq!(timeout.to_string(), "scan exceeded its 100ms time budget");

        assert!(InputError::PrivateHost("127.0.0.1".to_string()).is_security_rejection());
        assert!(!InputError::InvalidUrl("x".to_string()).is_retryable());
    }
}
