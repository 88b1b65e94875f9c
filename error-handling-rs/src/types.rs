//! # Boundary Error Type
//!
//! Every failure that may cross the system boundary is raised as an
//! [`Error`] carrying an explicit [`ErrorKind`] tag chosen at the failure
//! site. The tag, not the Rust type of the cause, decides how the failure
//! is presented externally.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Log severity attached to each kind's mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Expected outcome, not an incident
    Info,
    /// Caller mistake
    Minor,
    /// Service-side failure
    Major,
    /// Security-relevant or data-path failure
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Minor => write!(f, "MINOR"),
            Severity::Major => write!(f, "MAJOR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Failure tag set where the failure is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    SchemaViolation,
    QuerySyntax,
    QueryComplexity,
    ThreatDetected,
    RateLimited,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Timeout,
    Unavailable,
    Storage,
    Configuration,
    External,
    Io,
    Serialization,
    /// Wrapper kind; defers to its cause chain
    Internal,
    /// Wrapper kind; defers to its cause chain
    Unexpected,
}

impl ErrorKind {
    /// Wrapper kinds carry no classification of their own.
    pub fn is_generic(&self) -> bool {
        matches!(self, ErrorKind::Internal | ErrorKind::Unexpected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "Validation Error"),
            ErrorKind::SchemaViolation => write!(f, "Schema Violation"),
            ErrorKind::QuerySyntax => write!(f, "Query Syntax Error"),
            ErrorKind::QueryComplexity => write!(f, "Query Complexity Error"),
            ErrorKind::ThreatDetected => write!(f, "Threat Detected"),
            ErrorKind::RateLimited => write!(f, "Rate Limit Error"),
            ErrorKind::Authentication => write!(f, "Authentication Error"),
            ErrorKind::Authorization => write!(f, "Authorization Error"),
            ErrorKind::NotFound => write!(f, "Not Found"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::Timeout => write!(f, "Timeout Error"),
            ErrorKind::Unavailable => write!(f, "Service Unavailable Error"),
            ErrorKind::Storage => write!(f, "Storage Error"),
            ErrorKind::Configuration => write!(f, "Configuration Error"),
            ErrorKind::External => write!(f, "External Service Error"),
            ErrorKind::Io => write!(f, "I/O Error"),
            ErrorKind::Serialization => write!(f, "Serialization Error"),
            ErrorKind::Internal => write!(f, "Internal Server Error"),
            ErrorKind::Unexpected => write!(f, "Unexpected Error"),
        }
    }
}

/// Core boundary error.
///
/// `message` and `details` are internal: they go to logs and the audit
/// sink, and only reach a response in development deployments.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Set once and kept as the error propagates
    pub correlation_id: Option<String>,
    pub details: serde_json::Map<String, serde_json::Value>,
    cause: Option<Box<dyn StdError + Send + Sync>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            details: serde_json::Map::new(),
            cause: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Adds a detail entry. Only allow-listed keys ever reach a response.
    pub fn detail<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.details.insert(key.into(), value);
        }
        self
    }

    pub fn cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_correlation_id<S: Into<String>>(mut self, correlation_id: S) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Errors below this one, nearest first
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> + '_ {
        let mut next = self.source();
        std::iter::from_fn(move || {
            let current = next?;
            next = current.source();
            Some(current)
        })
    }

    /// This error's kind, or for a wrapper kind the first specific kind in
    /// the cause chain.
    pub fn effective_kind(&self) -> ErrorKind {
        if !self.kind.is_generic() {
            return self.kind;
        }
        self.chain()
            .filter_map(|cause| cause.downcast_ref::<Error>())
            .map(|inner| inner.kind)
            .find(|kind| !kind.is_generic())
            .unwrap_or(self.kind)
    }

    /// The first correlation id found on this error or its causes
    pub fn existing_correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref().or_else(|| {
            self.chain()
                .filter_map(|cause| cause.downcast_ref::<Error>())
                .find_map(|inner| inner.correlation_id.as_deref())
        })
    }

    /// Display strings of every cause, nearest first
    pub fn cause_messages(&self) -> Vec<String> {
        self.chain().map(|cause| cause.to_string()).collect()
    }

    pub fn backtrace(&self) -> Option<String> {
        match self.backtrace.status() {
            BacktraceStatus::Captured => Some(self.backtrace.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(correlation_id) = &self.correlation_id {
            write!(f, " [CorrelationID: {}]", correlation_id)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string()).cause(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Serialization, format!("JSON error: {}", err)).cause(err)
    }
}
