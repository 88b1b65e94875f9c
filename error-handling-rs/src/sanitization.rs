//! # Error Sanitization
//!
//! Turns an internal [`Error`] into the [`ErrorResponse`] a caller outside
//! the system is allowed to see. The full failure goes to the log and the
//! audit sink under the response's correlation id; the response carries
//! only the mapped safe message, allow-listed details with sensitive values
//! redacted, and, in development deployments only, the original failure.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types_rs::{AuditSink, NoopAuditSink, PipelineConfig, SecurityEvent};

use crate::logging::{generate_correlation_id, log_structured_error};
use crate::mapping::{mapping_for, reason_phrase, SafeErrorCode};
use crate::types::{Error, ErrorKind};

const REDACTED: &str = "[REDACTED]";

// Group `keep`, when present, survives redaction
static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // API keys, tokens, credentials
        Regex::new(r#"(?i)(?P<keep>\b(?:api[_\s-]?key|access[_-]?token|token|secret|password|pwd|credential)s?["']?\s*[=:]\s*["']?)[^"'\s;,&]+"#).unwrap(),

        // OAuth 2.0 tokens
        Regex::new(r"(?i)(?P<keep>\bbearer\s+)[A-Za-z0-9._~+/\-]+=*").unwrap(),

        // JWTs
        Regex::new(r"eyJ[a-zA-Z0-9\-_]+\.eyJ[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-_]+").unwrap(),

        // URL user:password@
        Regex::new(r"(?i)(?P<keep>\b[a-z][a-z0-9+.\-]*://)[^/\s:@]+:[^/\s@]+@").unwrap(),

        // ADO-style connection string parts
        Regex::new(r"(?i)(?P<keep>\b(?:server|data source|host|user id|uid)\s*=\s*)[^;]+").unwrap(),

        // Email addresses
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap(),

        // IP addresses
        Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap(),

        // Social security numbers
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),

        // Credit cards
        Regex::new(r"\b(?:\d{4}[- ]?){3}\d{4}\b").unwrap(),
    ]
});

/// Detail keys that may appear in a response
static SAFE_DETAIL_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "field",
        "path",
        "limit",
        "remaining",
        "resetAt",
        "retryAfterSeconds",
    ])
});

/// Original failure, present only in development deployments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub causes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: SafeErrorCode,
    pub correlation_id: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

pub struct ErrorSanitizer {
    development: bool,
    audit: Arc<dyn AuditSink>,
}

impl ErrorSanitizer {
    /// Internals are disclosed only when `environment` is `development`.
    pub fn new(environment: &str) -> Self {
        Self {
            development: environment.trim().eq_ignore_ascii_case("development"),
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.environment)
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    pub fn sanitize(&self, error: &Error) -> ErrorResponse {
        let kind = error.effective_kind();
        let mapping = mapping_for(kind);
        let correlation_id = error
            .existing_correlation_id()
            .map(str::to_string)
            .unwrap_or_else(generate_correlation_id);
        let all_details = collect_details(error);

        log_structured_error(error, kind, &correlation_id, mapping.log_level);
        counter!("errors.sanitized", 1, "code" => mapping.code.as_str());
        self.audit.emit(
            SecurityEvent::new("error.sanitized")
                .with("correlation_id", &correlation_id)
                .with("kind", kind)
                .with("code", mapping.code)
                .with("status_code", mapping.status)
                .with("message", &error.message)
                .with("causes", error.cause_messages())
                .with("details", &all_details),
        );

        let details = if mapping.include_safe_details {
            safe_details(&all_details)
        } else {
            None
        };
        let retry_after_seconds = if kind == ErrorKind::RateLimited {
            all_details.get("retryAfterSeconds").and_then(Value::as_u64)
        } else {
            None
        };
        let debug = self.development.then(|| DebugInfo {
            kind: error.kind,
            message: error.message.clone(),
            causes: error.cause_messages(),
            backtrace: error.backtrace(),
        });

        ErrorResponse {
            error: reason_phrase(mapping.status).to_string(),
            message: mapping.message.to_string(),
            code: mapping.code,
            correlation_id,
            status_code: mapping.status,
            timestamp: Utc::now(),
            details,
            retry_after_seconds,
            debug,
        }
    }
}

/// One-off sanitization without an audit sink
pub fn sanitize_error(error: &Error, environment: &str) -> ErrorResponse {
    ErrorSanitizer::new(environment).sanitize(error)
}

/// Details of the error and its causes; outer entries win.
fn collect_details(error: &Error) -> Map<String, Value> {
    let mut details = error.details.clone();
    for inner in error.chain().filter_map(|cause| cause.downcast_ref::<Error>()) {
        for (key, value) in &inner.details {
            details.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    details
}

fn safe_details(details: &Map<String, Value>) -> Option<Map<String, Value>> {
    let safe: Map<String, Value> = details
        .iter()
        .filter(|(key, _)| SAFE_DETAIL_KEYS.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), redact_value(value)))
        .collect();
    (!safe.is_empty()).then_some(safe)
}

/// Redacts sensitive strings at any depth, object keys included
fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(sanitize_value(text)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (sanitize_value(key), redact_value(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Redacts every sensitive fragment of `message`
pub fn sanitize_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        sanitized = pattern
            .replace_all(&sanitized, "${keep}[REDACTED]")
            .into_owned();
    }
    sanitized
}

/// A value matching any sensitive pattern is redacted entirely
fn sanitize_value(value: &str) -> String {
    if SENSITIVE_PATTERNS.iter().any(|pattern| pattern.is_match(value)) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}
