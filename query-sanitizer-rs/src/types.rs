// query-sanitizer-rs/src/types.rs
// Sanitization records, parameter values and the crate error

use serde::{Deserialize, Serialize};
use shared_types_rs::ThreatLevel;
use thiserror::Error;

/// One textual edit made by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationAction {
    pub rule: String,
    /// Byte offset in the raw query
    pub position: usize,
    pub original: String,
    pub replacement: String,
    pub reason: String,
}

/// A finding that does not alter the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityWarning {
    pub rule: String,
    pub severity: ThreatLevel,
    pub message: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedQuery {
    pub original: String,
    pub query: String,
    pub was_modified: bool,
    pub actions: Vec<SanitizationAction>,
    pub warnings: Vec<SecurityWarning>,
    /// A blocking rule fired; the query must not be executed.
    pub is_blocked: bool,
}

impl SanitizedQuery {
    pub fn has_critical_warnings(&self) -> bool {
        self.warnings
            .iter()
            .any(|warning| warning.severity == ThreatLevel::Critical)
    }
}

/// A typed value bound to a query parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<QueryValue>),
}

impl QueryValue {
    /// Render as a literal for display and audit. Never executed.
    pub fn to_literal(&self) -> String {
        match self {
            QueryValue::Null => "NULL".to_string(),
            QueryValue::Bool(true) => "TRUE".to_string(),
            QueryValue::Bool(false) => "FALSE".to_string(),
            QueryValue::Integer(i) => i.to_string(),
            QueryValue::Float(f) if f.is_finite() => f.to_string(),
            QueryValue::Float(_) => "NULL".to_string(),
            QueryValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            QueryValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(QueryValue::to_literal).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            QueryValue::Null => "null",
            QueryValue::Bool(_) => "bool",
            QueryValue::Integer(_) => "integer",
            QueryValue::Float(_) => "float",
            QueryValue::Text(_) => "text",
            QueryValue::List(_) => "list",
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Integer(value as i64)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(QueryValue::Null, Into::into)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        QueryValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("No value bound for parameter '@{0}'")]
    MissingParameter(String),

    #[error("Parameter '{0}' is not used by the template")]
    UnusedParameter(String),

    #[error("Invalid parameter name: '{0}'")]
    InvalidParameterName(String),

    #[error("Template uses forbidden construct: {0}")]
    ForbiddenConstruct(String),

    #[error("Query execution failed: {0}")]
    Execution(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_rendering() {
        assert_eq!(QueryValue::from("O'Brien").to_literal(), "'O''Brien'");
        assert_eq!(QueryValue::from(Some(3)).to_literal(), "3");
        assert_eq!(QueryValue::from(None::<i64>).to_literal(), "NULL");
        assert_eq!(QueryValue::Float(f64::NAN).to_literal(), "NULL");
        assert_eq!(
            QueryValue::from(vec!["a", "b'c"]).to_literal(),
            "('a', 'b''c')"
        );
    }
}
