// query-sanitizer-rs/src/parameterized.rs
// Parameter binding and the execution seam

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::lexer::{tokenize, LiteralMode, TokenKind};
use crate::types::{QueryError, QueryValue, SecurityWarning};

lazy_static! {
    static ref PARAMETER_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").unwrap();
}

/// A trusted template plus typed values, kept apart until execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterizedQuery {
    template: String,
    parameters: BTreeMap<String, QueryValue>,
    #[serde(skip)]
    placeholders: Vec<(Range<usize>, String)>,
    warnings: Vec<SecurityWarning>,
}

impl ParameterizedQuery {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn parameters(&self) -> &BTreeMap<String, QueryValue> {
        &self.parameters
    }

    /// Placeholder names in order of first appearance
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.placeholders
            .iter()
            .map(|(_, name)| name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Warnings raised by the template text itself
    pub fn warnings(&self) -> &[SecurityWarning] {
        &self.warnings
    }

    /// The template with values rendered as escaped literals, for logs and
    /// audit only. Executors receive the template and parameters instead.
    pub fn display(&self) -> String {
        let mut output = String::with_capacity(self.template.len());
        let mut cursor = 0;
        for (range, name) in &self.placeholders {
            output.push_str(&self.template[cursor..range.start]);
            match self.parameters.get(name) {
                Some(value) => output.push_str(&value.to_literal()),
                None => output.push_str(&self.template[range.clone()]),
            }
            cursor = range.end;
        }
        output.push_str(&self.template[cursor..]);
        output
    }
}

fn normalize_name(name: &str) -> Result<String, QueryError> {
    let bare = name.strip_prefix('@').unwrap_or(name);
    if PARAMETER_NAME.is_match(bare) {
        Ok(bare.to_string())
    } else {
        Err(QueryError::InvalidParameterName(name.to_string()))
    }
}

/// `@name` placeholders outside literals and comments
pub(crate) fn find_placeholders(template: &str) -> Vec<(Range<usize>, String)> {
    tokenize(template, LiteralMode::ToEndOfInput)
        .into_iter()
        .filter(|token| token.kind == TokenKind::Parameter)
        .map(|token| (token.range(), token.text(template)[1..].to_string()))
        .collect()
}

pub(crate) fn bind_parameters(
    template: &str,
    parameters: HashMap<String, QueryValue>,
    warnings: Vec<SecurityWarning>,
) -> Result<ParameterizedQuery, QueryError> {
    let mut bound = BTreeMap::new();
    for (name, value) in parameters {
        bound.insert(normalize_name(&name)?, value);
    }

    let placeholders = find_placeholders(template);
    for (_, name) in &placeholders {
        if !PARAMETER_NAME.is_match(name) {
            return Err(QueryError::InvalidParameterName(format!("@{}", name)));
        }
        if !bound.contains_key(name) {
            return Err(QueryError::MissingParameter(name.clone()));
        }
    }

    let used: BTreeSet<&str> = placeholders.iter().map(|(_, name)| name.as_str()).collect();
    if let Some(unused) = bound.keys().find(|name| !used.contains(name.as_str())) {
        return Err(QueryError::UnusedParameter(unused.clone()));
    }

    Ok(ParameterizedQuery {
        template: template.to_string(),
        parameters: bound,
        placeholders,
        warnings,
    })
}

/// The query engine seam. Implementations send the template and the bound
/// values as separate channels and never execute [`ParameterizedQuery::display`].
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &ParameterizedQuery) -> Result<Vec<Value>, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuerySanitizer;
    use std::sync::Mutex;

    fn params(pairs: &[(&str, QueryValue)]) -> HashMap<String, QueryValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_payload_as_parameter_has_no_warnings() {
        let sanitizer = QuerySanitizer::new();
        let query = sanitizer
            .create_parameterized(
                "SELECT * FROM users WHERE name = @name",
                params(&[("name", QueryValue::from("'; DROP TABLE users; --"))]),
            )
            .unwrap();
        assert!(query.warnings().is_empty());
        assert_eq!(query.template(), "SELECT * FROM users WHERE name = @name");
        assert_eq!(
            query.display(),
            "SELECT * FROM users WHERE name = '''; DROP TABLE users; --'"
        );
    }

    #[test]
    fn test_binding_errors() {
        let sanitizer = QuerySanitizer::new();
        let template = "MATCH (n) WHERE n.id = @id AND n.kind = @kind RETURN n";

        assert_eq!(
            sanitizer.create_parameterized(template, params(&[("id", 1.into())])),
            Err(QueryError::MissingParameter("kind".to_string()))
        );
        assert_eq!(
            sanitizer.create_parameterized(
                template,
                params(&[("id", 1.into()), ("kind", "x".into()), ("extra", true.into())])
            ),
            Err(QueryError::UnusedParameter("extra".to_string()))
        );
        assert_eq!(
            sanitizer.create_parameterized(template, params(&[("id;--", 1.into())])),
            Err(QueryError::InvalidParameterName("id;--".to_string()))
        );
    }

    #[test]
    fn test_placeholders_inside_literals_are_not_bound() {
        let sanitizer = QuerySanitizer::new();
        let query = sanitizer
            .create_parameterized(
                "SELECT * FROM t WHERE email = 'ops@example.com' AND id = @id AND id = @id",
                params(&[("@id", QueryValue::Integer(7))]),
            )
            .unwrap();
        assert_eq!(query.parameter_names(), vec!["id"]);
        assert!(query.display().ends_with("id = 7 AND id = 7"));
        assert!(query.display().contains("'ops@example.com'"));
    }

    #[test]
    fn test_template_warnings_and_forbidden_constructs() {
        let sanitizer = QuerySanitizer::new();
        let query = sanitizer
            .create_parameterized("DELETE FROM sessions WHERE id = @id", params(&[("id", 1.into())]))
            .unwrap();
        assert_eq!(query.warnings().len(), 1);
        assert_eq!(query.warnings()[0].rule, "destructive_keyword");

        assert!(matches!(
            sanitizer.create_parameterized("EXEC xp_cmdshell @cmd", params(&[("cmd", "dir".into())])),
            Err(QueryError::ForbiddenConstruct(_))
        ));
    }

    struct RecordingExecutor {
        seen: Mutex<Vec<(String, BTreeMap<String, QueryValue>)>>,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(&self, query: &ParameterizedQuery) -> Result<Vec<Value>, QueryError> {
            self.seen
                .lock()
                .unwrap()
                .push((query.template().to_string(), query.parameters().clone()));
            Ok(vec![serde_json::json!({"ok": true})])
        }
    }

    #[tokio::test]
    async fn test_executor_receives_separate_channels() {
        let executor = RecordingExecutor {
            seen: Mutex::new(Vec::new()),
        };
        let query = QuerySanitizer::new()
            .create_parameterized(
                "SELECT * FROM t WHERE name = @name",
                params(&[("name", "x' OR '1'='1".into())]),
            )
            .unwrap();
        let rows = executor.execute(&query).await.unwrap();
        assert_eq!(rows.len(), 1);

        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen[0].0, "SELECT * FROM t WHERE name = @name");
        assert_eq!(seen[0].1["name"], QueryValue::Text("x' OR '1'='1".to_string()));
    }
}
