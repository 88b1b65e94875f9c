use std::collections::HashMap;
use std::sync::Arc;

use content_scanner_rs::RecommendedAction;
use error_handling_rs::{Error, ErrorKind, SafeErrorCode};
use query_sanitizer_rs::QueryValue;
use rate_limiter_rs::RateLimitKey;
use security_pipeline_rs::{InboundRequest, SecurityPipeline};
use serde_json::json;
use shared_types_rs::{InMemoryCacheStore, MemoryAuditSink, PipelineConfig};

fn config(environment: &str) -> PipelineConfig {
    PipelineConfig::from_toml_str(&format!(
        r#"
environment = "{}"

[rate_limits]
failure_mode = "open"

[[rate_limits.policies]]
operation = "search"
requests_per_window = 2
window_secs = 60
algorithm = "sliding_window"
"#,
        environment
    ))
    .unwrap()
}

fn pipeline(environment: &str) -> (SecurityPipeline, MemoryAuditSink) {
    let audit = MemoryAuditSink::new();
    let pipeline = SecurityPipeline::from_config(
        &config(environment),
        Arc::new(InMemoryCacheStore::new()),
        Arc::new(audit.clone()),
    )
    .unwrap();
    (pipeline, audit)
}

fn search(user: &str, payload: serde_json::Value) -> InboundRequest {
    InboundRequest::new(RateLimitKey::user(user, "search"), payload)
}

#[tokio::test]
async fn test_clean_request_accepted() {
    let (pipeline, _) = pipeline("production");
    let request = search("u-1", json!({"query": "  graph databases  ", "limit": 10}))
        .with_schema("search_request")
        .with_content("The graph links each author to the papers they wrote.");

    let accepted = pipeline.process(request).await.unwrap();
    assert_eq!(accepted.payload["query"], "graph databases");
    assert_eq!(accepted.normalized_fields, vec!["/query".to_string()]);
    assert!(!accepted.requires_review);
    assert!(!accepted.content_remediated);
    assert!(accepted.scan.as_ref().unwrap().is_clean());
    assert!(accepted.rate_limit.allowed);
    assert_eq!(accepted.rate_limit.limit, 2);
    assert_eq!(accepted.rate_limit.remaining, 1);
}

#[tokio::test]
async fn test_rate_limited_after_quota() {
    let (pipeline, audit) = pipeline("production");
    for _ in 0..2 {
        pipeline.process(search("u-2", json!({"query": "x"}))).await.unwrap();
    }

    let response = pipeline
        .process(search("u-2", json!({"query": "x"})))
        .await
        .unwrap_err();
    assert_eq!(response.status_code, 429);
    assert_eq!(response.code, SafeErrorCode::RateLimited);
    let retry = response.retry_after_seconds.unwrap();
    assert!((1..=60).contains(&retry), "{}", retry);

    let details = response.details.unwrap();
    assert_eq!(details["limit"], 2);
    assert_eq!(details["remaining"], 0);
    assert!(details["resetAt"].as_str().is_some());
    assert!(!details.contains_key("degraded"));

    assert_eq!(audit.events_named("rate_limit.exceeded").len(), 1);
    assert_eq!(audit.events_named("error.sanitized").len(), 1);

    // other principals keep their own quota
    assert!(pipeline.process(search("u-3", json!({"query": "x"}))).await.is_ok());
}

#[tokio::test]
async fn test_unknown_schema_rejected() {
    let (pipeline, _) = pipeline("production");
    let response = pipeline
        .process(search("u-4", json!({"query": "x"})).with_schema("nope"))
        .await
        .unwrap_err();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.code, SafeErrorCode::ValidationError);
    assert!(response.details.is_none());
    assert!(response.debug.is_none());
}

#[tokio::test]
async fn test_missing_required_field() {
    let (pipeline, _) = pipeline("production");
    let response = pipeline
        .process(search("u-5", json!({"limit": 10})).with_schema("search_request"))
        .await
        .unwrap_err();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.code, SafeErrorCode::ValidationError);
    assert_eq!(response.details.unwrap()["field"], "query");
}

#[tokio::test]
async fn test_oversized_payload_rejected() {
    let (pipeline, _) = pipeline("production");
    let pipeline = pipeline.with_max_payload_size(32);
    let response = pipeline
        .process(search("u-6", json!({"query": "x".repeat(64)})))
        .await
        .unwrap_err();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.details.unwrap()["limit"], 32);
}

#[tokio::test]
async fn test_script_content_remediated() {
    let (pipeline, _) = pipeline("production");
    let request = search("u-7", json!({"query": "x"}))
        .with_content("Nice post <script>alert(document.domain)</script>");

    let accepted = pipeline.process(request).await.unwrap();
    let content = accepted.content.unwrap();
    assert!(!content.to_lowercase().contains("<script"), "{}", content);
    assert!(content.contains("Nice post"));
    assert!(accepted.content_remediated);
    assert_eq!(
        accepted.scan.unwrap().recommended_action,
        RecommendedAction::Sanitize
    );
}

#[tokio::test]
async fn test_card_number_masked() {
    let (pipeline, _) = pipeline("production");
    let request = search("u-8", json!({"query": "x"}))
        .with_content("Charge card 4111 1111 1111 1111 please");

    let accepted = pipeline.process(request).await.unwrap();
    let content = accepted.content.unwrap();
    assert!(!content.contains("4111 1111 1111 1111"), "{}", content);
    assert!(content.contains("[REDACTED]"));
}

#[tokio::test]
async fn test_sql_content_blocked() {
    let (pipeline, audit) = pipeline("production");
    let request =
        search("u-9", json!({"query": "x"})).with_content("1 UNION SELECT password FROM users");

    let response = pipeline.process(request).await.unwrap_err();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.code, SafeErrorCode::SecurityViolation);
    assert!(response.details.is_none());
    assert_eq!(audit.events_named("content_scan.threats").len(), 1);

    let body = serde_json::to_string(&response).unwrap();
    assert!(!body.contains("UNION"));
}

#[tokio::test]
async fn test_tag_rebuilt_by_remediation_is_stripped() {
    let (pipeline, _) = pipeline("production");
    let request = search("u-12", json!({"query": "x"}))
        .with_content("password=x <scr/**/ipt>alert(1)</scr/**/ipt>");

    let accepted = pipeline.process(request).await.unwrap();
    let content = accepted.content.unwrap();
    let lower = content.to_lowercase();
    assert!(!lower.contains("<script"), "{}", content);
    assert!(!lower.contains("alert(1)"), "{}", content);
    assert!(accepted.content_remediated);
}

#[tokio::test]
async fn test_payload_strings_are_scanned() {
    let (pipeline, audit) = pipeline("production");
    let request = search(
        "u-13",
        json!({"query": "x' UNION SELECT password FROM users; <script>alert(1)</script>"}),
    )
    .with_schema("search_request");

    let response = pipeline.process(request).await.unwrap_err();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.code, SafeErrorCode::SecurityViolation);
    assert_eq!(audit.events_named("content_scan.threats").len(), 1);
}

#[tokio::test]
async fn test_payload_strings_are_remediated() {
    let (pipeline, _) = pipeline("production");
    let request = search(
        "u-14",
        json!({"query": "graph databases", "filters": {"notes": ["ok", "card 4111 1111 1111 1111"]}}),
    )
    .with_schema("search_request");

    let accepted = pipeline.process(request).await.unwrap();
    assert_eq!(accepted.remediated_fields, vec!["/filters/notes/1".to_string()]);
    let note = accepted.payload["filters"]["notes"][1].as_str().unwrap();
    assert!(!note.contains("4111"), "{}", note);
    assert!(note.contains("[REDACTED]"));
    assert_eq!(accepted.payload["query"], "graph databases");
    assert!(accepted.scan.is_none());
}

#[tokio::test]
async fn test_development_exposes_debug() {
    let (pipeline, _) = pipeline("development");
    let response = pipeline
        .process(search("u-10", json!({"query": "x"})).with_schema("nope"))
        .await
        .unwrap_err();
    let debug = response.debug.unwrap();
    assert_eq!(debug.kind, ErrorKind::Validation);
    assert!(debug.message.contains("Unknown schema 'nope'"));
}

#[tokio::test]
async fn test_inbound_correlation_id_kept() {
    let (pipeline, _) = pipeline("production");
    let response = pipeline
        .process(
            search("u-11", json!({"query": "x"}))
                .with_schema("nope")
                .with_correlation_id("req-7f3a"),
        )
        .await
        .unwrap_err();
    assert_eq!(response.correlation_id, "req-7f3a");
}

#[test]
fn test_classic_payload_bound_as_parameter() {
    let (pipeline, _) = pipeline("production");
    let payload = "'; DROP TABLE users; --";
    let query = pipeline
        .prepare_query(
            "SELECT * FROM users WHERE name = @name",
            HashMap::from([("name".to_string(), QueryValue::from(payload))]),
        )
        .unwrap();
    assert!(query.warnings().is_empty());
    assert_eq!(query.template(), "SELECT * FROM users WHERE name = @name");
    assert!(!query.template().contains(payload));

    let sanitized = pipeline.sanitize_query(payload).unwrap();
    assert!(sanitized.was_modified);
    assert!(!sanitized.query.contains("--"));
    assert!(sanitized.has_critical_warnings());
}

#[test]
fn test_query_complexity_rejected() {
    let (pipeline, _) = pipeline("production");
    let joins: String = (0..6)
        .map(|i| format!(" JOIN t{i} ON t{i}.id = a.id"))
        .collect();
    let response = pipeline
        .prepare_query(&format!("SELECT * FROM a{}", joins), HashMap::new())
        .unwrap_err();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.code, SafeErrorCode::ValidationError);
    assert_eq!(response.details.unwrap()["limit"], 100);
}

#[test]
fn test_malformed_query_rejected() {
    let (pipeline, _) = pipeline("production");
    let response = pipeline.prepare_query("SELECT (1", HashMap::new()).unwrap_err();
    assert_eq!(response.status_code, 400);
    assert!(response.details.is_none());
}

#[test]
fn test_escape_primitive_refused() {
    let (pipeline, _) = pipeline("production");
    let response = pipeline.sanitize_query("EXEC xp_cmdshell 'dir'").unwrap_err();
    assert_eq!(response.code, SafeErrorCode::SecurityViolation);
}

#[test]
fn test_production_error_hides_secrets() {
    let (pipeline, audit) = pipeline("production");
    let storage = Error::new(
        ErrorKind::Storage,
        "Server=dbhost.internal;User Id=admin;Password=hunter2",
    );
    let error = Error::internal("graph write failed").cause(storage);

    let response = pipeline.sanitize_error(&error);
    assert_eq!(response.status_code, 503);
    assert_eq!(response.code, SafeErrorCode::ServiceUnavailable);
    let body = serde_json::to_string(&response).unwrap();
    for secret in ["hunter2", "dbhost", "admin", "graph write failed"] {
        assert!(!body.contains(secret), "{} leaked in {}", secret, body);
    }

    // the full failure is kept for operators under the same id
    let events = audit.events_named("error.sanitized");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].context["correlation_id"], response.correlation_id.as_str());
}
