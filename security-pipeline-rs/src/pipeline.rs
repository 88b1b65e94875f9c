// security-pipeline-rs/src/pipeline.rs
// Request admission, in stage order

use std::collections::HashMap;
use std::sync::Arc;

use content_scanner_rs::{ContentScanner, RecommendedAction, ScanResult};
use error_handling_rs::{Error, ErrorKind, ErrorResponse, ErrorSanitizer};
use input_validation_rs::{
    check_payload_size, normalize_string, HtmlSanitizeOptions, NormalizationOptions,
    SchemaRegistry, DEFAULT_MAX_PAYLOAD_SIZE,
};
use metrics::counter;
use query_sanitizer_rs::{
    validate_structure, ComplexityLimits, ParameterizedQuery, QuerySanitizer, QueryValue,
    SanitizedQuery,
};
use rate_limiter_rs::{RateLimitKey, RateLimiter};
use serde_json::Value;
use shared_types_rs::{AuditSink, CacheStore, PipelineConfig};
use tracing::{debug, info, warn};

use crate::boundary::{self, ToBoundaryError};
use crate::remediation::remediate;
use crate::request::{AcceptedRequest, InboundRequest};

/// Runs every inbound request through admission control, normalization,
/// content scanning and schema validation, and prepares queries for the
/// store. Failures leave as sanitized [`ErrorResponse`]s.
pub struct SecurityPipeline {
    limiter: RateLimiter,
    schemas: SchemaRegistry,
    scanner: ContentScanner,
    queries: QuerySanitizer,
    errors: ErrorSanitizer,
    normalization: NormalizationOptions,
    html: HtmlSanitizeOptions,
    complexity: ComplexityLimits,
    max_payload_size: usize,
}

impl SecurityPipeline {
    pub fn new(
        limiter: RateLimiter,
        schemas: SchemaRegistry,
        scanner: ContentScanner,
        queries: QuerySanitizer,
        errors: ErrorSanitizer,
    ) -> Self {
        Self {
            limiter,
            schemas,
            scanner,
            queries,
            errors,
            normalization: NormalizationOptions::default(),
            html: HtmlSanitizeOptions::default(),
            complexity: ComplexityLimits::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Builds every stage from `config`. The counter store backs both the
    /// rate limiter and the schema registry; every stage reports to `audit`.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn CacheStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, Error> {
        let limiter = RateLimiter::from_settings(&config.rate_limits, Arc::clone(&store))
            .map_err(|e| e.to_boundary_error())?
            .with_audit(Arc::clone(&audit));
        let schemas = SchemaRegistry::from_settings(&config.schemas).with_store(
            store,
            std::time::Duration::from_millis(config.schemas.store_timeout_ms),
        );
        let scanner = ContentScanner::from_settings(&config.scan).with_audit(Arc::clone(&audit));
        let queries = QuerySanitizer::new().with_audit(Arc::clone(&audit));
        let errors = ErrorSanitizer::from_config(config).with_audit(audit);

        info!(
            environment = %config.environment,
            development = errors.is_development(),
            policies = limiter.policies().operations().len(),
            "Security pipeline initialized"
        );

        Ok(Self::new(limiter, schemas, scanner, queries, errors)
            .with_normalization(NormalizationOptions::from(&config.normalization))
            .with_html_options(HtmlSanitizeOptions::from(&config.html))
            .with_complexity_limits(ComplexityLimits::from(&config.query)))
    }

    pub fn with_normalization(mut self, normalization: NormalizationOptions) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_html_options(mut self, html: HtmlSanitizeOptions) -> Self {
        self.html = html;
        self
    }

    pub fn with_complexity_limits(mut self, complexity: ComplexityLimits) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn scanner(&self) -> &ContentScanner {
        &self.scanner
    }

    pub fn query_sanitizer(&self) -> &QuerySanitizer {
        &self.queries
    }

    pub fn error_sanitizer(&self) -> &ErrorSanitizer {
        &self.errors
    }

    /// Admit one request. Stages run in order and the first failure ends
    /// the request: quota, payload size, normalization, payload scan,
    /// schema, content scan.
    pub async fn process(&self, request: InboundRequest) -> Result<AcceptedRequest, ErrorResponse> {
        let correlation_id = request.correlation_id.clone();
        match self.admit(request).await {
            Ok(accepted) => {
                counter!("pipeline.requests", 1, "outcome" => "accepted");
                Ok(accepted)
            }
            Err(error) => {
                counter!("pipeline.requests", 1, "outcome" => "rejected");
                Err(self.reject(error, correlation_id))
            }
        }
    }

    /// Validate a trusted query template and bind `parameters` to it.
    /// Values are never spliced into the template text.
    pub fn prepare_query(
        &self,
        template: &str,
        parameters: HashMap<String, QueryValue>,
    ) -> Result<ParameterizedQuery, ErrorResponse> {
        self.build_query(template, parameters)
            .map_err(|error| self.reject(error, None))
    }

    /// Rule-based cleanup of a raw query string. A query that trips a
    /// blocking rule is refused.
    pub fn sanitize_query(&self, raw: &str) -> Result<SanitizedQuery, ErrorResponse> {
        let sanitized = self.queries.sanitize(raw);
        if sanitized.is_blocked {
            let rules: Vec<&str> = sanitized
                .actions
                .iter()
                .map(|action| action.rule.as_str())
                .chain(sanitized.warnings.iter().map(|warning| warning.rule.as_str()))
                .collect();
            let error = Error::new(
                ErrorKind::ThreatDetected,
                format!("Query refused by rules: {}", rules.join(", ")),
            );
            return Err(self.reject(error, None));
        }
        Ok(sanitized)
    }

    /// Present a failure raised outside the pipeline
    pub fn sanitize_error(&self, error: &Error) -> ErrorResponse {
        self.errors.sanitize(error)
    }

    fn reject(&self, error: Error, correlation_id: Option<String>) -> ErrorResponse {
        let error = match correlation_id {
            Some(id) if error.existing_correlation_id().is_none() => error.with_correlation_id(id),
            _ => error,
        };
        self.errors.sanitize(&error)
    }

    async fn admit(&self, request: InboundRequest) -> Result<AcceptedRequest, Error> {
        let InboundRequest {
            key,
            principal,
            schema_id,
            mut payload,
            content,
            ..
        } = request;

        let rate_limit = self.limiter.check_and_record(&key, &principal).await;
        if !rate_limit.allowed {
            return Err(boundary::rate_limited(&key, &rate_limit));
        }

        let encoded = serde_json::to_string(&payload)?;
        check_payload_size(&encoded, self.max_payload_size).map_err(|e| e.to_boundary_error())?;
        if let Some(content) = &content {
            check_payload_size(content, self.max_payload_size)
                .map_err(|e| e.to_boundary_error())?;
        }

        let mut normalized_fields = Vec::new();
        normalize_value(&mut payload, String::new(), &self.normalization, &mut normalized_fields);
        if !normalized_fields.is_empty() {
            debug!(key = %key, fields = ?normalized_fields, "Normalized payload strings");
        }

        // Remediated strings are what the schema sees
        let mut requires_review = false;
        let mut remediated_fields = Vec::new();
        for_each_string(&mut payload, String::new(), &mut |pointer, text| {
            let inspection = self.inspect(&key, &pointer, text)?;
            requires_review |= inspection.requires_review;
            if inspection.remediated {
                *text = inspection.text;
                remediated_fields.push(pointer);
            }
            Ok(())
        })?;

        if let Some(schema_id) = schema_id.as_deref() {
            let result = match self.schemas.validate(schema_id, &payload).await {
                Some(result) => result,
                None => return Err(boundary::unknown_schema(schema_id)),
            };
            if !result.is_valid() {
                return Err(boundary::schema_violation(&result));
            }
            debug!(
                schema = schema_id,
                properties = result.properties_validated,
                "Payload matches schema"
            );
        }

        let mut content_remediated = false;
        let (content, scan) = match content {
            None => (None, None),
            Some(raw) => {
                let text = normalize_string(&raw, &self.normalization).sanitized;
                let inspection = self.inspect(&key, "content", &text)?;
                requires_review |= inspection.requires_review;
                content_remediated = inspection.remediated;
                (Some(inspection.text), Some(inspection.scan))
            }
        };

        Ok(AcceptedRequest {
            payload,
            content,
            rate_limit,
            scan,
            requires_review,
            normalized_fields,
            content_remediated,
            remediated_fields,
        })
    }

    /// Scan one piece of text and act on the recommended action. Remediated
    /// text is scanned again and refused if anything above low severity
    /// survived.
    fn inspect(&self, key: &RateLimitKey, field: &str, text: &str) -> Result<Inspection, Error> {
        let scan = self.scanner.scan(text).map_err(|e| e.to_boundary_error())?;
        let mut inspection = Inspection {
            text: text.to_string(),
            remediated: false,
            requires_review: false,
            scan,
        };

        match inspection.scan.recommended_action {
            RecommendedAction::Block => return Err(boundary::threat_detected(&inspection.scan)),
            RecommendedAction::Sanitize => {
                let remediated = remediate(text, &inspection.scan, &self.html);
                if let Some(details) = &remediated.details {
                    info!(
                        key = %key,
                        field,
                        threat_level = %inspection.scan.threat_level,
                        "{}",
                        details
                    );
                }

                let rescan = self
                    .scanner
                    .scan(&remediated.sanitized)
                    .map_err(|e| e.to_boundary_error())?;
                match rescan.recommended_action {
                    RecommendedAction::Block | RecommendedAction::Sanitize => {
                        warn!(
                            key = %key,
                            field,
                            threat_level = %rescan.threat_level,
                            "Threats survived remediation"
                        );
                        return Err(boundary::threat_detected(&rescan));
                    }
                    RecommendedAction::RequireReview => inspection.requires_review = true,
                    RecommendedAction::Allow | RecommendedAction::AllowWithWarning => {}
                }
                inspection.remediated = remediated.was_modified;
                inspection.text = remediated.sanitized;
            }
            RecommendedAction::RequireReview => {
                inspection.requires_review = true;
                warn!(
                    key = %key,
                    field,
                    threats = inspection.scan.threats.len(),
                    "Content accepted pending review"
                );
            }
            RecommendedAction::Allow | RecommendedAction::AllowWithWarning => {}
        }
        Ok(inspection)
    }

    fn build_query(
        &self,
        template: &str,
        parameters: HashMap<String, QueryValue>,
    ) -> Result<ParameterizedQuery, Error> {
        let structure = validate_structure(template, &self.complexity);
        if let Some(error) = boundary::query_rejected(&structure, &self.complexity) {
            return Err(error);
        }

        let query = self
            .queries
            .create_parameterized(template, parameters)
            .map_err(|e| e.to_boundary_error())?;
        if !query.warnings().is_empty() {
            warn!(
                statement = ?structure.statement,
                warnings = query.warnings().len(),
                "Query template carries security warnings"
            );
        }
        Ok(query)
    }
}

struct Inspection {
    text: String,
    scan: ScanResult,
    remediated: bool,
    requires_review: bool,
}

/// Visit every string in `value` with its JSON pointer, stopping at the
/// first error. Object keys are not visited.
fn for_each_string<F>(value: &mut Value, pointer: String, visit: &mut F) -> Result<(), Error>
where
    F: FnMut(String, &mut String) -> Result<(), Error>,
{
    match value {
        Value::String(text) => visit(pointer, text),
        Value::Array(items) => items
            .iter_mut()
            .enumerate()
            .try_for_each(|(index, item)| {
                for_each_string(item, format!("{}/{}", pointer, index), &mut *visit)
            }),
        Value::Object(map) => map.iter_mut().try_for_each(|(name, item)| {
            for_each_string(item, format!("{}/{}", pointer, escape_pointer(name)), &mut *visit)
        }),
        _ => Ok(()),
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Normalize every string in `value` in place, recording the JSON pointer
/// of each one that changed. Object keys are left alone.
fn normalize_value(
    value: &mut Value,
    pointer: String,
    options: &NormalizationOptions,
    changed: &mut Vec<String>,
) {
    match value {
        Value::String(text) => {
            let result = normalize_string(text, options);
            if result.was_modified {
                *text = result.sanitized;
                changed.push(pointer);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                normalize_value(item, format!("{}/{}", pointer, index), options, changed);
            }
        }
        Value::Object(map) => {
            for (name, item) in map.iter_mut() {
                normalize_value(item, format!("{}/{}", pointer, escape_pointer(name)), options, changed);
            }
        }
        _ => {}
    }
}
