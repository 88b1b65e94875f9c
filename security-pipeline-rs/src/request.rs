use content_scanner_rs::ScanResult;
use rate_limiter_rs::{Principal, RateLimitKey, RateLimitResult};
use serde::Serialize;
use serde_json::Value;

/// One request as it arrives at the boundary
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Who is asking, for which operation
    pub key: RateLimitKey,
    pub principal: Principal,
    /// Schema the payload must satisfy; `None` skips schema validation
    pub schema_id: Option<String>,
    pub payload: Value,
    /// Free text to scan, e.g. a comment body or document content
    pub content: Option<String>,
    /// Correlation id carried in from an upstream hop
    pub correlation_id: Option<String>,
}

impl InboundRequest {
    pub fn new(key: RateLimitKey, payload: Value) -> Self {
        Self {
            key,
            principal: Principal::anonymous(),
            schema_id: None,
            payload,
            content: None,
            correlation_id: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_schema(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A request that passed every stage, in the form later stages should use
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedRequest {
    /// Payload with every string normalized
    pub payload: Value,
    /// Content after normalization and, when the scanner asked for it,
    /// remediation
    pub content: Option<String>,
    pub rate_limit: RateLimitResult,
    pub scan: Option<ScanResult>,
    /// The scanner found medium-severity threats in the content or a
    /// payload string; a human should look
    pub requires_review: bool,
    /// JSON pointers of payload strings the normalizer changed
    pub normalized_fields: Vec<String>,
    /// Content was rewritten by remediation
    pub content_remediated: bool,
    /// JSON pointers of payload strings rewritten by remediation
    pub remediated_fields: Vec<String>,
}
