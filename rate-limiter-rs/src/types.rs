// rate-limiter-rs/src/types.rs
// Keys, policies and results for request quotas

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types_rs::config::{PolicyExceptionSettings, PolicySettings};
use shared_types_rs::CacheError;
use thiserror::Error;

/// Whose quota a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    User,
    Tenant,
    #[serde(rename = "ip")]
    IpAddress,
    ApiKey,
    Global,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::User => "user",
            RateLimitScope::Tenant => "tenant",
            RateLimitScope::IpAddress => "ip",
            RateLimitScope::ApiKey => "api_key",
            RateLimitScope::Global => "global",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one counter: scope, identifier within the scope, operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
    pub scope: RateLimitScope,
    pub identifier: String,
    pub operation: String,
}

impl RateLimitKey {
    pub fn new(scope: RateLimitScope, identifier: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            scope,
            identifier: identifier.into(),
            operation: operation.into(),
        }
    }

    pub fn user(identifier: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(RateLimitScope::User, identifier, operation)
    }

    pub fn tenant(identifier: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(RateLimitScope::Tenant, identifier, operation)
    }

    pub fn ip(address: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(RateLimitScope::IpAddress, address, operation)
    }

    pub fn api_key(identifier: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(RateLimitScope::ApiKey, identifier, operation)
    }

    pub fn global(operation: impl Into<String>) -> Self {
        Self::new(RateLimitScope::Global, "*", operation)
    }

    /// Store key. Separators inside the parts are escaped, so distinct keys
    /// never collide (`a:b` + `c` differs from `a` + `b:c`).
    pub fn cache_key(&self) -> String {
        format!(
            "ratelimit:{}:{}:{}",
            self.scope,
            escape_part(&self.identifier),
            escape_part(&self.operation)
        )
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.scope, self.identifier, self.operation)
    }
}

fn escape_part(part: &str) -> String {
    part.replace('%', "%25").replace(':', "%3A")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    /// Counter reset at epoch-aligned window boundaries
    FixedWindow,
    /// Admission timestamps within the trailing window
    SlidingWindow,
    /// Bucket of `limit` tokens refilled at `limit / window`; allows bursts
    TokenBucket,
    /// Queue level drained at `limit / window`; smooths bursts
    LeakyBucket,
}

impl RateLimitAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAlgorithm::FixedWindow => "fixed_window",
            RateLimitAlgorithm::SlidingWindow => "sliding_window",
            RateLimitAlgorithm::TokenBucket => "token_bucket",
            RateLimitAlgorithm::LeakyBucket => "leaky_bucket",
        }
    }

    pub fn parse(name: &str) -> Result<Self, RateLimitError> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_window" => Ok(RateLimitAlgorithm::FixedWindow),
            "sliding_window" => Ok(RateLimitAlgorithm::SlidingWindow),
            "token_bucket" => Ok(RateLimitAlgorithm::TokenBucket),
            "leaky_bucket" => Ok(RateLimitAlgorithm::LeakyBucket),
            other => Err(RateLimitError::InvalidPolicy(format!(
                "unknown algorithm '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RateLimitAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scales a policy's limit for principals holding a role or license tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyException {
    pub role: Option<String>,
    pub license_tier: Option<String>,
    pub multiplier: f64,
}

impl PolicyException {
    pub fn for_role(role: impl Into<String>, multiplier: f64) -> Self {
        Self {
            role: Some(role.into()),
            license_tier: None,
            multiplier,
        }
    }

    pub fn for_tier(tier: impl Into<String>, multiplier: f64) -> Self {
        Self {
            role: None,
            license_tier: Some(tier.into()),
            multiplier,
        }
    }
}

impl From<&PolicyExceptionSettings> for PolicyException {
    fn from(settings: &PolicyExceptionSettings) -> Self {
        Self {
            role: settings.role.clone(),
            license_tier: settings.license_tier.clone(),
            multiplier: settings.multiplier,
        }
    }
}

/// The caller a quota is evaluated for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub roles: Vec<String>,
    pub license_tier: Option<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_license_tier(mut self, tier: impl Into<String>) -> Self {
        self.license_tier = Some(tier.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub operation: String,
    pub requests_per_window: u32,
    pub window: Duration,
    pub algorithm: RateLimitAlgorithm,
    pub exceptions: Vec<PolicyException>,
}

impl RateLimitPolicy {
    pub fn new(
        operation: impl Into<String>,
        requests_per_window: u32,
        window: Duration,
        algorithm: RateLimitAlgorithm,
    ) -> Self {
        Self {
            operation: operation.into(),
            requests_per_window,
            window,
            algorithm,
            exceptions: Vec::new(),
        }
    }

    pub fn with_exception(mut self, exception: PolicyException) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.window.is_zero() {
            return Err(RateLimitError::InvalidPolicy(format!(
                "policy '{}' has a zero window",
                self.operation
            )));
        }
        if let Some(bad) = self
            .exceptions
            .iter()
            .find(|e| !e.multiplier.is_finite() || e.multiplier < 0.0)
        {
            return Err(RateLimitError::InvalidPolicy(format!(
                "policy '{}' has invalid multiplier {}",
                self.operation, bad.multiplier
            )));
        }
        Ok(())
    }

    /// Multiplier for `principal`: the first exception naming one of its
    /// roles, else the first naming its license tier, else 1.0.
    pub fn multiplier_for(&self, principal: &Principal) -> f64 {
        let by_role = self.exceptions.iter().find(|exception| {
            exception
                .role
                .as_ref()
                .map_or(false, |role| principal.roles.iter().any(|r| r == role))
        });
        let by_tier = || {
            self.exceptions.iter().find(|exception| {
                matches!(
                    (&exception.license_tier, &principal.license_tier),
                    (Some(wanted), Some(held)) if wanted == held
                )
            })
        };
        by_role
            .or_else(by_tier)
            .map_or(1.0, |exception| exception.multiplier)
    }

    /// `floor(requests_per_window * multiplier)`
    pub fn effective_limit(&self, principal: &Principal) -> u32 {
        let scaled = (self.requests_per_window as f64 * self.multiplier_for(principal)).floor();
        if scaled >= u32::MAX as f64 {
            u32::MAX
        } else {
            scaled.max(0.0) as u32
        }
    }
}

impl TryFrom<&PolicySettings> for RateLimitPolicy {
    type Error = RateLimitError;

    fn try_from(settings: &PolicySettings) -> Result<Self, Self::Error> {
        let policy = RateLimitPolicy {
            operation: settings.operation.clone(),
            requests_per_window: settings.requests_per_window,
            window: Duration::from_secs(settings.window_secs),
            algorithm: RateLimitAlgorithm::parse(&settings.algorithm)?,
            exceptions: settings.exceptions.iter().map(PolicyException::from).collect(),
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    /// Requests still admissible, `0..=limit`
    pub remaining: u32,
    /// Set when the request was refused
    pub retry_after: Option<Duration>,
    pub current_count: u32,
    pub window_reset_at: DateTime<Utc>,
    /// The counter store could not be consulted; the decision came from the
    /// configured failure mode.
    #[serde(default)]
    pub degraded: bool,
}

impl RateLimitResult {
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|retry| retry.as_secs() + u64::from(retry.subsec_nanos() > 0))
    }
}

/// A result together with the policy that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub key: RateLimitKey,
    pub policy_operation: String,
    pub algorithm: RateLimitAlgorithm,
    pub window: Duration,
    #[serde(flatten)]
    pub result: RateLimitResult,
}

/// What to decide when the counter store fails or times out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    FailOpen,
    FailClosed,
}

impl FailureMode {
    pub fn parse(name: &str) -> Result<Self, RateLimitError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "open" | "fail_open" => Ok(FailureMode::FailOpen),
            "closed" | "fail_closed" => Ok(FailureMode::FailClosed),
            other => Err(RateLimitError::InvalidPolicy(format!(
                "unknown failure mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    #[error("Counter store error: {0}")]
    Store(#[from] CacheError),

    #[error("Counter store timed out after {0}ms")]
    StoreTimeout(u64),

    #[error("Corrupt counter state for {key}: {reason}")]
    CorruptState { key: String, reason: String },
}
