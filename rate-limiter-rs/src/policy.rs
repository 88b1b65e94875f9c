// rate-limiter-rs/src/policy.rs
// Operation -> policy resolution

use std::sync::{Arc, RwLock};
use std::time::Duration;

use shared_types_rs::config::RateLimitSettings;
use shared_types_rs::TtlRegistry;
use tracing::{debug, info};

use crate::types::{RateLimitError, RateLimitPolicy};

/// How long a dynamically registered policy is served before it must be
/// registered again
pub const DEFAULT_POLICY_TTL: Duration = Duration::from_secs(300);

/// Policies keyed by operation, with a fallback for unlisted operations.
///
/// Updates replace whole policies; a check already holding the previous
/// `Arc` finishes against it.
pub struct PolicyEngine {
    policies: TtlRegistry<String, RateLimitPolicy>,
    default_policy: RwLock<Arc<RateLimitPolicy>>,
}

impl PolicyEngine {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        Self::with_ttl(default_policy, DEFAULT_POLICY_TTL)
    }

    pub fn with_ttl(default_policy: RateLimitPolicy, ttl: Duration) -> Self {
        Self {
            policies: TtlRegistry::new(ttl),
            default_policy: RwLock::new(Arc::new(default_policy)),
        }
    }

    /// Configured policies never expire.
    pub fn from_settings(settings: &RateLimitSettings) -> Result<Self, RateLimitError> {
        let engine = Self::new(RateLimitPolicy::try_from(&settings.default_policy)?);
        for policy_settings in &settings.policies {
            let policy = RateLimitPolicy::try_from(policy_settings)?;
            engine.register_pinned(policy)?;
        }
        info!(
            policies = settings.policies.len(),
            default_limit = settings.default_policy.requests_per_window,
            "Rate limit policies loaded"
        );
        Ok(engine)
    }

    /// Register or replace a policy; it expires after the engine TTL.
    pub fn register(&self, policy: RateLimitPolicy) -> Result<Arc<RateLimitPolicy>, RateLimitError> {
        policy.validate()?;
        debug!(operation = %policy.operation, "Registering rate limit policy");
        Ok(self.policies.insert(policy.operation.clone(), policy))
    }

    pub fn register_pinned(&self, policy: RateLimitPolicy) -> Result<Arc<RateLimitPolicy>, RateLimitError> {
        policy.validate()?;
        Ok(self.policies.pin(policy.operation.clone(), policy))
    }

    pub fn remove(&self, operation: &str) -> Option<Arc<RateLimitPolicy>> {
        self.policies.remove(&operation.to_string())
    }

    pub fn set_default(&self, policy: RateLimitPolicy) -> Result<(), RateLimitError> {
        policy.validate()?;
        if let Ok(mut default_policy) = self.default_policy.write() {
            *default_policy = Arc::new(policy);
        }
        Ok(())
    }

    pub fn default_policy(&self) -> Arc<RateLimitPolicy> {
        match self.default_policy.read() {
            Ok(policy) => Arc::clone(&policy),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// The policy registered for exactly `operation`, else the default.
    pub fn resolve(&self, operation: &str) -> Arc<RateLimitPolicy> {
        self.policies
            .get(&operation.to_string())
            .unwrap_or_else(|| self.default_policy())
    }

    pub fn operations(&self) -> Vec<String> {
        let mut operations = self.policies.keys();
        operations.sort();
        operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RateLimitAlgorithm;
    use shared_types_rs::config::PolicySettings;

    fn policy(operation: &str, limit: u32) -> RateLimitPolicy {
        RateLimitPolicy::new(operation, limit, Duration::from_secs(60), RateLimitAlgorithm::FixedWindow)
    }

    #[test]
    fn test_resolve_exact_then_default() {
        let engine = PolicyEngine::new(policy("*", 100));
        engine.register(policy("upload", 5)).unwrap();

        assert_eq!(engine.resolve("upload").requests_per_window, 5);
        assert_eq!(engine.resolve("upload.large").requests_per_window, 100);
        assert_eq!(engine.resolve("search").operation, "*");
    }

    #[test]
    fn test_replace_keeps_old_arc_intact() {
        let engine = PolicyEngine::new(policy("*", 100));
        engine.register(policy("upload", 5)).unwrap();
        let held = engine.resolve("upload");

        engine.register(policy("upload", 50)).unwrap();
        assert_eq!(held.requests_per_window, 5);
        assert_eq!(engine.resolve("upload").requests_per_window, 50);
    }

    #[test]
    fn test_expired_policy_falls_back_to_default() {
        let engine = PolicyEngine::with_ttl(policy("*", 100), Duration::ZERO);
        engine.register(policy("upload", 5)).unwrap();
        engine.register_pinned(policy("login", 3)).unwrap();

        assert_eq!(engine.resolve("upload").requests_per_window, 100);
        assert_eq!(engine.resolve("login").requests_per_window, 3);
    }

    #[test]
    fn test_from_settings() {
        let settings = RateLimitSettings {
            policies: vec![PolicySettings {
                operation: "login".to_string(),
                requests_per_window: 5,
                window_secs: 300,
                algorithm: "fixed_window".to_string(),
                exceptions: Vec::new(),
            }],
            ..RateLimitSettings::default()
        };
        let engine = PolicyEngine::from_settings(&settings).unwrap();
        assert_eq!(engine.operations(), vec!["login".to_string()]);
        assert_eq!(engine.resolve("login").window, Duration::from_secs(300));
        assert_eq!(
            engine.resolve("other").algorithm,
            RateLimitAlgorithm::SlidingWindow
        );
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let engine = PolicyEngine::new(policy("*", 100));
        let zero_window = RateLimitPolicy::new("x", 1, Duration::ZERO, RateLimitAlgorithm::TokenBucket);
        assert!(engine.register(zero_window.clone()).is_err());
        assert!(engine.set_default(zero_window).is_err());
    }
}
