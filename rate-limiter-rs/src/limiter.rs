// rate-limiter-rs/src/limiter.rs
// Quota checks against the shared counter store

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use shared_types_rs::config::RateLimitSettings;
use shared_types_rs::{AuditSink, CacheStore, NoopAuditSink, SecurityEvent};
use tracing::{debug, warn};

use crate::algorithms::{CounterState, Decision};
use crate::clock::{Clock, SystemClock};
use crate::policy::PolicyEngine;
use crate::types::{
    FailureMode, Principal, RateLimitError, RateLimitKey, RateLimitPolicy, RateLimitResult,
    RateLimitStatus,
};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(50);

// Retry hint when the store is down and the limiter fails closed
const FAIL_CLOSED_RETRY: Duration = Duration::from_secs(1);

/// Enforces per-key request quotas.
///
/// `check` and `record` are separate store round trips and are not atomic:
/// two concurrent callers may both pass `check` before either records, so a
/// key can exceed its limit by the number of racing requests.
/// [`RateLimiter::check_and_record`] narrows the gap but does not close it.
pub struct RateLimiter {
    policies: Arc<PolicyEngine>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    failure_mode: FailureMode,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(policies: Arc<PolicyEngine>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            policies,
            store,
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
            failure_mode: FailureMode::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn from_settings(
        settings: &RateLimitSettings,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, RateLimitError> {
        let policies = PolicyEngine::from_settings(settings)?;
        Ok(Self::new(Arc::new(policies), store)
            .with_failure_mode(FailureMode::parse(&settings.failure_mode)?)
            .with_store_timeout(Duration::from_millis(settings.store_timeout_ms)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn policies(&self) -> &Arc<PolicyEngine> {
        &self.policies
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Whether one more request for `key` fits. Records nothing.
    pub async fn check(&self, key: &RateLimitKey, principal: &Principal) -> RateLimitResult {
        let policy = self.policies.resolve(&key.operation);
        self.evaluate(key, principal, &policy).await
    }

    /// Count one request against `key`, whether or not it fits.
    pub async fn record(&self, key: &RateLimitKey, principal: &Principal) -> Result<(), RateLimitError> {
        let policy = self.policies.resolve(&key.operation);
        self.commit(key, principal, &policy).await
    }

    /// Check, and record when allowed. The returned `remaining` and
    /// `current_count` include the recorded request.
    pub async fn check_and_record(&self, key: &RateLimitKey, principal: &Principal) -> RateLimitResult {
        let policy = self.policies.resolve(&key.operation);
        let mut result = self.evaluate(key, principal, &policy).await;
        if !result.allowed || result.degraded {
            return result;
        }

        match self.commit(key, principal, &policy).await {
            Ok(()) => {
                result.remaining = result.remaining.saturating_sub(1);
                result.current_count = result.current_count.saturating_add(1);
                result
            }
            Err(err) => self.degraded(key, &policy, result.limit, &err),
        }
    }

    pub async fn get_status(&self, key: &RateLimitKey, principal: &Principal) -> RateLimitStatus {
        let policy = self.policies.resolve(&key.operation);
        let result = self.evaluate(key, principal, &policy).await;
        RateLimitStatus {
            key: key.clone(),
            policy_operation: policy.operation.clone(),
            algorithm: policy.algorithm,
            window: policy.window,
            result,
        }
    }

    /// Forget all counted requests for `key`.
    pub async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        let cache_key = key.cache_key();
        self.with_timeout(self.store.delete(&cache_key)).await?;
        debug!(key = %key, "Rate limit counter reset");
        Ok(())
    }

    async fn evaluate(
        &self,
        key: &RateLimitKey,
        principal: &Principal,
        policy: &RateLimitPolicy,
    ) -> RateLimitResult {
        let limit = policy.effective_limit(principal);
        let window_ms = window_millis(policy.window);
        let now_ms = self.clock.now_ms();

        let stored = match self.load_state(key).await {
            Ok(stored) => stored,
            Err(err) => return self.degraded(key, policy, limit, &err),
        };
        let state = CounterState::resume(stored, policy.algorithm, limit, window_ms, now_ms);
        let result = to_result(state.decide(limit, window_ms, now_ms), limit, now_ms);

        if !result.allowed {
            self.on_rejected(key, policy, &result);
        }
        result
    }

    async fn commit(
        &self,
        key: &RateLimitKey,
        principal: &Principal,
        policy: &RateLimitPolicy,
    ) -> Result<(), RateLimitError> {
        let limit = policy.effective_limit(principal);
        let window_ms = window_millis(policy.window);
        let now_ms = self.clock.now_ms();

        let stored = self.load_state(key).await?;
        let mut state = CounterState::resume(stored, policy.algorithm, limit, window_ms, now_ms);
        state.consume(now_ms);
        self.save_state(key, &state, policy.window).await
    }

    async fn load_state(&self, key: &RateLimitKey) -> Result<Option<CounterState>, RateLimitError> {
        let cache_key = key.cache_key();
        let Some(raw) = self.with_timeout(self.store.get(&cache_key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                // unreadable state restarts the counter
                warn!(key = %key, error = %err, "Discarding corrupt rate limit state");
                Ok(None)
            }
        }
    }

    async fn save_state(
        &self,
        key: &RateLimitKey,
        state: &CounterState,
        ttl: Duration,
    ) -> Result<(), RateLimitError> {
        let encoded = serde_json::to_string(state).map_err(|err| RateLimitError::CorruptState {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        self.with_timeout(self.store.set_with_expiry(&key.cache_key(), encoded, ttl))
            .await
    }

    async fn with_timeout<T, F>(&self, operation: F) -> Result<T, RateLimitError>
    where
        F: std::future::Future<Output = Result<T, shared_types_rs::CacheError>>,
    {
        match tokio::time::timeout(self.store_timeout, operation).await {
            Ok(result) => result.map_err(RateLimitError::from),
            Err(_) => Err(RateLimitError::StoreTimeout(self.store_timeout.as_millis() as u64)),
        }
    }

    fn degraded(
        &self,
        key: &RateLimitKey,
        policy: &RateLimitPolicy,
        limit: u32,
        err: &RateLimitError,
    ) -> RateLimitResult {
        let now = self.clock.now();
        let mode = match self.failure_mode {
            FailureMode::FailOpen => "open",
            FailureMode::FailClosed => "closed",
        };
        counter!(
            "rate_limiter.store_failures",
            1,
            "operation" => policy.operation.clone(),
            "mode" => mode
        );

        match self.failure_mode {
            FailureMode::FailOpen => {
                warn!(key = %key, error = %err, "Counter store unavailable, allowing request");
                RateLimitResult {
                    allowed: true,
                    limit,
                    remaining: limit,
                    retry_after: None,
                    current_count: 0,
                    window_reset_at: add_duration(now, policy.window),
                    degraded: true,
                }
            }
            FailureMode::FailClosed => {
                warn!(key = %key, error = %err, "Counter store unavailable, refusing request");
                let result = RateLimitResult {
                    allowed: false,
                    limit,
                    remaining: 0,
                    retry_after: Some(FAIL_CLOSED_RETRY),
                    current_count: 0,
                    window_reset_at: add_duration(now, FAIL_CLOSED_RETRY),
                    degraded: true,
                };
                self.on_rejected(key, policy, &result);
                result
            }
        }
    }

    fn on_rejected(&self, key: &RateLimitKey, policy: &RateLimitPolicy, result: &RateLimitResult) {
        warn!(
            key = %key,
            limit = result.limit,
            current = result.current_count,
            retry_after_ms = result.retry_after.map(|d| d.as_millis() as u64),
            "Rate limit exceeded"
        );
        counter!(
            "rate_limiter.rejections",
            1,
            "operation" => policy.operation.clone(),
            "scope" => key.scope.as_str()
        );
        self.audit.emit(
            SecurityEvent::new("rate_limit.exceeded")
                .with("scope", key.scope)
                .with("identifier", &key.identifier)
                .with("operation", &key.operation)
                .with("policy", &policy.operation)
                .with("algorithm", policy.algorithm)
                .with("limit", result.limit)
                .with("current_count", result.current_count)
                .with("retry_after_secs", result.retry_after_secs())
                .with("degraded", result.degraded),
        );
    }
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_add_signed(by))
        .unwrap_or(at)
}

fn to_result(decision: Decision, limit: u32, now_ms: i64) -> RateLimitResult {
    RateLimitResult {
        allowed: decision.allowed,
        limit,
        remaining: decision.remaining.min(limit),
        retry_after: decision
            .retry_after_ms
            .map(|ms| Duration::from_millis(ms.max(1) as u64)),
        current_count: decision.current_count,
        window_reset_at: from_millis(decision.reset_at_ms.max(now_ms)),
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{PolicyException, RateLimitAlgorithm};
    use async_trait::async_trait;
    use shared_types_rs::{CacheError, InMemoryCacheStore, MemoryAuditSink};

    struct Fixture {
        limiter: RateLimiter,
        clock: Arc<ManualClock>,
        audit: MemoryAuditSink,
        store: InMemoryCacheStore,
    }

    fn fixture(algorithm: RateLimitAlgorithm, limit: u32) -> Fixture {
        let default_policy = RateLimitPolicy::new("*", limit, Duration::from_secs(60), algorithm)
            .with_exception(PolicyException::for_tier("pro", 2.0));
        let clock = Arc::new(ManualClock::new(from_millis(1_800_000_000_000)));
        let audit = MemoryAuditSink::new();
        let store = InMemoryCacheStore::new();
        let limiter = RateLimiter::new(Arc::new(PolicyEngine::new(default_policy)), Arc::new(store.clone()))
            .with_clock(clock.clone())
            .with_audit(Arc::new(audit.clone()));
        Fixture {
            limiter,
            clock,
            audit,
            store,
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set_with_expiry(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CacheStore for SlowStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn set_with_expiry(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_limit_enforced_with_retry_after() {
        let f = fixture(RateLimitAlgorithm::FixedWindow, 3);
        let key = RateLimitKey::user("alice", "search");
        let anyone = Principal::anonymous();

        for expected_remaining in [2, 1, 0] {
            let result = f.limiter.check_and_record(&key, &anyone).await;
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let refused = f.limiter.check_and_record(&key, &anyone).await;
        assert!(!refused.allowed);
        assert_eq!(refused.remaining, 0);
        assert_eq!(refused.current_count, 3);
        assert!(refused.retry_after.unwrap() > Duration::ZERO);
        assert!(refused.window_reset_at > f.clock.now());

        let events = f.audit.events_named("rate_limit.exceeded");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context["identifier"], "alice");
        assert_eq!(events[0].context["scope"], "user");
    }

    #[tokio::test]
    async fn test_every_algorithm_recovers_after_window() {
        for algorithm in [
            RateLimitAlgorithm::FixedWindow,
            RateLimitAlgorithm::SlidingWindow,
            RateLimitAlgorithm::TokenBucket,
            RateLimitAlgorithm::LeakyBucket,
        ] {
            let f = fixture(algorithm, 4);
            let key = RateLimitKey::ip("203.0.113.9", "upload");
            let anyone = Principal::anonymous();

            for _ in 0..4 {
                f.limiter.record(&key, &anyone).await.unwrap();
            }
            let refused = f.limiter.check(&key, &anyone).await;
            assert!(!refused.allowed, "{}", algorithm);
            assert!(refused.retry_after.unwrap() > Duration::ZERO, "{}", algorithm);

            f.clock.advance(Duration::from_secs(60));
            let result = f.limiter.check(&key, &anyone).await;
            assert!(result.allowed, "{}", algorithm);
        }
    }

    #[tokio::test]
    async fn test_check_does_not_record() {
        let f = fixture(RateLimitAlgorithm::SlidingWindow, 2);
        let key = RateLimitKey::ip("10.1.2.3", "login");
        for _ in 0..5 {
            assert!(f.limiter.check(&key, &Principal::anonymous()).await.allowed);
        }
        assert!(f.store.is_empty());

        f.limiter.record(&key, &Principal::anonymous()).await.unwrap();
        let status = f.limiter.get_status(&key, &Principal::anonymous()).await;
        assert_eq!(status.result.current_count, 1);
        assert_eq!(status.result.remaining, 1);
        assert_eq!(status.policy_operation, "*");
        assert_eq!(status.algorithm, RateLimitAlgorithm::SlidingWindow);
    }

    #[tokio::test]
    async fn test_window_rolls_over() {
        let f = fixture(RateLimitAlgorithm::SlidingWindow, 1);
        let key = RateLimitKey::api_key("k-1", "export");
        assert!(f.limiter.check_and_record(&key, &Principal::anonymous()).await.allowed);
        assert!(!f.limiter.check_and_record(&key, &Principal::anonymous()).await.allowed);

        f.clock.advance(Duration::from_secs(61));
        assert!(f.limiter.check_and_record(&key, &Principal::anonymous()).await.allowed);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let f = fixture(RateLimitAlgorithm::TokenBucket, 1);
        let anyone = Principal::anonymous();
        assert!(f.limiter.check_and_record(&RateLimitKey::user("a", "op"), &anyone).await.allowed);
        assert!(f.limiter.check_and_record(&RateLimitKey::user("b", "op"), &anyone).await.allowed);
        assert!(f.limiter.check_and_record(&RateLimitKey::user("a", "other"), &anyone).await.allowed);
        assert!(!f.limiter.check_and_record(&RateLimitKey::user("a", "op"), &anyone).await.allowed);
    }

    #[tokio::test]
    async fn test_license_tier_multiplier() {
        let f = fixture(RateLimitAlgorithm::LeakyBucket, 2);
        let key = RateLimitKey::tenant("acme", "ingest");
        let pro = Principal::anonymous().with_license_tier("pro");
        for _ in 0..4 {
            assert!(f.limiter.check_and_record(&key, &pro).await.allowed);
        }
        let refused = f.limiter.check_and_record(&key, &pro).await;
        assert!(!refused.allowed);
        assert_eq!(refused.limit, 4);
    }

    #[tokio::test]
    async fn test_reset_clears_counter() {
        let f = fixture(RateLimitAlgorithm::FixedWindow, 1);
        let key = RateLimitKey::user("bob", "search");
        f.limiter.check_and_record(&key, &Principal::anonymous()).await;
        assert!(!f.limiter.check(&key, &Principal::anonymous()).await.allowed);

        f.limiter.reset(&key).await.unwrap();
        assert!(f.limiter.check(&key, &Principal::anonymous()).await.allowed);
    }

    #[tokio::test]
    async fn test_fail_open_on_store_error() {
        let policies = Arc::new(PolicyEngine::new(RateLimitPolicy::new(
            "*",
            10,
            Duration::from_secs(60),
            RateLimitAlgorithm::SlidingWindow,
        )));
        let audit = MemoryAuditSink::new();
        let limiter = RateLimiter::new(policies, Arc::new(BrokenStore)).with_audit(Arc::new(audit.clone()));

        let result = limiter
            .check_and_record(&RateLimitKey::user("u", "op"), &Principal::anonymous())
            .await;
        assert!(result.allowed);
        assert!(result.degraded);
        assert_eq!(result.remaining, 10);
        assert!(audit.events().is_empty());
        assert!(limiter.reset(&RateLimitKey::user("u", "op")).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_closed_on_store_error() {
        let policies = Arc::new(PolicyEngine::new(RateLimitPolicy::new(
            "*",
            10,
            Duration::from_secs(60),
            RateLimitAlgorithm::FixedWindow,
        )));
        let audit = MemoryAuditSink::new();
        let limiter = RateLimiter::new(policies, Arc::new(BrokenStore))
            .with_failure_mode(FailureMode::FailClosed)
            .with_audit(Arc::new(audit.clone()));

        let result = limiter
            .check(&RateLimitKey::user("u", "op"), &Principal::anonymous())
            .await;
        assert!(!result.allowed);
        assert!(result.degraded);
        assert_eq!(result.retry_after, Some(Duration::from_secs(1)));
        assert_eq!(audit.events_named("rate_limit.exceeded").len(), 1);
    }

    #[tokio::test]
    async fn test_store_timeout_applies_failure_mode() {
        let policies = Arc::new(PolicyEngine::new(RateLimitPolicy::new(
            "*",
            10,
            Duration::from_secs(60),
            RateLimitAlgorithm::TokenBucket,
        )));
        let limiter = RateLimiter::new(policies, Arc::new(SlowStore))
            .with_store_timeout(Duration::from_millis(20))
            .with_failure_mode(FailureMode::FailClosed);

        let result = limiter
            .check(&RateLimitKey::global("search"), &Principal::anonymous())
            .await;
        assert!(!result.allowed);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_corrupt_state_restarts_counter() {
        let f = fixture(RateLimitAlgorithm::FixedWindow, 2);
        let key = RateLimitKey::user("carol", "search");
        f.store
            .set_with_expiry(&key.cache_key(), "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result = f.limiter.check_and_record(&key, &Principal::anonymous()).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }

    #[tokio::test]
    async fn test_from_settings() {
        let settings = RateLimitSettings {
            failure_mode: "closed".to_string(),
            store_timeout_ms: 25,
            ..RateLimitSettings::default()
        };
        let limiter = RateLimiter::from_settings(&settings, Arc::new(InMemoryCacheStore::new())).unwrap();
        assert_eq!(limiter.failure_mode(), FailureMode::FailClosed);
        assert_eq!(limiter.policies().resolve("anything").requests_per_window, 100);
    }
}
