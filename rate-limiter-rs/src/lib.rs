//! # Rate Limiter
//!
//! Per-principal, per-operation request quotas. Counter state lives in a
//! [`shared_types_rs::CacheStore`] so every pipeline instance sharing the
//! store enforces the same quota.
//!
//! Four algorithms are available per policy: fixed window, sliding window,
//! token bucket and leaky bucket. Role and license-tier exceptions scale a
//! policy's limit. When the store fails or exceeds its time budget the
//! limiter applies its [`FailureMode`].

pub mod algorithms;
pub mod clock;
pub mod limiter;
pub mod policy;
pub mod types;

pub use algorithms::{CounterState, Decision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{RateLimiter, DEFAULT_STORE_TIMEOUT};
pub use policy::{PolicyEngine, DEFAULT_POLICY_TTL};
pub use types::{
    FailureMode, PolicyException, Principal, RateLimitAlgorithm, RateLimitError, RateLimitKey,
    RateLimitPolicy, RateLimitResult, RateLimitScope, RateLimitStatus,
};
