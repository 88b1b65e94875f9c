//! Shared building blocks for the input-security pipeline crates.
//!
//! Holds the collaborator interfaces every stage talks to (counter/cache
//! store, audit sink), the common threat severity scale, the read-mostly
//! registry cache used for policies and schemas, and the TOML configuration
//! loader.

pub mod audit;
pub mod cache;
pub mod config;
pub mod registry;
pub mod threat;

pub use audit::{AuditSink, MemoryAuditSink, NoopAuditSink, SecurityEvent, TracingAuditSink};
pub use cache::{CacheError, CacheStore, InMemoryCacheStore};
pub use config::{ConfigError, PipelineConfig};
pub use registry::TtlRegistry;
pub use threat::ThreatLevel;

pub type Result<T> = std::result::Result<T, CacheError>;
