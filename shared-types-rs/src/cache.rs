// shared-types-rs/src/cache.rs
// Counter/cache store interface and the in-process implementation

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid cache entry for key {key}: {reason}")]
    InvalidEntry { key: String, reason: String },
}

/// Key/value store with per-entry expiry.
///
/// Rate-limit counters and registry entries live here; implementations may
/// be a distributed cache shared by every pipeline instance.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone, Debug)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

/// Single-process store backed by a `DashMap`; expired entries are evicted
/// lazily on read and by [`InMemoryCacheStore::purge_expired`].
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose expiry has passed, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        purged
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let hit = self.entries.get(key).map(|entry| entry.clone());
        match hit {
            Some(entry) if entry.expires_at > Instant::now() => {
                trace!(key, "Cache hit");
                Ok(Some(entry.value))
            }
            Some(_) => {
                self.entries.remove(key);
                trace!(key, "Cache entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryCacheStore::new();
        store
            .set_with_expiry("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_returned() {
        let store = InMemoryCacheStore::new();
        store
            .set_with_expiry("k", "v".to_string(), Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let store = InMemoryCacheStore::new();
        store
            .set_with_expiry("a", "1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_with_expiry("b", "2".to_string(), Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(store.purge_expired(), 1);
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }
}
