// shared-types-rs/src/registry.rs
// Read-mostly registry cache with replace-not-mutate semantics

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct RegistryEntry<V> {
    value: Arc<V>,
    expires_at: Option<Instant>,
}

/// Registry of shared values keyed by name.
///
/// Values are handed out as `Arc`s and never mutated in place: an update
/// swaps the whole entry, so a reader holding the old `Arc` keeps seeing a
/// complete old value. Entries inserted with [`TtlRegistry::insert`] expire
/// after the registry TTL; [`TtlRegistry::pin`] entries never expire.
#[derive(Debug)]
pub struct TtlRegistry<K, V> {
    entries: RwLock<HashMap<K, RegistryEntry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V> TtlRegistry<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        match entry.expires_at {
            Some(expires_at) if expires_at <= Instant::now() => None,
            _ => Some(Arc::clone(&entry.value)),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        self.store(key, Arc::new(value), Some(Instant::now() + self.ttl))
    }

    pub fn insert_arc(&self, key: K, value: Arc<V>) -> Arc<V> {
        self.store(key, value, Some(Instant::now() + self.ttl))
    }

    pub fn pin(&self, key: K, value: V) -> Arc<V> {
        self.store(key, Arc::new(value), None)
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .write()
            .ok()
            .and_then(|mut entries| entries.remove(key))
            .map(|entry| entry.value)
    }

    /// Keys of all live entries.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|(_, entry)| entry.expires_at.map_or(true, |at| at > now))
                .map(|(key, _)| key.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn store(&self, key: K, value: Arc<V>, expires_at: Option<Instant>) -> Arc<V> {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                RegistryEntry {
                    value: Arc::clone(&value),
                    expires_at,
                },
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_old_reader_value() {
        let registry: TtlRegistry<String, Vec<u32>> = TtlRegistry::new(Duration::from_secs(60));
        registry.insert("limits".to_string(), vec![1, 2, 3]);

        let old = registry.get(&"limits".to_string()).unwrap();
        registry.insert("limits".to_string(), vec![9]);

        assert_eq!(*old, vec![1, 2, 3]);
        assert_eq!(*registry.get(&"limits".to_string()).unwrap(), vec![9]);
    }

    #[test]
    fn test_expiry_and_pinning() {
        let registry: TtlRegistry<&str, u32> = TtlRegistry::new(Duration::from_millis(0));
        registry.insert("dynamic", 1);
        registry.pin("builtin", 2);

        assert!(registry.get(&"dynamic").is_none());
        assert_eq!(registry.get(&"builtin").map(|v| *v), Some(2));
        assert_eq!(registry.keys(), vec!["builtin"]);
    }
}
