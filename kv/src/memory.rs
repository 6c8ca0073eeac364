//! In-memory key-value store with TTL support.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::KvResult;
use crate::store::KvStore;

/// Stored value with optional expiry.
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }

    fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }
}

/// Configuration for the memory store.
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Soft bound. Reaching it triggers a pass over expired entries before
    /// insert; live entries (held locks, idempotency records) are never
    /// dropped, so the store can grow past it until their TTLs lapse.
    pub max_entries: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
        }
    }
}

/// Thread-safe in-memory store.
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    config: MemoryStoreConfig,
}

impl MemoryStore {
    /// Create a new store with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create a new store with custom configuration.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Number of entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired entries");
        }
        evicted
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let total = self.entries.len();
        let live = self.entries.iter().filter(|e| !e.is_expired()).count();

        StoreStats {
            total_entries: total,
            live_entries: live,
            expired_entries: total.saturating_sub(live),
        }
    }

    /// Run eviction forever at the given interval.
    pub async fn run_eviction_loop(&self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.evict_expired();
        }
    }

    fn make_room(&self) {
        if self.entries.len() < self.config.max_entries {
            return;
        }
        self.evict_expired();
        let entries = self.entries.len();
        if entries >= self.config.max_entries {
            warn!(
                entries,
                max_entries = self.config.max_entries,
                "Store over capacity with only live entries"
            );
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Only remove if still expired; a concurrent writer may have replaced it.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        debug!(key, "Entry expired");
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<()> {
        self.make_room();
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<bool> {
        self.make_room();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> KvResult<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.value == expected)
            .is_some())
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.remaining()))
    }

    async fn keys(&self, prefix: &str) -> KvResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired() && entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_entries: usize,
    pub live_entries: usize,
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set("a", "1".to_string(), None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(store.ttl("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_value_expires_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("a", "1".to_string(), Some(Duration::from_millis(50)))
            .await
            .unwrap();

        // Should be valid immediately
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.ttl("a").await.unwrap().unwrap() <= Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_nx_respects_live_entries() {
        let store = MemoryStore::new();

        assert!(store.set_nx("lock", "owner-a".to_string(), None).await.unwrap());
        assert!(!store.set_nx("lock", "owner-b".to_string(), None).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("owner-a"));
    }

    #[tokio::test]
    async fn test_set_nx_replaces_expired_entries() {
        let store = MemoryStore::new();
        store
            .set_nx("lock", "owner-a".to_string(), Some(Duration::from_millis(20)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.set_nx("lock", "owner-b".to_string(), None).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("owner-b"));
    }

    #[tokio::test]
    async fn test_set_nx_single_winner_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_nx("contended", format!("owner-{i}"), Some(Duration::from_secs(5)))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_delete_if_eq() {
        let store = MemoryStore::new();
        store.set("lock", "owner-a".to_string(), None).await.unwrap();

        assert!(!store.delete_if_eq("lock", "owner-b").await.unwrap());
        assert!(store.delete_if_eq("lock", "owner-a").await.unwrap());
        assert!(store.get("lock").await.unwrap().is_none());
        assert!(!store.delete("lock").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_by_prefix() {
        let store = MemoryStore::new();
        store.set("price:EUR:bitcoin", "1".into(), None).await.unwrap();
        store.set("price:EUR:ethereum", "2".into(), None).await.unwrap();
        store.set("fx:USD:EUR", "3".into(), None).await.unwrap();

        let keys = store.keys("price:").await.unwrap();
        assert_eq!(keys, vec!["price:EUR:bitcoin", "price:EUR:ethereum"]);
    }

    #[tokio::test]
    async fn test_eviction_when_full() {
        let store = MemoryStore::with_config(MemoryStoreConfig { max_entries: 2 });
        store
            .set("a", "1".into(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store
            .set("b", "2".into(), Some(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.stats().expired_entries, 2);

        store.set("c", "3".into(), None).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.live_entries, 1);
    }

    #[tokio::test]
    async fn test_live_entries_survive_over_capacity() {
        let store = MemoryStore::with_config(MemoryStoreConfig { max_entries: 2 });
        for key in ["idem:a", "idem:b", "idem:c"] {
            store
                .set(key, "{}".into(), Some(Duration::from_secs(60)))
                .await
                .unwrap();
        }

        assert_eq!(store.len(), 3);
        assert!(store.get("idem:a").await.unwrap().is_some());
        assert_eq!(store.stats().live_entries, 3);
    }
}
