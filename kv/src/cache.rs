//! Typed JSON cache over a key-value store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{KvError, KvResult};
use crate::store::SharedKvStore;

/// Namespaced JSON view of a [`KvStore`](crate::KvStore).
#[derive(Clone)]
pub struct KvCache {
    store: SharedKvStore,
    namespace: String,
}

impl KvCache {
    /// Create a cache whose keys are prefixed with `namespace:`.
    pub fn new(store: SharedKvStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// A child cache under `namespace:sub`.
    pub fn scoped(&self, sub: &str) -> Self {
        Self::new(self.store.clone(), self.full_key(sub))
    }

    /// The underlying store.
    pub fn store(&self) -> &SharedKvStore {
        &self.store
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Read and decode a value.
    ///
    /// Values that no longer decode (e.g. written by an older schema) are
    /// dropped and reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        let full_key = self.full_key(key);
        let Some(raw) = self.store.get(&full_key).await? else {
            debug!(key = %full_key, "Cache miss");
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %full_key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Dropping undecodable cache entry");
                self.store.delete(&full_key).await?;
                Ok(None)
            }
        }
    }

    /// Encode and write a value.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> KvResult<()> {
        let full_key = self.full_key(key);
        let raw = Self::encode(&full_key, value)?;
        self.store.set(&full_key, raw, ttl).await
    }

    /// Encode and write a value only if the key is absent.
    pub async fn set_json_nx<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        let full_key = self.full_key(key);
        let raw = Self::encode(&full_key, value)?;
        self.store.set_nx(&full_key, raw, ttl).await
    }

    /// Remove a key.
    pub async fn delete(&self, key: &str) -> KvResult<bool> {
        self.store.delete(&self.full_key(key)).await
    }

    /// Keys under this namespace starting with `prefix`, namespace stripped.
    pub async fn keys(&self, prefix: &str) -> KvResult<Vec<String>> {
        let ns_prefix = self.full_key("");
        let keys = self.store.keys(&self.full_key(prefix)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&ns_prefix).map(str::to_string))
            .collect())
    }

    fn full_key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> KvResult<String> {
        serde_json::to_string(value).map_err(|source| KvError::Serialization {
            key: key.to_string(),
            source,
        })
    }
}
