//! Key-value store trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::KvResult;

/// A string key-value store with per-entry expiry.
///
/// Expired entries behave exactly like absent ones for every operation.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the backend name.
    fn name(&self) -> &str;

    /// Get a live value.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a value, replacing any previous one. `None` means no expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<()>;

    /// Write a value only if the key is absent. Returns whether it was written.
    async fn set_nx(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<bool>;

    /// Remove a key. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Remove a key only if it currently holds `expected`.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> KvResult<bool>;

    /// Remaining lifetime of a live key that has an expiry.
    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>>;

    /// Live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> KvResult<Vec<String>>;
}

/// Shared store handle.
pub type SharedKvStore = Arc<dyn KvStore>;
