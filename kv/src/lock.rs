//! Distributed locks built on atomic set-if-not-exists.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{KvError, KvResult};
use crate::store::SharedKvStore;

/// Poll interval while waiting for a held lock.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock factory over a shared store.
#[derive(Clone)]
pub struct DistributedLock {
    store: SharedKvStore,
    prefix: String,
}

impl DistributedLock {
    /// Create a lock factory; lock keys are stored under `lock:`.
    pub fn new(store: SharedKvStore) -> Self {
        Self::with_prefix(store, "lock")
    }

    /// Create a lock factory with a custom key prefix.
    pub fn with_prefix(store: SharedKvStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Try to take the lock once.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> KvResult<Option<LockGuard>> {
        let full_key = format!("{}:{}", self.prefix, key);
        let token = Uuid::now_v7().to_string();

        if self
            .store
            .set_nx(&full_key, token.clone(), Some(ttl))
            .await?
        {
            debug!(key = %full_key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
            Ok(Some(LockGuard {
                store: self.store.clone(),
                key: full_key,
                token,
                released: false,
            }))
        } else {
            debug!(key = %full_key, "Lock busy");
            Ok(None)
        }
    }

    /// Wait up to `wait` for the lock.
    pub async fn acquire(&self, key: &str, ttl: Duration, wait: Duration) -> KvResult<LockGuard> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(guard) = self.try_acquire(key, ttl).await? {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(KvError::LockHeld {
                    key: format!("{}:{}", self.prefix, key),
                });
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Whether someone currently holds the lock.
    pub async fn is_locked(&self, key: &str) -> KvResult<bool> {
        Ok(self
            .store
            .get(&format!("{}:{}", self.prefix, key))
            .await?
            .is_some())
    }
}

/// Held lock. Released explicitly, or on drop as a best effort.
pub struct LockGuard {
    store: SharedKvStore,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// Returns the full lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the owner token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lock if this guard still owns it.
    ///
    /// Fails with [`KvError::LockLost`] when the TTL ran out first; the
    /// current holder, if any, is left untouched.
    pub async fn release(mut self) -> KvResult<()> {
        self.released = true;
        if self.store.delete_if_eq(&self.key, &self.token).await? {
            debug!(key = %self.key, "Lock released");
            Ok(())
        } else {
            warn!(key = %self.key, "Lock expired before release");
            Err(KvError::LockLost {
                key: self.key.clone(),
            })
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(key = %self.key, "No runtime to release lock, leaving it to expire");
            return;
        };

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = store.delete_if_eq(&key, &token).await {
                warn!(key = %key, error = %e, "Failed to release dropped lock");
            }
        });
    }
}
