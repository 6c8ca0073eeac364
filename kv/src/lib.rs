//! TickerDeck KV
//!
//! Key-value storage with per-entry time-to-live, used as the shared cache
//! for prices, FX rates and the token universe, and as the coordination
//! point for short-lived distributed locks.
//!
//! # Features
//!
//! - `KvStore` trait with atomic set-if-not-exists and compare-and-delete
//! - In-memory backend with TTL eviction
//! - Typed JSON cache wrapper with key namespacing
//! - Owner-token distributed locks with TTL backstop
//!
//! # Example
//!
//! ```rust,ignore
//! use std::{sync::Arc, time::Duration};
//! use tickerdeck_kv::{DistributedLock, KvCache, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! let cache = KvCache::new(store.clone(), "prices");
//! cache.set_json("bitcoin", &price, Some(Duration::from_secs(300))).await?;
//!
//! let locks = DistributedLock::new(store);
//! if let Some(guard) = locks.try_acquire("trade:alice:k1", Duration::from_secs(10)).await? {
//!     // exclusive section
//!     guard.release().await?;
//! }
//! ```

pub mod store;
pub mod memory;
pub mod cache;
pub mod lock;
pub mod error;

pub use store::{KvStore, SharedKvStore};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use cache::KvCache;
pub use lock::{DistributedLock, LockGuard};
pub use error::{KvError, KvResult};
