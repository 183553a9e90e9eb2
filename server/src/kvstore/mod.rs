//! Key/value storage used by the bulk job engine.
//!
//! - `KvStore`: the backing store capability (durable source of truth)
//! - `memory`: in-process backing store with per-key TTLs
//! - `cache`: expiring in-process cache with a background sweep
//! - `cached_store`: write-through cache in front of a backing store
//! - `lock`: fail-fast, TTL-bounded lock built on any `KvStore`

use crate::common::StoreError;
use async_trait::async_trait;

pub mod cache;
pub mod cached_store;
pub mod lock;
pub mod memory;

pub use cache::{CacheEntry, ExpiringCache};
pub use cached_store::CacheKeyStore;
pub use lock::{KvLockStore, LockStore, lock_key};
pub use memory::MemoryKvStore;

/// Options for a conditional or expiring write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Compare-and-set against `old_value` instead of a blind write.
    pub atomic: bool,
    /// Expected current value for an atomic write. `None` means the key must
    /// not exist yet.
    pub old_value: Option<Vec<u8>>,
    /// Expiry of the written value in the backing store. Zero keeps it forever.
    pub expire_in_seconds: u64,
}

impl SetOptions {
    /// Atomic "set if absent" with an expiry.
    pub fn create_only(expire_in_seconds: u64) -> Self {
        Self {
            atomic: true,
            old_value: None,
            expire_in_seconds,
        }
    }
}

/// Backing key/value store over opaque byte values.
///
/// Implementations are the durable source of truth for every layer above
/// them. They must distinguish a missing key ([`StoreError::NotFound`]) from
/// a failed operation ([`StoreError::Backend`]); the cache and the lock pass
/// either through unchanged.
///
/// # Operations
///
/// - [`load`](Self::load) / [`exists`](Self::exists) - reads, honoring expiry
/// - [`store`](Self::store) - blind write without expiry
/// - [`store_ttl`](Self::store_ttl) - blind write expiring after `ttl_seconds`
/// - [`store_with_options`](Self::store_with_options) - conditional and/or expiring write
/// - [`delete`](Self::delete) - removal, succeeding for absent keys
///
/// # Examples
///
/// ```no_run
/// use server::kvstore::{KvStore, MemoryKvStore, SetOptions};
///
/// async fn claim(store: &dyn KvStore) -> Result<bool, server::common::StoreError> {
///     // Only the first caller gets `true`, the key disappears after a minute
///     store
///         .store_with_options("claim_job-42", b"", SetOptions::create_only(60))
///         .await
/// }
///
/// # async fn run() {
/// let store = MemoryKvStore::new();
/// assert!(claim(&store).await.unwrap());
/// assert!(!claim(&store).await.unwrap());
/// # }
/// ```
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value, or [`StoreError::NotFound`] when the key is absent.
    async fn load(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn store_ttl(&self, key: &str, value: &[u8], ttl_seconds: u64)
    -> Result<(), StoreError>;

    /// Returns `Ok(false)` when an atomic write lost its comparison.
    async fn store_with_options(
        &self,
        key: &str,
        value: &[u8],
        opts: SetOptions,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}
