use super::{CacheKeyStore, KvStore, SetOptions};
use crate::common::LockError;
use crate::config::EngineConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const LOCKED_VALUE: &[u8] = b"";

/// Backing-store key holding the lock for `key`.
pub fn lock_key(key: &str) -> String {
    format!("lock_{key}")
}

/// Non-blocking mutual exclusion keyed by resource id.
///
/// Acquisition never waits: a held lock is reported as
/// [`LockError::AlreadyLocked`] straight away.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn lock(&self, key: &str) -> Result<(), LockError>;

    /// Releasing a key that is not locked succeeds.
    async fn unlock(&self, key: &str) -> Result<(), LockError>;

    async fn is_locked(&self, key: &str) -> bool;
}

/// [`LockStore`] kept in a [`KvStore`].
///
/// A lock is the existence of `lock_<key>`, written with a TTL that is never
/// refreshed. If the holder dies before unlocking, the backing store expires
/// the key and the resource becomes available again.
///
/// # Acquisition
///
/// 1. A cheap `exists` check rejects held locks without writing.
/// 2. An atomic create-only write decides between racing callers; the loser
///    gets [`LockError::AlreadyLocked`] just like a late caller.
///
/// The backing store only knows whole seconds, so the TTL is rounded up and
/// is never shorter than one second.
///
/// # Examples
///
/// ```no_run
/// use server::config::EngineConfig;
/// use server::kvstore::{KvLockStore, LockStore, MemoryKvStore};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), server::common::LockError> {
/// let locks = KvLockStore::with_cache(Arc::new(MemoryKvStore::new()), &EngineConfig::default());
///
/// locks.lock("town-square").await?;
/// assert!(locks.lock("town-square").await.is_err());
///
/// locks.unlock("town-square").await?;
/// locks.unlock("town-square").await?; // no-op
/// # Ok(())
/// # }
/// ```
pub struct KvLockStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl KvLockStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Puts a [`CacheKeyStore`] in front of `backing` and locks through it.
    pub fn with_cache(backing: Arc<dyn KvStore>, config: &EngineConfig) -> Self {
        let cached = CacheKeyStore::new(
            backing,
            config.cache_ttl(),
            config.cache_sweep_interval(),
        );
        Self::new(Arc::new(cached), config.lock_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expiry handed to the backing store. Whole seconds, rounded up and never
    /// zero, since a zero expiry keeps the key forever.
    fn expire_in_seconds(&self) -> u64 {
        let secs = self.ttl.as_secs() + u64::from(self.ttl.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[async_trait]
impl LockStore for KvLockStore {
    async fn lock(&self, key: &str) -> Result<(), LockError> {
        let lock_key = lock_key(key);

        if self.store.exists(&lock_key).await? {
            return Err(LockError::AlreadyLocked {
                key: key.to_string(),
            });
        }

        // The existence check is only a fast path; the conditional write is
        // what decides between two racing holders.
        let acquired = self
            .store
            .store_with_options(
                &lock_key,
                LOCKED_VALUE,
                SetOptions::create_only(self.expire_in_seconds()),
            )
            .await?;

        if !acquired {
            log::warn!("lost lock race, key={key}");
            return Err(LockError::AlreadyLocked {
                key: key.to_string(),
            });
        }

        log::debug!(
            "lock acquired, key={key}, ttl_secs={}",
            self.expire_in_seconds()
        );
        Ok(())
    }

    async fn unlock(&self, key: &str) -> Result<(), LockError> {
        self.store.delete(&lock_key(key)).await?;
        log::debug!("lock released, key={key}");
        Ok(())
    }

    async fn is_locked(&self, key: &str) -> bool {
        match self.store.exists(&lock_key(key)).await {
            Ok(locked) => locked,
            Err(e) => {
                log::error!("error checking lock, key={key}, err={e}");
                false
            }
        }
    }
}
