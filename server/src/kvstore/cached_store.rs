use super::{ExpiringCache, KvStore, SetOptions};
use crate::common::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Write-through cache in front of a backing [`KvStore`].
///
/// The backing store stays the source of truth. The cache is only populated
/// by writes made through this store: a cache miss on [`load`] falls through
/// to the backing store and does not fill the cache. A value written to the
/// backing store by another process is therefore invisible to the cache
/// until a local write overwrites it.
///
/// [`load`]: KvStore::load
pub struct CacheKeyStore {
    backing: Arc<dyn KvStore>,
    cache: ExpiringCache,
    ttl: Duration,
}

impl CacheKeyStore {
    /// `ttl` is the cache lifetime of entries written with `store` and
    /// `store_with_options`; `store_ttl` uses its own TTL instead.
    pub fn new(backing: Arc<dyn KvStore>, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            backing,
            cache: ExpiringCache::new(sweep_interval),
            ttl,
        }
    }

    /// Cache-level lookup that never touches the backing store.
    pub async fn cached(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.get(key).await
    }

    pub fn stop(&self) {
        self.cache.stop();
    }
}

#[async_trait]
impl KvStore for CacheKeyStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if let Some(value) = self.cache.get(key).await {
            return Ok(value);
        }
        self.backing.load(key).await
    }

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.backing.store(key, value).await?;
        self.cache.set(key, value.to_vec(), self.ttl).await;
        Ok(())
    }

    async fn store_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        self.backing.store_ttl(key, value, ttl_seconds).await?;
        self.cache
            .set(key, value.to_vec(), Duration::from_secs(ttl_seconds))
            .await;
        Ok(())
    }

    async fn store_with_options(
        &self,
        key: &str,
        value: &[u8],
        opts: SetOptions,
    ) -> Result<bool, StoreError> {
        let written = self.backing.store_with_options(key, value, opts).await?;
        if written {
            self.cache.set(key, value.to_vec(), self.ttl).await;
        }
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        self.backing.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        if self.cache.contains(key).await {
            return Ok(true);
        }
        self.backing.exists(key).await
    }
}
