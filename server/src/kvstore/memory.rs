use super::{KvStore, SetOptions};
use crate::common::StoreError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: &[u8], ttl_seconds: u64) -> Self {
        let expires_at =
            (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds));
        Self {
            value: value.to_vec(),
            expires_at,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, StoredValue>,
    failing: HashSet<String>,
}

impl Inner {
    fn check(&self, operation: &str, key: &str) -> Result<(), StoreError> {
        if self.failing.contains(operation) {
            return Err(StoreError::backend(operation, key, "injected failure"));
        }
        Ok(())
    }

    fn live(&mut self, key: &str) -> Option<&StoredValue> {
        if self.data.get(key).is_some_and(|v| !v.is_live()) {
            self.data.remove(key);
        }
        self.data.get(key)
    }
}

/// In-process backing store with real per-key expiry.
///
/// Expiry follows the tokio clock, so tests running with a paused clock can
/// advance past a TTL. Operations can be made to fail with [`fail_on`] to
/// exercise error propagation.
///
/// [`fail_on`]: MemoryKvStore::fail_on
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    inner: Mutex<Inner>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future call of `operation` ("load", "store", "store_ttl",
    /// "store_with_options", "delete", "exists") fail.
    pub async fn fail_on(&self, operation: &str) {
        self.inner.lock().await.failing.insert(operation.to_string());
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.failing.clear();
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.data.values().filter(|v| v.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check("load", key)?;
        inner
            .live(key)
            .map(|v| v.value.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.store_ttl(key, value, 0).await
    }

    async fn store_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let operation = if ttl_seconds > 0 { "store_ttl" } else { "store" };
        inner.check(operation, key)?;
        inner
            .data
            .insert(key.to_string(), StoredValue::new(value, ttl_seconds));
        Ok(())
    }

    async fn store_with_options(
        &self,
        key: &str,
        value: &[u8],
        opts: SetOptions,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check("store_with_options", key)?;

        if opts.atomic {
            let current = inner.live(key).map(|v| v.value.as_slice());
            if current != opts.old_value.as_deref() {
                log::debug!("atomic write lost comparison, key={key}");
                return Ok(false);
            }
        }

        inner.data.insert(
            key.to_string(),
            StoredValue::new(value, opts.expire_in_seconds),
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check("delete", key)?;
        inner.data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check("exists", key)?;
        Ok(inner.live(key).is_some())
    }
}
