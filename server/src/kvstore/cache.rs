use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A cached value and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process cache whose entries expire after a per-entry TTL.
///
/// Expired entries are never returned, even before the background sweep
/// has removed them. The sweep only runs when the cache is created inside a
/// tokio runtime; it stops on [`stop`](Self::stop) or when the cache is
/// dropped.
#[derive(Debug)]
pub struct ExpiringCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    sweeper: CancellationToken,
}

impl ExpiringCache {
    pub fn new(sweep_interval: Duration) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(sweep(entries.clone(), sweep_interval, sweeper.clone()));
            }
            Err(_) => {
                log::debug!("no tokio runtime, cache sweep disabled (expiry stays lazy)");
            }
        }

        Self { entries, sweeper }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries.get(key).is_some_and(|entry| !entry.is_expired())
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Removes every expired entry, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        purge(&self.entries).await
    }

    /// Number of entries held, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stops the background sweep. Lookups keep honoring expiry.
    pub fn stop(&self) {
        self.sweeper.cancel();
    }
}

impl Drop for ExpiringCache {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

async fn purge(entries: &RwLock<HashMap<String, CacheEntry>>) -> usize {
    let mut entries = entries.write().await;
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired());
    before - entries.len()
}

async fn sweep(
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = purge(&entries).await;
                if purged > 0 {
                    log::debug!("cache sweep purged {purged} expired entries");
                }
            }
            () = token.cancelled() => {
                log::debug!("cache sweep stopped");
                break;
            }
        }
    }
}
