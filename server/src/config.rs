//! Engine configuration.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Configuration problems found by [`EngineConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Tunables for the lock, the cache and payload handling.
///
/// Every field is optional; getters fall back to the defaults below so a
/// partial `[engine]` section (or none at all) still yields a working
/// engine.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct EngineConfig {
    /// Lifetime of a resource lock in seconds (default: 1800)
    lock_ttl_secs: Option<u64>,
    /// Cache lifetime of values written without an explicit TTL (default: 30)
    cache_ttl_secs: Option<u64>,
    /// Interval of the cache expiry sweep in seconds (default: 5)
    cache_sweep_interval_secs: Option<u64>,
    /// Maximum size of a submitted users file in KB (default: 256)
    max_payload_kb: Option<u64>,
    /// Upper bound of jobs running at once across resources (default: unbounded)
    max_concurrent_jobs: Option<usize>,
}

impl EngineConfig {
    pub fn new(lock_ttl_secs: u64, cache_ttl_secs: u64) -> Self {
        Self {
            lock_ttl_secs: Some(lock_ttl_secs),
            cache_ttl_secs: Some(cache_ttl_secs),
            ..Self::default()
        }
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = Some(max);
        self
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs.unwrap_or(1800))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(30))
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.unwrap_or(5))
    }

    pub fn max_payload_kb(&self) -> u64 {
        self.max_payload_kb.unwrap_or(256)
    }

    pub fn max_concurrent_jobs(&self) -> Option<usize> {
        self.max_concurrent_jobs
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("lock_ttl_secs", self.lock_ttl().is_zero()),
            ("cache_ttl_secs", self.cache_ttl().is_zero()),
            ("cache_sweep_interval_secs", self.cache_sweep_interval().is_zero()),
            ("max_payload_kb", self.max_payload_kb() == 0),
            ("max_concurrent_jobs", self.max_concurrent_jobs == Some(0)),
        ];

        match checks.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Zero { field }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.lock_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.max_payload_kb(), 256);
        assert_eq!(config.max_concurrent_jobs(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"lock_ttl_secs": 60, "max_payload_kb": 512}"#).unwrap();

        assert_eq!(config.lock_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.max_payload_kb(), 512);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = EngineConfig::new(0, 30);

        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "lock_ttl_secs"
            })
        );
    }
}
