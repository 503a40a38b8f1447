//! Cache configuration.
//!
//! [`CacheConfig`] is plain data: build it in code with the `with_*` methods or
//! deserialize it from JSON alongside the rest of the application settings.
//!
//! ```
//! use tenant_cache::config::CacheConfig;
//!
//! let config = CacheConfig::from_json(r#"{ "capacity": 64, "ttl_ms": 5000 }"#).unwrap();
//! assert_eq!(config.capacity, 64);
//! assert!(config.enabled);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum number of cached responses.
pub const DEFAULT_CAPACITY: usize = 500;

/// Default time-to-live for a cached response (30 seconds).
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Errors produced while loading or validating a [`CacheConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,

    #[error("ttl for {scope} must be greater than zero")]
    ZeroTtl { scope: String },

    #[error("invalid cache config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for the response cache and the request coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before least-recently-used eviction kicks in.
    pub capacity: usize,
    /// Default time-to-live in milliseconds.
    pub ttl_ms: u64,
    /// When `false`, every fetch goes straight to the executor.
    pub enabled: bool,
    /// Cache and deduplicate POST/PUT/PATCH/DELETE as well. Off by default.
    pub cache_unsafe_methods: bool,
    /// TTL overrides keyed by path prefix; the longest matching prefix wins.
    pub path_ttl_ms: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl_ms: DEFAULT_TTL_MS,
            enabled: true,
            cache_unsafe_methods: false,
            path_ttl_ms: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document and validates the result.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the cache relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.ttl_ms == 0 {
            return Err(ConfigError::ZeroTtl {
                scope: "default".to_owned(),
            });
        }
        if let Some((prefix, _)) = self.path_ttl_ms.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(ConfigError::ZeroTtl {
                scope: prefix.clone(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the default TTL. Sub-millisecond precision is truncated.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_unsafe_methods(mut self, cache_unsafe_methods: bool) -> Self {
        self.cache_unsafe_methods = cache_unsafe_methods;
        self
    }

    #[must_use]
    pub fn with_path_ttl(mut self, prefix: impl Into<String>, ttl: Duration) -> Self {
        self.path_ttl_ms.insert(prefix.into(), ttl.as_millis() as u64);
        self
    }

    /// Default TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Resolves the TTL for `path`: the longest matching prefix override, else the default.
    pub fn ttl_for(&self, path: &str) -> Duration {
        self.path_ttl_ms
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ttl)| Duration::from_millis(*ttl))
            .unwrap_or_else(|| self.ttl())
    }
}
