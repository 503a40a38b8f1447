//! Bounded, TTL-aware response store.
//!
//! [`ResponseCache`] maps [`CacheKey`]s to completed responses. It is a plain
//! synchronous structure: every operation takes the internal lock, does its
//! work and releases it, so no caller can observe a half-applied `put` or a
//! partially cleared cache.
//!
//! ## Lifecycle of an entry
//!
//! ```text
//! put ──► CACHED ──┬── ttl elapsed (purged lazily on get) ──► ABSENT
//!                  ├── invalidate(key)                    ──► ABSENT
//!                  ├── LRU eviction on overflow           ──► ABSENT
//!                  └── tenant switch (invalidate_all)     ──► ABSENT
//! ```
//!
//! Entries are replace-only; a second `put` for the same key overwrites the
//! previous entry and restarts its TTL.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::key::CacheKey;

/// A stored response together with its freshness information.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// An entry is expired once `now - stored_at` reaches the TTL; the boundary
    /// itself already counts as expired.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet purged.
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for a new key.
    pub evictions: u64,
    /// Expired entries purged on access.
    pub expirations: u64,
    /// Entries removed by the most recent tenant-switch clear.
    pub last_cleared: usize,
    /// Running total of entries removed by tenant-switch clears.
    pub total_cleared: u64,
}

struct Store<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    last_cleared: usize,
    total_cleared: u64,
}

/// A bounded key → response map with per-entry TTL and LRU eviction.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tenant_cache::cache::ResponseCache;
/// use tenant_cache::http::Method;
/// use tenant_cache::key::{CacheKey, QueryParams};
///
/// let cache = ResponseCache::new(2);
/// let key = CacheKey::derive("r-1", &Method::Get, "/menu", &QueryParams::new());
///
/// cache.put(key.clone(), "menu", Duration::from_secs(60));
/// assert_eq!(cache.get(&key), Some("menu"));
/// assert_eq!(cache.stats().hits, 1);
/// ```
pub struct ResponseCache<V> {
    store: Mutex<Store<V>>,
    capacity: NonZeroUsize,
}

impl<V: Clone> ResponseCache<V> {
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one; [`crate::config::CacheConfig::validate`]
    /// rejects it earlier for configured caches.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(Store {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
                last_cleared: 0,
                total_cleared: 0,
            }),
            capacity,
        }
    }

    /// Returns the cached value for `key`, or `None` if absent or expired.
    ///
    /// A hit marks the entry as most recently used. An expired entry is removed
    /// on the spot and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.store.lock();
        let store = &mut *guard;

        match store.entries.peek(key).map(|entry| entry.is_expired_at(now)) {
            None => {
                store.misses += 1;
                trace!(%key, "cache miss");
                None
            }
            Some(true) => {
                store.entries.pop(key);
                store.expirations += 1;
                store.misses += 1;
                debug!(%key, "cache entry expired");
                None
            }
            Some(false) => {
                store.hits += 1;
                trace!(%key, "cache hit");
                store.entries.get(key).map(|entry| entry.value.clone())
            }
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// When the cache is full and `key` is new, the least recently used entry
    /// is evicted.
    pub fn put(&self, key: CacheKey, value: V, ttl: Duration) {
        let mut guard = self.store.lock();
        let store = &mut *guard;

        if let Some((evicted, _)) = store.entries.push(key.clone(), CacheEntry::new(value, ttl)) {
            if evicted != key {
                store.evictions += 1;
                debug!(evicted = %evicted, inserted = %key, "evicted least recently used entry");
            }
        }
    }

    /// Removes one entry. Returns `true` if something was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store.lock().entries.pop(key).is_some()
    }

    /// Removes every entry in one critical section and returns how many were dropped.
    ///
    /// Only the request coordinator's tenant-switch path calls this.
    pub(crate) fn invalidate_all(&self) -> usize {
        let mut guard = self.store.lock();
        let store = &mut *guard;

        let cleared = store.entries.len();
        store.entries.clear();
        store.last_cleared = cleared;
        store.total_cleared += cleared as u64;
        cleared
    }

    /// Reads the counters without touching recency or purging anything.
    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        CacheStats {
            size: store.entries.len(),
            capacity: self.capacity.get(),
            hits: store.hits,
            misses: store.misses,
            evictions: store.evictions,
            expirations: store.expirations,
            last_cleared: store.last_cleared,
            total_cleared: store.total_cleared,
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::key::QueryParams;

    const MINUTE: Duration = Duration::from_secs(60);

    fn key(path: &str) -> CacheKey {
        CacheKey::derive("r-1", &Method::Get, path, &QueryParams::new())
    }

    #[test]
    fn put_then_get_returns_value() {
        let cache = ResponseCache::new(4);
        cache.put(key("/orders"), 7, MINUTE);
        assert_eq!(cache.get(&key("/orders")), Some(7));
        assert_eq!(cache.get(&key("/missing")), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let cache = ResponseCache::new(4);
        cache.put(key("/orders"), "old", MINUTE);
        cache.put(key("/orders"), "new", MINUTE);
        assert_eq!(cache.get(&key("/orders")), Some("new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_at_ttl_boundary() {
        let cache = ResponseCache::new(4);
        cache.put(key("/orders"), 1, Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(99)).await;
        assert_eq!(cache.get(&key("/orders")), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&key("/orders")), None);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0, "expired entry is purged on access");
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let cache = ResponseCache::new(3);
        cache.put(key("/a"), 'a', MINUTE);
        cache.put(key("/b"), 'b', MINUTE);
        cache.put(key("/c"), 'c', MINUTE);

        // touch /a so /b becomes the least recently used
        assert_eq!(cache.get(&key("/a")), Some('a'));
        cache.put(key("/d"), 'd', MINUTE);

        assert_eq!(cache.get(&key("/b")), None);
        assert_eq!(cache.get(&key("/a")), Some('a'));
        assert_eq!(cache.get(&key("/c")), Some('c'));
        assert_eq!(cache.get(&key("/d")), Some('d'));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn invalidate_single_entry() {
        let cache = ResponseCache::new(4);
        cache.put(key("/a"), 1, MINUTE);
        assert!(cache.invalidate(&key("/a")));
        assert!(!cache.invalidate(&key("/a")));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_reports_cleared_count() {
        let cache = ResponseCache::new(8);
        for path in ["/a", "/b", "/c"] {
            cache.put(key(path), 0, MINUTE);
        }
        assert_eq!(cache.invalidate_all(), 3);
        cache.put(key("/d"), 0, MINUTE);
        assert_eq!(cache.invalidate_all(), 1);

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.last_cleared, 1);
        assert_eq!(stats.total_cleared, 4);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let cache = ResponseCache::new(0);
        cache.put(key("/a"), 1, MINUTE);
        cache.put(key("/b"), 2, MINUTE);
        assert_eq!(cache.stats().capacity, 1);
        assert_eq!(cache.get(&key("/b")), Some(2));
    }
}
