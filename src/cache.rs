//! Bounded LRU cache with time-based expiry.
//!
//! Constructed once and passed by reference to its users; there is no
//! process-wide instance.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Thread-safe LRU cache whose entries expire after a fixed TTL.
pub struct TtlLruCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlLruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Fresh value for `key`, promoting it to most recently used.
    /// Expired entries are evicted on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock();
        let expired = match cache.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Store a value, evicting the least recently used entry when full.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().put(key, (Instant::now(), value));
    }

    /// Cached value or the result of `load`, which is then cached.
    pub fn get_or_insert_with(&self, key: K, load: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = load();
        self.insert(key, value.clone());
        value
    }

    /// Number of entries, including any not yet evicted after expiry.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = TtlLruCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = TtlLruCache::new(4, Duration::from_millis(0));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_or_insert_with_loads_once() {
        let cache = TtlLruCache::new(4, Duration::from_secs(60));
        let mut loads = 0;
        let first = cache.get_or_insert_with("k", || {
            loads += 1;
            10
        });
        let second = cache.get_or_insert_with("k", || {
            loads += 1;
            20
        });
        assert_eq!((first, second, loads), (10, 10, 1));
    }
}
