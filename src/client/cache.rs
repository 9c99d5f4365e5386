//! Time-limited cache for listing pages.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Thread-safe TTL cache. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct PageCache<K, V>
where
    K: Eq + Hash,
{
    ttl: Duration,
    entries: Arc<DashMap<K, (Instant, V)>>,
}

impl<K, V> PageCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Returns a fresh entry, dropping it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let fresh = self.entries.get(key).and_then(|entry| {
            let (stored_at, value) = entry.value();
            (now.saturating_duration_since(*stored_at) < self.ttl).then(|| value.clone())
        });
        if fresh.is_none() {
            self.entries.remove(key);
        }
        fresh
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Drops every entry.
    pub fn invalidate_all(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "Page cache cleared");
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire() {
        let cache = PageCache::new(Duration::from_secs(30));
        cache.insert("page-1", vec![1, 2, 3]);
        let now = Instant::now();
        assert_eq!(cache.get_at(&"page-1", now), Some(vec![1, 2, 3]));
        assert_eq!(cache.get_at(&"page-1", now + Duration::from_secs(31)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_clears_shared_clones() {
        let cache: PageCache<u32, &str> = PageCache::new(Duration::from_secs(30));
        let shared = cache.clone();
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(shared.len(), 2);
        shared.invalidate_all();
        assert!(cache.get(&1).is_none());
    }
}
