//! Time-bounded fallback cache
//!
//! Stores the last successful payload per key with its insertion time.
//! Reads are TTL-checked: a stale entry is treated as absent and evicted
//! on the spot. There is no background eviction thread — expiry is lazy,
//! checked only when a key is read.
//!
//! The cache is a fallback source, not a read-through cache: callers
//! consult it after a live call has already failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// TTL-bounded map of last known good values.
#[derive(Debug)]
pub struct FallbackCache<V> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
}

impl<V> Clone for FallbackCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for FallbackCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FallbackCache<V> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of entries currently stored, including not-yet-evicted
    /// stale ones
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop all entries
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl<V: Clone> FallbackCache<V> {
    /// Store `value` for `key`, stamped with the current time.
    ///
    /// Overwrites any previous entry for the key.
    pub async fn insert(&self, key: &str, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Return the value for `key` if it is no older than `ttl`.
    ///
    /// A stale entry is evicted and `None` is returned, as if it had
    /// never been stored.
    pub async fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Age of the entry for `key`, if present
    pub async fn age(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().await;
        entries.get(key).map(|e| e.stored_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const TTL: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn fresh_entry_is_returned() {
        let cache = FallbackCache::new();
        cache.insert("k", 42u32).await;

        assert_eq!(cache.get("k", TTL).await, Some(42));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        let cache: FallbackCache<u32> = FallbackCache::new();
        assert_eq!(cache.get("nope", TTL).await, None);
    }

    #[tokio::test]
    async fn stale_entry_is_evicted_on_read() {
        let cache = FallbackCache::new();
        cache.insert("k", 42u32).await;

        sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get("k", TTL).await, None);
        // The read evicted it
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn insert_overwrites_not_accumulates() {
        let cache = FallbackCache::new();
        cache.insert("k", 1u32).await;
        cache.insert("k", 2u32).await;
        cache.insert("k", 3u32).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("k", TTL).await, Some(3));
    }

    #[tokio::test]
    async fn overwrite_refreshes_insertion_time() {
        let cache = FallbackCache::new();
        cache.insert("k", 1u32).await;
        sleep(Duration::from_millis(40)).await;
        cache.insert("k", 2u32).await;
        sleep(Duration::from_millis(30)).await;

        // 70ms since the first insert, 30ms since the overwrite
        assert_eq!(cache.get("k", TTL).await, Some(2));
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = FallbackCache::new();
        cache.insert("a", 1u32).await;
        cache.insert("b", 2u32).await;

        cache.clear().await;

        assert!(cache.is_empty().await);
        assert_eq!(cache.get("a", TTL).await, None);
    }
}
