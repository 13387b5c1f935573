//! Bounded cache of tagging results with absolute TTL, backed by moka.
//!
//! Keys carry the snapshot version, so a reload makes older entries
//! unreachable even before the wholesale `clear()`.

use moka::notification::RemovalCause;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub version: u64,
    digest: [u8; 32],
}

impl CacheKey {
    /// Digest of the request parts; raw text is not kept in the cache.
    pub fn new(version: u64, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self { version, digest }
    }
}

/// Shared, internally synchronized result cache. `None` inner cache means
/// caching is disabled (capacity 0).
pub struct ResultCache<V> {
    inner: Option<Cache<CacheKey, V>>,
    capacity: usize,
    expired: Arc<AtomicU64>,
}

impl<V: Clone + Send + Sync + 'static> ResultCache<V> {
    /// `capacity == 0` disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let expired = Arc::new(AtomicU64::new(0));
        let inner = (capacity > 0).then(|| {
            let counter = Arc::clone(&expired);
            Cache::builder()
                .max_capacity(capacity as u64)
                .time_to_live(ttl)
                .eviction_listener(move |_key, _value, cause| {
                    if cause == RemovalCause::Expired {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .build()
        });
        Self {
            inner,
            capacity,
            expired,
        }
    }

    /// Live entries after applying pending evictions.
    pub fn len(&self) -> usize {
        match &self.inner {
            Some(c) => {
                c.run_pending_tasks();
                c.entry_count() as usize
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped for exceeding the TTL so far.
    pub fn expired_total(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Fresh value for `key`; expired entries are never returned.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.inner.as_ref().and_then(|c| c.get(key))
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        if let Some(c) = &self.inner {
            c.insert(key, value);
        }
    }

    pub fn clear(&self) {
        if let Some(c) = &self.inner {
            c.invalidate_all();
            c.run_pending_tasks();
        }
    }

    /// Apply pending maintenance; returns how many entries expired during it.
    pub fn prune(&self) -> usize {
        let Some(c) = &self.inner else {
            return 0;
        };
        let before = self.expired_total();
        c.run_pending_tasks();
        self.expired_total().saturating_sub(before) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(v: u64, s: &str) -> CacheKey {
        CacheKey::new(v, &["meeting", s])
    }

    #[test]
    fn stores_and_returns_values() {
        let c = ResultCache::new(4, DEFAULT_TTL);
        c.insert(key(1, "a"), 1);
        assert_eq!(c.get(&key(1, "a")), Some(1));
        assert_eq!(c.get(&key(1, "b")), None);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn stays_within_capacity() {
        let c = ResultCache::new(8, DEFAULT_TTL);
        for i in 0..100 {
            c.insert(key(1, &i.to_string()), i);
        }
        assert!(c.len() <= 8, "len {}", c.len());
    }

    #[test]
    fn version_is_part_of_the_key() {
        let c = ResultCache::new(4, DEFAULT_TTL);
        c.insert(key(1, "a"), 1);
        assert_eq!(c.get(&key(2, "a")), None);
    }

    #[test]
    fn parts_are_length_delimited() {
        assert_ne!(
            CacheKey::new(1, &["ab", "c"]),
            CacheKey::new(1, &["a", "bc"])
        );
    }

    #[test]
    fn ttl_applies_on_read_and_prune() {
        let c = ResultCache::new(4, Duration::from_millis(50));
        c.insert(key(1, "a"), 1);
        c.insert(key(1, "b"), 2);
        assert_eq!(c.len(), 2);
        thread::sleep(Duration::from_millis(150));
        assert_eq!(c.get(&key(1, "a")), None);
        assert_eq!(c.prune(), 2);
        assert_eq!(c.expired_total(), 2);
        assert!(c.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let c = ResultCache::new(4, DEFAULT_TTL);
        c.insert(key(1, "a"), 1);
        c.insert(key(1, "b"), 2);
        c.clear();
        assert_eq!(c.get(&key(1, "a")), None);
        assert!(c.is_empty());
    }

    #[test]
    fn zero_capacity_disables() {
        let c = ResultCache::new(0, DEFAULT_TTL);
        c.insert(key(1, "a"), 1);
        assert_eq!(c.get(&key(1, "a")), None);
        assert!(c.is_empty());
        assert_eq!(c.prune(), 0);
    }
}
