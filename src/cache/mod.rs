//! Bounded and no-op decoded-value caches.
//!
//! A cache entry is either a decoded value or the MISSING sentinel recording that a lookup was
//! already attempted and came back empty. Distinguishing "never looked up" (no entry) from
//! "looked up and absent" (`CacheState::Missing`) is what lets a map facade skip a redundant
//! store read for keys it already knows don't exist.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// What a cache currently knows about a key.
#[derive(Debug, Clone)]
pub enum CacheState<V> {
    Value(V),
    Missing,
}

impl<V> CacheState<V> {
    pub fn into_value(self) -> Option<V> {
        match self {
            CacheState::Value(v) => Some(v),
            CacheState::Missing => None,
        }
    }
}

/// Selects a cache implementation at facade-construction time.
///
/// Two policies are considered "the same class" by the shared-resource registry's
/// configuration-conflict check regardless of `maxsize`: what matters there is whether a real
/// cache is present at all, not its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    NoOp,
    Lru(usize),
}

impl CachePolicy {
    /// The default policy used by the structured-codec facade.
    pub const LRU_128: CachePolicy = CachePolicy::Lru(128);

    pub(crate) fn same_class(&self, other: &CachePolicy) -> bool {
        matches!(
            (self, other),
            (CachePolicy::NoOp, CachePolicy::NoOp) | (CachePolicy::Lru(_), CachePolicy::Lru(_))
        )
    }

    pub(crate) fn is_no_op(&self) -> bool {
        matches!(self, CachePolicy::NoOp)
    }
}

/// Capability set every cache variant implements. Keys are the encoded key bytes, the canonical
/// identity shared with the lock pool and the store.
pub trait Cache<V> {
    fn get(&self, key: &[u8]) -> Option<CacheState<V>>;
    fn put_value(&self, key: &[u8], value: V);
    fn put_missing(&self, key: &[u8]);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&self);
    /// Keys this cache currently holds an entry for, value or MISSING. `clear()` on the owning
    /// map uses this to know which keys need re-marking as MISSING after the store is dropped.
    fn snapshot_keys(&self) -> Vec<Vec<u8>>;
    fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

/// Retains nothing. Paired with a no-op lock pool for facades that forgo coordination entirely.
#[derive(Debug, Default)]
pub struct NoOpCache;

impl NoOpCache {
    pub fn new() -> Self {
        Self
    }
}

impl<V> Cache<V> for NoOpCache {
    fn get(&self, _key: &[u8]) -> Option<CacheState<V>> {
        None
    }

    fn put_value(&self, _key: &[u8], _value: V) {}

    fn put_missing(&self, _key: &[u8]) {}

    fn len(&self) -> usize {
        0
    }

    fn clear(&self) {}

    fn snapshot_keys(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

/// Bounded LRU cache of decoded values and MISSING markers, evicting the least-recently-used
/// entry on insert once full.
pub struct LruValueCache<V> {
    inner: Mutex<LruCache<Vec<u8>, CacheState<V>>>,
}

impl<V> LruValueCache<V> {
    pub fn new(maxsize: usize) -> Self {
        let capacity = NonZeroUsize::new(maxsize).unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<V: Clone> Cache<V> for LruValueCache<V> {
    fn get(&self, key: &[u8]) -> Option<CacheState<V>> {
        self.inner.lock().get(key).cloned()
    }

    fn put_value(&self, key: &[u8], value: V) {
        self.inner.lock().put(key.to_vec(), CacheState::Value(value));
    }

    fn put_missing(&self, key: &[u8]) {
        self.inner.lock().put(key.to_vec(), CacheState::Missing);
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn clear(&self) {
        self.inner.lock().clear();
    }

    fn snapshot_keys(&self) -> Vec<Vec<u8>> {
        self.inner.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_cache_never_retains() {
        let cache = NoOpCache::new();
        Cache::<i32>::put_value(&cache, b"a", 1);
        assert_eq!(Cache::<i32>::len(&cache), 0);
        assert!(Cache::<i32>::get(&cache, b"a").is_none());
    }

    #[test]
    fn lru_cache_evicts_oldest() {
        let cache: LruValueCache<i32> = LruValueCache::new(2);
        cache.put_value(b"a", 1);
        cache.put_value(b"b", 2);
        cache.put_value(b"c", 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(b"a").is_none());
        assert!(matches!(cache.get(b"c"), Some(CacheState::Value(3))));
    }

    #[test]
    fn missing_sentinel_is_distinguishable_from_absence() {
        let cache: LruValueCache<i32> = LruValueCache::new(4);
        assert!(cache.get(b"a").is_none());
        cache.put_missing(b"a");
        assert!(matches!(cache.get(b"a"), Some(CacheState::Missing)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn same_class_ignores_maxsize() {
        assert!(CachePolicy::Lru(4).same_class(&CachePolicy::Lru(512)));
        assert!(!CachePolicy::Lru(4).same_class(&CachePolicy::NoOp));
    }
}
