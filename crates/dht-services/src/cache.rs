//! Bounded value cache.
//!
//! Values are stored by content key, in memory, with a fixed capacity.
//! Unlike the teacher's own content-addressed chunk cache — which is
//! immutable, unbounded, and disk-backed on the assumption that a content
//! hash never needs evicting — a DHT node's value store is bounded and
//! must make room for newer keys once full. Recency of *access* (not just
//! insertion) is what decides what gets evicted.
//!
//! Keys are raw bytes, not `NodeId` — content keys come in three accepted
//! lengths (20, 32, or 64 bytes, one per common digest width) and that
//! validation is the dispatcher's job, not this cache's.

use lru::LruCache;
use std::num::NonZeroUsize;

/// An in-memory, fixed-capacity key→value store, evicting least-recently-used
/// entries once full.
pub struct ValueCache {
    inner: LruCache<Vec<u8>, Vec<u8>>,
}

impl ValueCache {
    /// Create a cache holding at most `capacity` entries. `capacity` of
    /// zero is rounded up to one, since `LruCache` has no zero-capacity
    /// mode.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Look up a value, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &[u8]) -> Option<&Vec<u8>> {
        self.inner.get(key)
    }

    /// Does the cache hold `key`? Does not affect recency.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.contains(key)
    }

    /// Insert or overwrite a value, marking it most-recently-used.
    /// Evicts the least-recently-used entry if the cache was already full.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.put(key, value);
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
