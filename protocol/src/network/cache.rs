//! # Result Cache
//!
//! Bounded `ContentHash -> value` map consulted before any network call.
//! Entries are written by every successful resolution and by gossip
//! intake; nothing in this crate invalidates them. When full, the least
//! recently used entry is evicted.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::{Block, ContentHash, Header, Transaction};

pub struct ResultCache<V> {
    inner: Mutex<LruCache<ContentHash, V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a copy of the cached value and marks it recently used.
    pub fn get(&self, hash: &ContentHash) -> Option<V> {
        self.inner.lock().get(hash).cloned()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.inner.lock().contains(hash)
    }

    /// Inserts or refreshes an entry. Returns `true` if the hash was new.
    pub fn insert(&self, hash: ContentHash, value: V) -> bool {
        self.inner.lock().put(hash, value).is_none()
    }

    /// Evicts `hash`, returning the value it held.
    pub fn remove(&self, hash: &ContentHash) -> Option<V> {
        self.inner.lock().pop(hash)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

/// One cache per resolvable kind.
pub struct ResultCaches {
    pub blocks: ResultCache<Block>,
    pub headers: ResultCache<Header>,
    pub transactions: ResultCache<Transaction>,
}

impl ResultCaches {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: ResultCache::new(capacity),
            headers: ResultCache::new(capacity),
            transactions: ResultCache::new(capacity),
        }
    }
}
