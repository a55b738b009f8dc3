//! Cache of resolved HTML documents

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct CacheInner {
    lru: LruCache<String, Arc<str>>,
    total_bytes: usize,
}

/// LRU cache of HTML documents bounded by entry count and total bytes.
///
/// Documents are shared as `Arc<str>` so a cache hit does not copy the markup.
pub struct DocumentCache {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl DocumentCache {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store a document, evicting least recently used entries until the byte
    /// budget holds. Documents larger than the whole budget are not stored.
    pub fn put(&self, key: String, html: Arc<str>) -> bool {
        let new_size = html.len();
        if new_size > self.max_bytes {
            tracing::debug!(key = %key, size = new_size, "document too large to cache");
            return false;
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.len());
        }

        while inner.total_bytes + new_size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len());
                }
                None => break,
            }
        }

        // Entry-count eviction happens inside `push`.
        if let Some((evicted_key, evicted)) = inner.lru.push(key.clone(), html) {
            if evicted_key != key {
                inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len());
            }
        }
        inner.total_bytes += new_size;
        true
    }

    /// Store a document under a fresh key and return the key, or `None` when
    /// the document exceeds the byte budget
    pub fn insert(&self, html: Arc<str>) -> Option<String> {
        let key = self.generate_unique_key();
        self.put(key.clone(), html).then_some(key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.inner.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<str>> {
        let mut inner = self.inner.lock();
        let removed = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(removed.len());
        Some(removed)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Generate a key not currently present in the cache
    pub fn generate_unique_key(&self) -> String {
        let inner = self.inner.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !inner.lru.contains(&key) {
                return key;
            }
        }
    }
}
