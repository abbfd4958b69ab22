//! Bounded least-recently-used store of completed results.
//!
//! Keys are `(normalized text, resolved source)`. All bookkeeping happens
//! behind one internal lock so concurrent chain walks never need external
//! synchronization.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::MIN_CACHE_SIZE;
use crate::request::{SourceId, TranslationResult};

/// Trim, collapse inner whitespace and case-fold.
pub fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub text: String,
    pub source: SourceId,
}

impl CacheKey {
    pub fn new(raw_text: &str, source: SourceId) -> Self {
        Self {
            text: normalize_key(raw_text),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct ResultCache {
    entries: Mutex<LruCache<CacheKey, TranslationResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn capacity_or_minimum(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity)
        .or_else(|| NonZeroUsize::new(MIN_CACHE_SIZE))
        .unwrap_or(NonZeroUsize::MIN)
}

impl ResultCache {
    /// A zero capacity falls back to the safe minimum.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity_or_minimum(capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a copy flagged `cached = true` and refreshes recency.
    pub fn get(&self, key: &CacheKey) -> Option<TranslationResult> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let mut hit = result.clone();
                hit.cached = true;
                Some(hit)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Probe `(text, source)` for each source in order; first hit wins.
    /// Counts as a single hit or miss.
    pub fn get_any(&self, raw_text: &str, sources: &[SourceId]) -> Option<TranslationResult> {
        let text = normalize_key(raw_text);
        let mut entries = self.entries.lock();
        for &source in sources {
            let key = CacheKey {
                text: text.clone(),
                source,
            };
            if let Some(result) = entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let mut hit = result.clone();
                hit.cached = true;
                return Some(hit);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or overwrites; evicts the least recently used entry when full.
    pub fn put(&self, key: CacheKey, mut result: TranslationResult) {
        result.cached = false;
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), result) {
            if evicted != key {
                debug!("Evicted cache entry '{}' ({})", evicted.text, evicted.source);
            }
        }
    }

    /// Shrinking evicts oldest entries immediately; growing only raises the bound.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity_or_minimum(capacity);
        let mut entries = self.entries.lock();
        if entries.cap() != capacity {
            debug!("Resizing result cache {} -> {}", entries.cap(), capacity);
            entries.resize(capacity);
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            len: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
