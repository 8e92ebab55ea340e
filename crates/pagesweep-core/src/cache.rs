//! In-memory caches shared across sessions.
//!
//! `PageCache` keeps raw payloads per page; `CollectionCache` keeps finished
//! aggregations per collection. Both are unbounded for the process lifetime.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::record::{AggregationResult, CollectionKey, PageKey, RawPage};

/// Raw page payloads by (collection, page). Append-only: the first payload
/// stored for a key is kept and later puts for that key are ignored.
#[derive(Debug, Default)]
pub struct PageCache {
    pages: RwLock<HashMap<PageKey, RawPage>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PageKey) -> Option<RawPage> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a payload. Returns false if the key was already cached.
    pub fn put(&self, key: PageKey, payload: RawPage) -> bool {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        if pages.contains_key(&key) {
            return false;
        }
        pages.insert(key, payload);
        true
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Finished aggregations by collection key. Only complete results are stored.
#[derive(Debug, Default)]
pub struct CollectionCache {
    results: RwLock<HashMap<CollectionKey, AggregationResult>>,
}

impl CollectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CollectionKey) -> Option<AggregationResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Replace the entry for `result.key` wholesale. Partial results are
    /// rejected and leave any existing entry untouched.
    pub fn store(&self, result: AggregationResult) -> bool {
        self.store_while(result, || true).unwrap_or(false)
    }

    /// Like [`store`](Self::store), but `live` is checked while the write lock
    /// is held. Returns `None` without touching the cache if `live` is false,
    /// otherwise whether the result was stored.
    pub fn store_while<F>(&self, result: AggregationResult, live: F) -> Option<bool>
    where
        F: FnOnce() -> bool,
    {
        let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
        if !live() {
            return None;
        }
        if !result.is_complete() {
            return Some(false);
        }
        results.insert(result.key.clone(), result);
        Some(true)
    }

    /// Drop the entry for `key`, if any.
    pub fn invalidate(&self, key: &CollectionKey) -> Option<AggregationResult> {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn contains(&self, key: &CollectionKey) -> bool {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}
