//! Write-through existence and lookup caches.
//!
//! Lifecycle: constructed empty during assembly, filled once through
//! `warm_up` before any request is served, then grown only through `add`.
//! Nothing in the marketplace is hard-deleted, so entries are never removed
//! and a hit can always be trusted. A miss may be transient for a row whose
//! creating transaction has committed but not yet registered itself.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::observability::{CacheStats, CacheStatsSnapshot};

/// Set of ids known to exist in the backing store.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct ExistenceCache {
    ids: Arc<RwLock<HashSet<String>>>,
    stats: Arc<CacheStats>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warm_up<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut guard = self.ids.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(ids);
    }

    pub fn add(&self, id: impl Into<String>) {
        let mut guard = self.ids.write().unwrap_or_else(PoisonError::into_inner);
        if guard.insert(id.into()) {
            self.stats.record_addition();
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        let found = self
            .ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id);
        if found {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    pub fn len(&self) -> usize {
        self.ids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn log_stats(&self, cache: &str) {
        self.stats.log_stats(cache);
    }
}

/// Key to value mirror, used for username to user id resolution.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct LookupCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
    stats: Arc<CacheStats>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warm_up<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.extend(entries);
    }

    pub fn add(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.into(), value.into());
        self.stats.record_addition();
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn log_stats(&self, cache: &str) {
        self.stats.log_stats(cache);
    }
}

/// The process-wide caches, built first and handed to every store
#[derive(Debug, Clone, Default)]
pub struct Caches {
    pub tender_ids: ExistenceCache,
    pub bid_ids: ExistenceCache,
    pub user_ids: LookupCache,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_stats(&self) {
        self.tender_ids.log_stats("tender_ids");
        self.bid_ids.log_stats("bid_ids");
        self.user_ids.log_stats("user_ids");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existence_cache_add_and_exists() {
        let cache = ExistenceCache::new();
        assert!(!cache.exists("a"));

        cache.add("a");
        assert!(cache.exists("a"));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_existence_cache_clones_share_state() {
        let cache = ExistenceCache::new();
        let shared = cache.clone();
        shared.add("tender-1");
        assert!(cache.exists("tender-1"));
    }

    #[test]
    fn test_warm_up_loads_everything_once() {
        let cache = ExistenceCache::new();
        cache.warm_up(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(cache.len(), 2);
        assert!(cache.exists("b"));
    }

    #[test]
    fn test_lookup_cache_get() {
        let cache = LookupCache::new();
        cache.warm_up(vec![("alice".to_string(), "u-1".to_string())]);
        cache.add("bob", "u-2");

        assert_eq!(cache.get("alice").as_deref(), Some("u-1"));
        assert_eq!(cache.get("bob").as_deref(), Some("u-2"));
        assert_eq!(cache.get("carol"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_additions_are_all_visible() {
        let cache = ExistenceCache::new();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.add(format!("{n}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
