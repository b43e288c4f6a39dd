#![forbid(unsafe_code)]

//! Bounded LRU of diff results.
//!
//! Entries are keyed by the content and identity hashes of both sides, the
//! strategy that produced them, and the dirty-state fingerprint. Identity
//! hashes cover generated keys too, so two trees that render the same but
//! carry different keys never share an entry.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use super::strategy::StrategyKind;
use crate::node::VNode;
use crate::patch::Patch;

/// Cache key for one diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    old: Option<(u64, u64)>,
    new: Option<(u64, u64)>,
    strategy: StrategyKind,
    dirty: u64,
}

fn side(node: Option<&VNode>) -> Option<(u64, u64)> {
    node.map(|n| (n.subtree_hash(), n.identity_hash()))
}

impl CacheKey {
    #[must_use]
    pub fn new(old: Option<&VNode>, new: Option<&VNode>, strategy: StrategyKind, dirty: u64) -> Self {
        Self {
            old: side(old),
            new: side(new),
            strategy,
            dirty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU of patch batches. A zero capacity disables caching.
pub struct DiffCache {
    entries: Option<Mutex<LruCache<CacheKey, Arc<[Patch]>>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for DiffCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffCache").field("stats", &self.stats()).finish()
    }
}

impl DiffCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<[Patch]>> {
        let found = self
            .entries
            .as_ref()
            .and_then(|entries| entries.lock().get(key).cloned());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: CacheKey, patches: Arc<[Patch]>) {
        if let Some(entries) = &self.entries {
            entries.lock().put(key, patches);
        }
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Arc<[Patch]> {
        (0..n).map(|i| Patch::move_node("k", i)).collect()
    }

    #[test]
    fn evicts_least_recent() {
        let cache = DiffCache::new(2);
        let a = VNode::new("a");
        let b = VNode::new("b");
        let c = VNode::new("c");
        let key = |n: &VNode| CacheKey::new(Some(n), None, StrategyKind::Keyed, 0);
        cache.insert(key(&a), batch(1));
        cache.insert(key(&b), batch(2));
        assert!(cache.get(&key(&a)).is_some());
        cache.insert(key(&c), batch(3));
        assert!(cache.get(&key(&b)).is_none());
        assert_eq!(cache.len(), 2);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn identity_separates_equal_content() {
        let plain = VNode::new("x");
        let keyed = VNode::new("x").with_key("x");
        assert_eq!(plain.subtree_hash(), keyed.subtree_hash());
        assert_ne!(
            CacheKey::new(Some(&plain), None, StrategyKind::Keyed, 0),
            CacheKey::new(Some(&keyed), None, StrategyKind::Keyed, 0)
        );
    }

    #[test]
    fn zero_capacity_disables() {
        let cache = DiffCache::new(0);
        let key = CacheKey::new(None, None, StrategyKind::Positional, 0);
        cache.insert(key, batch(1));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}
