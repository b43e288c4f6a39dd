#![forbid(unsafe_code)]

//! Diffing engine.
//!
//! [`DiffingEngine`] fronts the reconciler with strategy selection, a
//! result cache and a buffer pool.
//!
//! # Strategy selection
//!
//! 1. More than `incremental_threshold` nodes, and (when a dirty state is
//!    known) at most `max_dirty_ratio` of them dirty: [`IncrementalDiff`].
//! 2. Any stably keyed child on either root: [`KeyedDiff`].
//! 3. Otherwise [`PositionalDiff`].
//!
//! Keyed and positional strategies diff nested lists the same way (keyed
//! matching wherever keys exist); the choice mainly decides how the top
//! level is matched and which cache slot the result lands in.
//!
//! # Caching
//!
//! Results are shared as `Arc<[Patch]>`. Diffing the same pair again returns
//! the same allocation. Batches longer than `max_cached_patches` are
//! returned but not cached.

pub mod cache;
pub mod strategy;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::VdomConfig;
use crate::error::Result;
use crate::node::VNode;
use crate::patch::Patch;
use crate::pool::PatchPool;
use crate::reconciler::DirtyState;
use crate::tree::VTree;

pub use cache::{CacheKey, CacheStats, DiffCache};
pub use strategy::{DiffStrategy, IncrementalDiff, KeyedDiff, PositionalDiff, StrategyKind};

/// Engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub diffs: u64,
    pub identical: u64,
    pub positional: u64,
    pub keyed: u64,
    pub incremental: u64,
    pub cache: CacheStats,
}

#[derive(Default)]
struct Counters {
    diffs: AtomicU64,
    identical: AtomicU64,
    per_strategy: [AtomicU64; 3],
}

/// Strategy-selecting, caching differ.
pub struct DiffingEngine {
    config: VdomConfig,
    cache: DiffCache,
    pool: PatchPool,
    positional: PositionalDiff,
    keyed: KeyedDiff,
    incremental: IncrementalDiff,
    counters: Counters,
}

impl Default for DiffingEngine {
    fn default() -> Self {
        Self::new(VdomConfig::default())
    }
}

impl std::fmt::Debug for DiffingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffingEngine")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn slot(kind: StrategyKind) -> usize {
    match kind {
        StrategyKind::Positional => 0,
        StrategyKind::Keyed => 1,
        StrategyKind::Incremental => 2,
    }
}

impl DiffingEngine {
    #[must_use]
    pub fn new(config: VdomConfig) -> Self {
        Self {
            cache: DiffCache::new(config.cache_capacity),
            pool: PatchPool::new(config.pool),
            positional: PositionalDiff,
            keyed: KeyedDiff,
            incremental: IncrementalDiff,
            counters: Counters::default(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &VdomConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &PatchPool {
        &self.pool
    }

    /// Pick a strategy for this pair.
    #[must_use]
    pub fn select_strategy(
        &self,
        old: Option<&VNode>,
        new: Option<&VNode>,
        dirty: Option<&DirtyState>,
    ) -> StrategyKind {
        let nodes = old
            .map_or(0, VNode::node_count)
            .max(new.map_or(0, VNode::node_count));
        if nodes > self.config.incremental_threshold {
            let sparse = dirty.is_none_or(|d| {
                d.dirty.len() as f64 / nodes as f64 <= self.config.max_dirty_ratio
            });
            if sparse {
                return StrategyKind::Incremental;
            }
        }
        let keyed = old.is_some_and(VNode::has_keyed_children)
            || new.is_some_and(VNode::has_keyed_children);
        if keyed {
            StrategyKind::Keyed
        } else {
            StrategyKind::Positional
        }
    }

    fn strategy(&self, kind: StrategyKind) -> &dyn DiffStrategy {
        match kind {
            StrategyKind::Positional => &self.positional,
            StrategyKind::Keyed => &self.keyed,
            StrategyKind::Incremental => &self.incremental,
        }
    }

    pub fn diff(&self, old: Option<&VNode>, new: Option<&VNode>) -> Result<Arc<[Patch]>> {
        self.diff_with_dirty(old, new, None)
    }

    /// Diff with an optional dirty state from the old tree.
    pub fn diff_with_dirty(
        &self,
        old: Option<&VNode>,
        new: Option<&VNode>,
        dirty: Option<&DirtyState>,
    ) -> Result<Arc<[Patch]>> {
        self.counters.diffs.fetch_add(1, Ordering::Relaxed);
        let same = match (old, new) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            self.counters.identical.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::from([]));
        }

        let kind = self.select_strategy(old, new, dirty);
        self.counters.per_strategy[slot(kind)].fetch_add(1, Ordering::Relaxed);
        let key = CacheKey::new(old, new, kind, dirty.map_or(0, DirtyState::fingerprint));
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(message = "vdom.diff.cache_hit", strategy = %kind, patches = hit.len());
            return Ok(hit);
        }

        let mut buffer = self.pool.acquire();
        self.strategy(kind).diff_into(old, new, dirty, &mut buffer)?;
        let patches: Arc<[Patch]> = Arc::from(buffer.as_slice());
        if patches.len() <= self.config.max_cached_patches {
            self.cache.insert(key, Arc::clone(&patches));
        }
        tracing::debug!(message = "vdom.diff", strategy = %kind, patches = patches.len());
        Ok(patches)
    }

    /// Diff the current contents of two trees, consuming both trees' dirty
    /// state.
    pub fn diff_trees(&self, old: &VTree, new: &VTree) -> Result<Arc<[Patch]>> {
        let dirty = match (old.consume_dirty_state(), new.consume_dirty_state()) {
            (Some(mut a), Some(b)) => {
                a.merge(b);
                Some(a)
            }
            (a, b) => a.or(b),
        };
        let old_root = old.root_snapshot();
        let new_root = new.root_snapshot();
        self.diff_with_dirty(old_root.as_ref(), new_root.as_ref(), dirty.as_ref())
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let [positional, keyed, incremental] = &self.counters.per_strategy;
        EngineStats {
            diffs: load(&self.counters.diffs),
            identical: load(&self.counters.identical),
            positional: load(positional),
            keyed: load(keyed),
            incremental: load(incremental),
            cache: self.cache.stats(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Shrink the buffer pool to `keep` buffers; returns how many were freed.
    pub fn trim_pool(&self, keep: usize) -> usize {
        self.pool.trim(keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchKind;

    fn list(keys: &[String]) -> VNode {
        VNode::new("list")
            .with_key("list")
            .with_children(keys.iter().map(|k| VNode::new("item").with_key(k.as_str())))
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("k{i}")).collect()
    }

    #[test]
    fn same_node_short_circuits() {
        let engine = DiffingEngine::default();
        let node = list(&keys(3));
        assert!(engine.diff(Some(&node), Some(&node)).expect("diff").is_empty());
        assert_eq!(engine.stats().identical, 1);
    }

    #[test]
    fn repeated_diff_returns_cached_arc() {
        let engine = DiffingEngine::default();
        let old = list(&keys(3));
        let mut reversed = keys(3);
        reversed.reverse();
        let new = list(&reversed);
        let first = engine.diff(Some(&old), Some(&new)).expect("diff");
        let second = engine.diff(Some(&old), Some(&new.clone())).expect("diff");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.stats().cache.hits, 1);
        assert_eq!(engine.stats().keyed, 2);
    }

    #[test]
    fn oversized_batches_are_not_cached() {
        let engine = DiffingEngine::new(VdomConfig::default().with_max_cached_patches(1));
        let old = list(&keys(0));
        let new = list(&keys(3));
        let first = engine.diff(Some(&old), Some(&new)).expect("diff");
        assert_eq!(first.len(), 3);
        let second = engine.diff(Some(&old), Some(&new)).expect("diff");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn strategy_selection() {
        let engine = DiffingEngine::new(VdomConfig::default().with_incremental_threshold(4));
        let small = list(&keys(2));
        let large = list(&keys(8));
        let plain = VNode::new("row").with_child(VNode::new("cell"));
        assert_eq!(engine.select_strategy(Some(&small), None, None), StrategyKind::Keyed);
        assert_eq!(engine.select_strategy(Some(&plain), None, None), StrategyKind::Positional);
        assert_eq!(engine.select_strategy(Some(&large), None, None), StrategyKind::Incremental);

        let mut busy = DirtyState::default();
        busy.dirty.extend(keys(8).into_iter().map(crate::key::NodeKey::from));
        assert_eq!(
            engine.select_strategy(Some(&large), Some(&large), Some(&busy)),
            StrategyKind::Keyed
        );
    }

    #[test]
    fn diff_trees_consumes_dirty_state() {
        let engine = DiffingEngine::default();
        let old = VTree::new();
        let new = VTree::new();
        old.attach(list(&keys(2)), None, 0).expect("attach");
        new.attach(list(&keys(3)), None, 0).expect("attach");
        let patches = engine.diff_trees(&old, &new).expect("diff");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].kind(), PatchKind::AddNode);
        assert!(old.consume_dirty_state().is_none());
        assert!(new.consume_dirty_state().is_none());
    }

    #[test]
    fn pool_buffers_are_recycled() {
        let engine = DiffingEngine::new(VdomConfig::default().with_cache_capacity(0));
        let old = list(&keys(1));
        let new = list(&keys(2));
        engine.diff(Some(&old), Some(&new)).expect("diff");
        engine.diff(Some(&old), Some(&new)).expect("diff");
        let stats = engine.pool().stats();
        assert_eq!(stats.reused, 1);
        assert_eq!(engine.trim_pool(0), 1);
    }
}
