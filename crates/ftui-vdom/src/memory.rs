#![forbid(unsafe_code)]

//! Tree statistics and housekeeping.

use crate::config::VdomConfig;
use crate::engine::DiffingEngine;
use crate::tree::VTree;

/// Point-in-time size of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeStats {
    pub node_count: usize,
    /// Keys marked dirty since the last consume.
    pub dirty_count: usize,
    /// Keys whose child list changed since the last consume.
    pub structural_count: usize,
    /// Live host bindings.
    pub bound_hosts: usize,
    /// Registered components still alive.
    pub live_refs: usize,
}

impl TreeStats {
    /// Share of nodes marked dirty, in `[0, 1]`.
    #[must_use]
    pub fn dirty_ratio(&self) -> f64 {
        if self.node_count == 0 {
            0.0
        } else {
            (self.dirty_count as f64 / self.node_count as f64).min(1.0)
        }
    }
}

/// What one cleanup pass released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub bindings_swept: usize,
    pub refs_swept: usize,
    pub buffers_trimmed: usize,
    pub cache_cleared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMonitor {
    large_tree_threshold: usize,
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::from_config(&VdomConfig::default())
    }
}

impl MemoryMonitor {
    #[must_use]
    pub const fn new(large_tree_threshold: usize) -> Self {
        Self {
            large_tree_threshold,
        }
    }

    #[must_use]
    pub const fn from_config(config: &VdomConfig) -> Self {
        Self::new(config.large_tree_threshold)
    }

    #[must_use]
    pub fn is_large(&self, tree: &VTree) -> bool {
        tree.node_count() > self.large_tree_threshold
    }

    /// Drop bindings whose hosts are gone and component refs whose
    /// components are gone. For large trees also shrink the
    /// engine's buffer pool to half its bound and clear its cache.
    pub fn cleanup_after_operation(&self, tree: &VTree, engine: Option<&DiffingEngine>) -> CleanupReport {
        let mut report = CleanupReport {
            bindings_swept: tree.bindings().sweep(),
            refs_swept: tree.refs().cleanup_dead_refs(),
            ..CleanupReport::default()
        };
        if let Some(engine) = engine
            && self.is_large(tree)
        {
            report.buffers_trimmed = engine.trim_pool(engine.pool().config().max_pool_size / 2);
            report.cache_cleared = self.optimize_for_large_tree(tree, engine);
        }
        if report != CleanupReport::default() {
            tracing::debug!(
                message = "vdom.memory.cleanup",
                swept = report.bindings_swept,
                refs = report.refs_swept,
                trimmed = report.buffers_trimmed
            );
        }
        report
    }

    /// For trees above the threshold, clear the diff cache. Returns whether
    /// it did.
    pub fn optimize_for_large_tree(&self, tree: &VTree, engine: &DiffingEngine) -> bool {
        if !self.is_large(tree) {
            return false;
        }
        engine.clear_cache();
        tracing::debug!(
            message = "vdom.memory.optimize",
            nodes = tree.node_count(),
            threshold = self.large_tree_threshold
        );
        true
    }
}
