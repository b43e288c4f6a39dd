#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Defaults suit interactive UIs. Every field can be overridden through the
//! builder methods or, for deployments, through environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `FTUI_VDOM_INCREMENTAL_THRESHOLD` | [`VdomConfig::incremental_threshold`] |
//! | `FTUI_VDOM_MAX_DIRTY_RATIO` | [`VdomConfig::max_dirty_ratio`] |
//! | `FTUI_VDOM_CACHE_CAPACITY` | [`VdomConfig::cache_capacity`] |
//! | `FTUI_VDOM_MAX_CACHED_PATCHES` | [`VdomConfig::max_cached_patches`] |
//! | `FTUI_VDOM_POOL_SIZE` | [`PatchPoolConfig::max_pool_size`] |
//! | `FTUI_VDOM_LARGE_TREE_THRESHOLD` | [`VdomConfig::large_tree_threshold`] |
//!
//! Unparseable values are logged and ignored.

use std::str::FromStr;

use crate::pool::PatchPoolConfig;

pub const ENV_INCREMENTAL_THRESHOLD: &str = "FTUI_VDOM_INCREMENTAL_THRESHOLD";
pub const ENV_MAX_DIRTY_RATIO: &str = "FTUI_VDOM_MAX_DIRTY_RATIO";
pub const ENV_CACHE_CAPACITY: &str = "FTUI_VDOM_CACHE_CAPACITY";
pub const ENV_MAX_CACHED_PATCHES: &str = "FTUI_VDOM_MAX_CACHED_PATCHES";
pub const ENV_POOL_SIZE: &str = "FTUI_VDOM_POOL_SIZE";
pub const ENV_LARGE_TREE_THRESHOLD: &str = "FTUI_VDOM_LARGE_TREE_THRESHOLD";

/// Tuning knobs for the diffing engine and memory helpers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VdomConfig {
    /// Trees with more nodes than this use the incremental strategy.
    pub incremental_threshold: usize,
    /// Incremental diffing is skipped when more than this fraction of the
    /// tree is dirty.
    pub max_dirty_ratio: f64,
    /// Diff cache entries.
    pub cache_capacity: usize,
    /// Batches longer than this are not cached.
    pub max_cached_patches: usize,
    pub pool: PatchPoolConfig,
    /// Node count above which [`MemoryMonitor`](crate::memory::MemoryMonitor)
    /// treats a tree as large.
    pub large_tree_threshold: usize,
}

impl Default for VdomConfig {
    fn default() -> Self {
        Self {
            incremental_threshold: 1000,
            max_dirty_ratio: 0.25,
            cache_capacity: 1000,
            max_cached_patches: 1000,
            pool: PatchPoolConfig::default(),
            large_tree_threshold: 1000,
        }
    }
}

impl VdomConfig {
    /// Defaults overlaid with `FTUI_VDOM_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay_env(|name| std::env::var(name).ok())
    }

    /// Overlay values produced by `lookup` (an environment lookup in
    /// production, a map in tests).
    #[must_use]
    pub fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        read(&lookup, ENV_INCREMENTAL_THRESHOLD, &mut self.incremental_threshold);
        read(&lookup, ENV_MAX_DIRTY_RATIO, &mut self.max_dirty_ratio);
        read(&lookup, ENV_CACHE_CAPACITY, &mut self.cache_capacity);
        read(&lookup, ENV_MAX_CACHED_PATCHES, &mut self.max_cached_patches);
        read(&lookup, ENV_POOL_SIZE, &mut self.pool.max_pool_size);
        read(&lookup, ENV_LARGE_TREE_THRESHOLD, &mut self.large_tree_threshold);
        self
    }

    #[must_use]
    pub const fn with_incremental_threshold(mut self, threshold: usize) -> Self {
        self.incremental_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_max_dirty_ratio(mut self, ratio: f64) -> Self {
        self.max_dirty_ratio = ratio;
        self
    }

    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_max_cached_patches(mut self, max: usize) -> Self {
        self.max_cached_patches = max;
        self
    }

    #[must_use]
    pub const fn with_pool(mut self, pool: PatchPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub const fn with_large_tree_threshold(mut self, threshold: usize) -> Self {
        self.large_tree_threshold = threshold;
        self
    }
}

fn read<T, F>(lookup: &F, name: &str, slot: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(message = "vdom.config.invalid", variable = name, value = %raw),
    }
}
