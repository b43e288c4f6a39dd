#![forbid(unsafe_code)]

//! Patch buffer pool.
//!
//! Diffing large trees allocates one `Vec<Patch>` per batch. The pool keeps
//! a bounded stack of cleared buffers so repeated diffs reuse capacity
//! instead of reallocating. Buffers are handed out behind an RAII guard that
//! returns them on drop.
//!
//! # Invariants
//!
//! - A buffer handed out by [`PatchPool::acquire`] is always empty.
//! - The pool never holds more than `max_pool_size` buffers, and never keeps
//!   a buffer whose capacity exceeds `max_buffer_capacity`.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::patch::Patch;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchPoolConfig {
    /// Maximum number of idle buffers retained.
    pub max_pool_size: usize,
    /// Buffers that grew beyond this capacity are dropped on return.
    pub max_buffer_capacity: usize,
}

impl Default for PatchPoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 32,
            max_buffer_capacity: 2000,
        }
    }
}

impl PatchPoolConfig {
    #[must_use]
    pub const fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    #[must_use]
    pub const fn with_max_buffer_capacity(mut self, capacity: usize) -> Self {
        self.max_buffer_capacity = capacity;
        self
    }
}

/// Pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PatchPoolStats {
    pub created: u64,
    pub reused: u64,
    pub returned: u64,
    pub evicted: u64,
    pub pool_size: usize,
}

impl PatchPoolStats {
    /// Fraction of acquisitions served from the pool.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.created + self.reused;
        if total == 0 {
            0.0
        } else {
            self.reused as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<Vec<Patch>>,
    stats: PatchPoolStats,
}

/// Bounded pool of patch buffers.
#[derive(Debug, Default)]
pub struct PatchPool {
    config: PatchPoolConfig,
    state: Mutex<PoolState>,
}

impl PatchPool {
    #[must_use]
    pub fn new(config: PatchPoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> PatchPoolConfig {
        self.config
    }

    /// Take an empty buffer, reusing an idle one when available.
    pub fn acquire(&self) -> PooledPatches<'_> {
        let mut state = self.state.lock();
        let buffer = match state.idle.pop() {
            Some(buffer) => {
                state.stats.reused += 1;
                buffer
            }
            None => {
                state.stats.created += 1;
                Vec::new()
            }
        };
        state.stats.pool_size = state.idle.len();
        PooledPatches { pool: self, buffer }
    }

    /// Return a buffer to the pool.
    pub fn release(&self, mut buffer: Vec<Patch>) {
        buffer.clear();
        let mut state = self.state.lock();
        if state.idle.len() >= self.config.max_pool_size
            || buffer.capacity() > self.config.max_buffer_capacity
        {
            state.stats.evicted += 1;
        } else {
            state.idle.push(buffer);
            state.stats.returned += 1;
        }
        state.stats.pool_size = state.idle.len();
    }

    /// Drop idle buffers above `keep`; returns how many were dropped.
    pub fn trim(&self, keep: usize) -> usize {
        let mut state = self.state.lock();
        let excess = state.idle.len().saturating_sub(keep);
        let len = state.idle.len();
        state.idle.truncate(len - excess);
        state.stats.evicted += excess as u64;
        state.stats.pool_size = state.idle.len();
        excess
    }

    /// Drop every idle buffer.
    pub fn clear(&self) {
        self.trim(0);
    }

    #[must_use]
    pub fn stats(&self) -> PatchPoolStats {
        self.state.lock().stats
    }
}

/// Pooled buffer; returned to its pool on drop.
///
/// Buffers that never allocated are not returned.
#[derive(Debug)]
pub struct PooledPatches<'a> {
    pool: &'a PatchPool,
    buffer: Vec<Patch>,
}

impl PooledPatches<'_> {
    /// Detach the buffer from the pool.
    #[must_use]
    pub fn into_inner(mut self) -> Vec<Patch> {
        std::mem::take(&mut self.buffer)
    }
}

impl Deref for PooledPatches<'_> {
    type Target = Vec<Patch>;

    fn deref(&self) -> &Vec<Patch> {
        &self.buffer
    }
}

impl DerefMut for PooledPatches<'_> {
    fn deref_mut(&mut self) -> &mut Vec<Patch> {
        &mut self.buffer
    }
}

impl Drop for PooledPatches<'_> {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        if buffer.capacity() > 0 {
            self.pool.release(buffer);
        }
    }
}
