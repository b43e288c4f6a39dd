#![forbid(unsafe_code)]

//! Commit-phase effect scheduler.
//!
//! Side effects raised while patches are applied (mount/unmount callbacks,
//! backend notifications) are queued instead of run inline, then drained
//! once the outermost commit closes.
//!
//! # Design
//!
//! - Three FIFO buckets, drained `High`, then `Normal`, then `Idle`. An effect
//!   enqueued while draining is picked up in the same drain, ahead of any
//!   lower-priority work still waiting.
//! - `begin_commit`/`end_commit` nest; only the outermost `end_commit`
//!   drains.
//! - Effects run on the thread that closes the commit, with the queue lock
//!   released, so an effect may enqueue further effects or open its own
//!   commit.
//! - Async effects sit in separate buckets and run only when the caller
//!   awaits [`EffectScheduler::flush_async`]; there is no ambient executor.
//!
//! # Failure Modes
//!
//! An effect that returns an error or panics is logged and dropped; draining
//! continues with the next effect. `end_commit` without a matching
//! `begin_commit` logs a warning and does nothing.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::panic_message;

/// Effect priority. Lower variants drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum EffectPriority {
    High = 0,
    #[default]
    Normal = 1,
    Idle = 2,
}

impl EffectPriority {
    pub const ALL: [Self; 3] = [Self::High, Self::Normal, Self::Idle];

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Failure reported by an effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EffectError(pub String);

impl EffectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type EffectResult = Result<(), EffectError>;

type SyncEffect = Box<dyn FnOnce() -> EffectResult + Send>;
type AsyncEffect = Box<dyn FnOnce() -> BoxFuture<'static, EffectResult> + Send>;

struct Queued<E> {
    label: Option<String>,
    run: E,
}

struct Buckets<E> {
    queues: [VecDeque<Queued<E>>; 3],
}

impl<E> Default for Buckets<E> {
    fn default() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }
    }
}

impl<E> Buckets<E> {
    fn push(&mut self, priority: EffectPriority, item: Queued<E>) {
        self.queues[priority.slot()].push_back(item);
    }

    fn pop(&mut self) -> Option<(EffectPriority, Queued<E>)> {
        EffectPriority::ALL
            .into_iter()
            .find_map(|p| self.queues[p.slot()].pop_front().map(|item| (p, item)))
    }

    fn len(&self, priority: EffectPriority) -> usize {
        self.queues[priority.slot()].len()
    }

    fn total(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    fn clear(&mut self) {
        self.queues.iter_mut().for_each(VecDeque::clear);
    }
}

#[derive(Default)]
struct State {
    depth: usize,
    sync: Buckets<SyncEffect>,
    pending_async: Buckets<AsyncEffect>,
    stats: SchedulerStats,
}

/// Scheduler counters and queue sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub commit_depth: usize,
    pub commits: u64,
    pub executed: u64,
    pub failed: u64,
    pub pending_high: usize,
    pub pending_normal: usize,
    pub pending_idle: usize,
    pub pending_async: usize,
}

/// Priority effect queue with commit windows.
#[derive(Default)]
pub struct EffectScheduler {
    state: Mutex<State>,
}

impl fmt::Debug for EffectScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl EffectScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a commit window.
    pub fn begin_commit(&self) {
        let mut state = self.state.lock();
        state.depth += 1;
        tracing::trace!(message = "vdom.commit.begin", depth = state.depth);
    }

    /// Close a commit window. The outermost close drains every queued
    /// synchronous effect and returns how many ran.
    pub fn end_commit(&self) -> usize {
        {
            let mut state = self.state.lock();
            if state.depth == 0 {
                tracing::warn!(message = "vdom.commit.unbalanced");
                return 0;
            }
            state.depth -= 1;
            if state.depth > 0 {
                return 0;
            }
            state.stats.commits += 1;
        }
        self.flush_sync(None)
    }

    #[must_use]
    pub fn commit_depth(&self) -> usize {
        self.state.lock().depth
    }

    #[must_use]
    pub fn in_commit(&self) -> bool {
        self.commit_depth() > 0
    }

    /// Queue a synchronous effect.
    pub fn enqueue_effect<F>(&self, priority: EffectPriority, effect: F)
    where
        F: FnOnce() -> EffectResult + Send + 'static,
    {
        self.push_sync(priority, None, Box::new(effect));
    }

    /// Queue a synchronous effect with a label used in logs.
    pub fn enqueue_labeled<F>(&self, priority: EffectPriority, label: impl Into<String>, effect: F)
    where
        F: FnOnce() -> EffectResult + Send + 'static,
    {
        self.push_sync(priority, Some(label.into()), Box::new(effect));
    }

    fn push_sync(&self, priority: EffectPriority, label: Option<String>, run: SyncEffect) {
        self.state.lock().sync.push(priority, Queued { label, run });
    }

    /// Queue an async effect; it runs on the next [`flush_async`](Self::flush_async).
    pub fn enqueue_async_effect<F, Fut>(&self, priority: EffectPriority, label: Option<String>, effect: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = EffectResult> + Send + 'static,
    {
        let run: AsyncEffect = Box::new(move || effect().boxed());
        self.state
            .lock()
            .pending_async
            .push(priority, Queued { label, run });
    }

    /// Drain synchronous effects in priority order, at most `max` of them.
    /// Returns how many ran (failed ones included).
    pub fn flush_sync(&self, max: Option<usize>) -> usize {
        let limit = max.unwrap_or(usize::MAX);
        let mut ran = 0;
        while ran < limit {
            let Some((priority, item)) = self.state.lock().sync.pop() else {
                break;
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(item.run))
                .unwrap_or_else(|payload| Err(EffectError(panic_message(payload))));
            self.record(priority, item.label.as_deref(), outcome);
            ran += 1;
        }
        ran
    }

    /// Drain async effects in priority order, awaiting each in turn.
    pub async fn flush_async(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some((priority, item)) = self.state.lock().pending_async.pop() else {
                break;
            };
            let outcome = match panic::catch_unwind(AssertUnwindSafe(item.run)) {
                Ok(future) => AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(EffectError(panic_message(payload)))),
                Err(payload) => Err(EffectError(panic_message(payload))),
            };
            self.record(priority, item.label.as_deref(), outcome);
            ran += 1;
        }
        ran
    }

    /// End-of-frame hook: drain whatever is queued.
    pub fn on_frame_end(&self) -> usize {
        self.flush_sync(None)
    }

    fn record(&self, priority: EffectPriority, label: Option<&str>, outcome: EffectResult) {
        let mut state = self.state.lock();
        state.stats.executed += 1;
        if let Err(err) = outcome {
            state.stats.failed += 1;
            drop(state);
            tracing::error!(
                message = "vdom.effect.failed",
                ?priority,
                label = label.unwrap_or("<unlabeled>"),
                error = %err
            );
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.sync.total() + state.pending_async.total()
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            commit_depth: state.depth,
            pending_high: state.sync.len(EffectPriority::High),
            pending_normal: state.sync.len(EffectPriority::Normal),
            pending_idle: state.sync.len(EffectPriority::Idle),
            pending_async: state.pending_async.total(),
            ..state.stats
        }
    }

    /// Drop all queued effects, counters and commit depth.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.depth = 0;
        state.sync.clear();
        state.pending_async.clear();
        state.stats = SchedulerStats::default();
    }
}
