#![forbid(unsafe_code)]

//! Component mount/update/unmount notifications.
//!
//! The patcher reports every node it attaches, updates or removes. This
//! module tracks which keys are mounted and turns each transition into a
//! scheduled effect, so listeners run after the commit instead of in the
//! middle of a batch. Unmounts run at high priority, ahead of the mounts and
//! updates of the same commit.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::key::NodeKey;
use crate::props::PropDelta;
use crate::scheduler::{EffectPriority, EffectResult, EffectScheduler};

/// Receives lifecycle callbacks. All methods default to no-ops.
pub trait LifecycleListener: Send + Sync + 'static {
    fn on_mount(&self, _key: &NodeKey, _component: &str) -> EffectResult {
        Ok(())
    }

    fn on_update(&self, _key: &NodeKey, _delta: &PropDelta) -> EffectResult {
        Ok(())
    }

    fn on_unmount(&self, _key: &NodeKey, _component: &str) -> EffectResult {
        Ok(())
    }
}

/// Tracks mounted components and schedules listener callbacks.
pub struct ComponentLifecycle {
    scheduler: Arc<EffectScheduler>,
    listener: Arc<dyn LifecycleListener>,
    mounted: Mutex<AHashMap<NodeKey, Arc<str>>>,
}

impl std::fmt::Debug for ComponentLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLifecycle")
            .field("mounted", &self.mounted_count())
            .finish_non_exhaustive()
    }
}

impl ComponentLifecycle {
    #[must_use]
    pub fn new(scheduler: Arc<EffectScheduler>, listener: Arc<dyn LifecycleListener>) -> Self {
        Self {
            scheduler,
            listener,
            mounted: Mutex::new(AHashMap::new()),
        }
    }

    pub fn mount(&self, key: &NodeKey, component: &str) {
        {
            let mut mounted = self.mounted.lock();
            if mounted.contains_key(key.as_str()) {
                tracing::warn!(message = "vdom.lifecycle.double_mount", key = %key);
                return;
            }
            mounted.insert(key.clone(), Arc::from(component));
        }
        let listener = Arc::clone(&self.listener);
        let key = key.clone();
        let component = component.to_owned();
        self.scheduler
            .enqueue_labeled(EffectPriority::Normal, "mount", move || {
                listener.on_mount(&key, &component)
            });
    }

    pub fn update(&self, key: &NodeKey, delta: &PropDelta) {
        if !self.is_mounted(key) {
            tracing::warn!(message = "vdom.lifecycle.update_unmounted", key = %key);
            return;
        }
        let listener = Arc::clone(&self.listener);
        let key = key.clone();
        let delta = delta.clone();
        self.scheduler
            .enqueue_labeled(EffectPriority::Normal, "update", move || {
                listener.on_update(&key, &delta)
            });
    }

    pub fn unmount(&self, key: &NodeKey) {
        let Some(component) = self.mounted.lock().remove(key.as_str()) else {
            tracing::warn!(message = "vdom.lifecycle.unmount_unknown", key = %key);
            return;
        };
        let listener = Arc::clone(&self.listener);
        let key = key.clone();
        self.scheduler
            .enqueue_labeled(EffectPriority::High, "unmount", move || {
                listener.on_unmount(&key, &component)
            });
    }

    /// Forget every mounted key without scheduling callbacks.
    pub fn clear(&self) {
        self.mounted.lock().clear();
    }

    #[must_use]
    pub fn is_mounted(&self, key: &str) -> bool {
        self.mounted.lock().contains_key(key)
    }

    #[must_use]
    pub fn mounted_count(&self) -> usize {
        self.mounted.lock().len()
    }

    #[must_use]
    pub fn mounted_keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.mounted.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}
