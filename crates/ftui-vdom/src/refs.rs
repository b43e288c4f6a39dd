#![forbid(unsafe_code)]

//! Key → component registry.
//!
//! A tree remembers which component description produced each mounted
//! subtree, without keeping the description alive: entries are weak, and
//! the caller that built the component owns it. An entry whose component
//! was dropped stops resolving and is pruned on lookup or by
//! [`ComponentRefs::cleanup_dead_refs`].
//!
//! [`VTree::add_shared`](crate::tree::VTree::add_shared) and
//! [`VTree::update_shared`](crate::tree::VTree::update_shared) register;
//! the patcher forgets a key when it unmounts the node.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::component::Component;
use crate::key::NodeKey;

/// Shared handle to a component description.
pub type ComponentRef = Arc<dyn Component + Send + Sync>;

type WeakComponent = Weak<dyn Component + Send + Sync>;

/// Weak registry of the components behind mounted keys.
#[derive(Default)]
pub struct ComponentRefs {
    refs: Mutex<AHashMap<NodeKey, WeakComponent>>,
}

impl std::fmt::Debug for ComponentRefs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRefs")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl ComponentRefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` under `key`, replacing any previous entry.
    pub fn add_ref(&self, key: NodeKey, component: &ComponentRef) {
        self.refs.lock().insert(key, Arc::downgrade(component));
    }

    /// The component registered under `key`, if it is still alive. A dead
    /// entry is removed.
    #[must_use]
    pub fn get_ref(&self, key: &str) -> Option<ComponentRef> {
        let mut refs = self.refs.lock();
        let component = refs.get(key)?.upgrade();
        if component.is_none() {
            refs.remove(key);
        }
        component
    }

    /// Forget `key`. Returns whether an entry existed.
    pub fn remove_ref(&self, key: &str) -> bool {
        self.refs.lock().remove(key).is_some()
    }

    /// Drop every entry whose component is gone; returns how many.
    pub fn cleanup_dead_refs(&self) -> usize {
        let mut refs = self.refs.lock();
        let before = refs.len();
        refs.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - refs.len();
        if removed > 0 {
            tracing::debug!(message = "vdom.refs.sweep", removed);
        }
        removed
    }

    /// Registered keys, dead or alive, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.refs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Entries whose component is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.refs
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
