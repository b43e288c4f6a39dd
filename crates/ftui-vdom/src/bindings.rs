#![forbid(unsafe_code)]

//! Key → host object registry.
//!
//! Bindings are weak by default: the backend owns its host objects and a
//! dropped object simply stops resolving. Objects that report
//! [`HostObject::retain_strongly`] are held strongly until unbound.
//!
//! A reverse index (host pointer → key) lets backends map an object they
//! receive from the platform (an event target, say) back to its node.
//!
//! # Invariants
//!
//! - Each key maps to at most one host, and each live host to at most one
//!   key. Re-binding either side replaces the previous association.
//! - Stale weak entries are pruned lazily on lookup and eagerly by
//!   [`HostBindings::sweep`].

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::host::HostObject;
use crate::key::NodeKey;

enum HostRef {
    Weak(Weak<dyn HostObject>),
    Strong(Arc<dyn HostObject>),
}

impl HostRef {
    fn upgrade(&self) -> Option<Arc<dyn HostObject>> {
        match self {
            Self::Weak(weak) => weak.upgrade(),
            Self::Strong(strong) => Some(Arc::clone(strong)),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Self::Weak(weak) => weak.strong_count() > 0,
            Self::Strong(_) => true,
        }
    }
}

struct Binding {
    host: HostRef,
    addr: usize,
}

#[derive(Default)]
struct Registry {
    by_key: AHashMap<NodeKey, Binding>,
    by_host: AHashMap<usize, NodeKey>,
}

impl Registry {
    fn remove_key(&mut self, key: &str) -> Option<Binding> {
        let binding = self.by_key.remove(key)?;
        if self.by_host.get(&binding.addr).is_some_and(|k| k.as_str() == key) {
            self.by_host.remove(&binding.addr);
        }
        Some(binding)
    }
}

/// Binding registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingStats {
    pub bound: usize,
    pub live: usize,
    pub strong: usize,
}

/// Registry of host objects bound to node keys.
#[derive(Default)]
pub struct HostBindings {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBindings")
            .field("bound", &self.len())
            .finish_non_exhaustive()
    }
}

fn host_addr(host: &Arc<dyn HostObject>) -> usize {
    Arc::as_ptr(host).cast::<()>() as usize
}

impl HostBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `host` to `key`, replacing any previous association of either.
    pub fn bind(&self, key: NodeKey, host: &Arc<dyn HostObject>) {
        let addr = host_addr(host);
        let host_ref = if host.retain_strongly() {
            HostRef::Strong(Arc::clone(host))
        } else {
            HostRef::Weak(Arc::downgrade(host))
        };
        let mut registry = self.registry.lock();
        registry.remove_key(&key);
        if let Some(previous) = registry.by_host.remove(&addr) {
            registry.by_key.remove(&previous);
        }
        registry.by_host.insert(addr, key.clone());
        registry.by_key.insert(
            key,
            Binding {
                host: host_ref,
                addr,
            },
        );
    }

    /// Host bound to `key`, if it is still alive. A dead entry is dropped.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Arc<dyn HostObject>> {
        let mut registry = self.registry.lock();
        let host = registry.by_key.get(key)?.host.upgrade();
        if host.is_none() {
            registry.remove_key(key);
        }
        host
    }

    /// Key bound to `host`.
    #[must_use]
    pub fn key_for_host(&self, host: &Arc<dyn HostObject>) -> Option<NodeKey> {
        let registry = self.registry.lock();
        let key = registry.by_host.get(&host_addr(host))?;
        let binding = registry.by_key.get(key)?;
        let same = binding
            .host
            .upgrade()
            .is_some_and(|bound| Arc::ptr_eq(&bound, host));
        same.then(|| key.clone())
    }

    /// Drop the binding of `key`; returns whether one existed.
    pub fn unbind(&self, key: &str) -> bool {
        self.registry.lock().remove_key(key).is_some()
    }

    /// Drop the binding of `host`; returns whether one existed.
    pub fn unbind_host(&self, host: &Arc<dyn HostObject>) -> bool {
        let mut registry = self.registry.lock();
        let Some(key) = registry.by_host.remove(&host_addr(host)) else {
            return false;
        };
        registry.by_key.remove(&key);
        true
    }

    /// Drop every binding whose host is gone; returns how many.
    pub fn sweep(&self) -> usize {
        let mut registry = self.registry.lock();
        let dead: Vec<NodeKey> = registry
            .by_key
            .iter()
            .filter(|(_, binding)| !binding.host.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            registry.remove_key(key);
        }
        if !dead.is_empty() {
            tracing::debug!(message = "vdom.bindings.sweep", removed = dead.len());
        }
        dead.len()
    }

    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        registry.by_key.clear();
        registry.by_host.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys whose host is still alive, sorted.
    #[must_use]
    pub fn bound_keys(&self) -> Vec<NodeKey> {
        let registry = self.registry.lock();
        let mut keys: Vec<NodeKey> = registry
            .by_key
            .iter()
            .filter(|(_, binding)| binding.host.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn stats(&self) -> BindingStats {
        let registry = self.registry.lock();
        let mut stats = BindingStats {
            bound: registry.by_key.len(),
            ..BindingStats::default()
        };
        for binding in registry.by_key.values() {
            if binding.host.is_live() {
                stats.live += 1;
            }
            if matches!(binding.host, HostRef::Strong(_)) {
                stats.strong += 1;
            }
        }
        stats
    }
}
