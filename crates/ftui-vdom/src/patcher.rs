#![forbid(unsafe_code)]

//! Patch application.
//!
//! [`Patcher`] applies a patch batch to a [`VTree`] strictly in order and
//! drives the bound host objects alongside. The whole batch runs inside one
//! scheduler commit window while holding the tree lock, so lifecycle effects
//! queued during the batch run once it is done, and host callbacks may read
//! the tree from the same thread.
//!
//! # Failure Modes
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Target key unknown | Patch skipped, `warn` logged |
//! | Tree rejects the patch (collision, missing parent) | Recorded in [`PatchReport::rejected`] |
//! | Host callback errors or panics | Recorded in [`PatchReport::host_failures`] |
//!
//! None of these abort the batch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::bindings::HostBindings;
use crate::error::{HostError, HostOperation, HostResult, Result, VdomError};
use crate::host::{HostCapabilities, HostFactory, HostNodeInfo, HostObject};
use crate::key::NodeKey;
use crate::lifecycle::{ComponentLifecycle, LifecycleListener};
use crate::node::VNode;
use crate::patch::Patch;
use crate::refs::ComponentRefs;
use crate::scheduler::EffectScheduler;
use crate::tree::VTree;

/// Outcome of one [`Patcher::apply`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchReport {
    pub applied: usize,
    pub skipped: usize,
    pub rejected: Vec<VdomError>,
    pub host_failures: Vec<VdomError>,
    /// Synchronous effects drained when the commit closed.
    pub effects_run: usize,
}

impl PatchReport {
    /// No rejections and no host failures.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.host_failures.is_empty()
    }
}

/// Applies patches to a tree and its host objects.
#[derive(Clone)]
pub struct Patcher {
    bindings: Arc<HostBindings>,
    refs: Arc<ComponentRefs>,
    scheduler: Arc<EffectScheduler>,
    factory: Option<Arc<dyn HostFactory>>,
    lifecycle: Option<Arc<ComponentLifecycle>>,
}

impl Default for Patcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Patcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patcher")
            .field("bindings", &self.bindings)
            .field("has_factory", &self.factory.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Patcher {
    /// Fresh bindings and scheduler, no host factory, no lifecycle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(HostBindings::new()),
            refs: Arc::new(ComponentRefs::new()),
            scheduler: Arc::new(EffectScheduler::new()),
            factory: None,
            lifecycle: None,
        }
    }

    /// Share a binding registry. Trees sharing one must use disjoint keys;
    /// each tree only ever unbinds the keys it unmounts.
    #[must_use]
    pub fn with_bindings(mut self, bindings: Arc<HostBindings>) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub fn with_refs(mut self, refs: Arc<ComponentRefs>) -> Self {
        self.refs = refs;
        self
    }

    /// Share a scheduler. Set it before [`with_listener`](Self::with_listener),
    /// which captures the current one.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<EffectScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn with_host_factory(self, factory: impl HostFactory + 'static) -> Self {
        self.with_shared_factory(Arc::new(factory))
    }

    #[must_use]
    pub fn with_shared_factory(mut self, factory: Arc<dyn HostFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Arc<ComponentLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Report lifecycle transitions to `listener` through this patcher's
    /// scheduler.
    #[must_use]
    pub fn with_listener(self, listener: Arc<dyn LifecycleListener>) -> Self {
        let lifecycle = ComponentLifecycle::new(Arc::clone(&self.scheduler), listener);
        self.with_lifecycle(Arc::new(lifecycle))
    }

    #[must_use]
    pub fn bindings(&self) -> &Arc<HostBindings> {
        &self.bindings
    }

    #[must_use]
    pub fn refs(&self) -> &Arc<ComponentRefs> {
        &self.refs
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<EffectScheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn lifecycle(&self) -> Option<&Arc<ComponentLifecycle>> {
        self.lifecycle.as_ref()
    }

    /// Apply `patches` to `tree` in order.
    pub fn apply(&self, tree: &VTree, patches: &[Patch]) -> PatchReport {
        let _guard = tree.lock();
        self.scheduler.begin_commit();
        let mut report = PatchReport::default();
        for patch in patches {
            match self.apply_one(tree, patch, &mut report) {
                Ok(true) => report.applied += 1,
                Ok(false) => {
                    tracing::warn!(message = "vdom.patch.skipped", patch = %patch);
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(message = "vdom.patch.rejected", patch = %patch, error = %err);
                    report.rejected.push(err);
                }
            }
        }
        report.effects_run = self.scheduler.end_commit();
        tracing::debug!(
            message = "vdom.patch.batch",
            patches = patches.len(),
            applied = report.applied,
            skipped = report.skipped,
            rejected = report.rejected.len(),
            host_failures = report.host_failures.len(),
            effects = report.effects_run
        );
        report
    }

    /// `Ok(false)` means the target was unknown and nothing happened.
    fn apply_one(&self, tree: &VTree, patch: &Patch, report: &mut PatchReport) -> Result<bool> {
        match patch {
            Patch::AddNode {
                parent,
                index,
                node,
            } => {
                let mut node = VNode::clone(node);
                node.ensure_keys();
                let key = tree.attach(node.clone(), parent.as_deref(), *index)?;
                let at = tree.child_index(&key).unwrap_or(*index);
                let parent_host = parent.as_deref().and_then(|p| self.bindings.lookup(p));
                self.mount(&node, parent.as_ref(), at, parent_host.as_ref(), report);
                Ok(true)
            }
            Patch::RemoveNode { key } => {
                let Some(removed) = tree.detach(key) else {
                    return Ok(false);
                };
                self.unmount(&removed, report);
                Ok(true)
            }
            Patch::UpdateProps { key, delta } => {
                let Some(key) = key.clone().or_else(|| tree.root_key()) else {
                    return Ok(false);
                };
                if !tree.contains(&key) {
                    return Ok(false);
                }
                tree.update_props(&key, delta)?;
                if let Some(host) = self.capable(&key, HostCapabilities::UPDATE_PROPERTIES) {
                    self.call_host(report, &key, HostOperation::UpdateProperties, || {
                        host.update_properties(delta)
                    });
                }
                if let Some(lifecycle) = &self.lifecycle
                    && lifecycle.is_mounted(&key)
                {
                    lifecycle.update(&key, delta);
                }
                Ok(true)
            }
            Patch::MoveNode { key, index } => {
                if !tree.contains(key) {
                    return Ok(false);
                }
                tree.move_node(key, *index)?;
                let at = tree.child_index(key).unwrap_or(*index);
                if let Some(host) = self.capable(key, HostCapabilities::SET_CHILD_INDEX) {
                    self.call_host(report, key, HostOperation::SetChildIndex, || {
                        host.set_child_index(at)
                    });
                } else if let Some(host) = self.bindings.lookup(key)
                    && let Some(parent) = tree.parent_key(key)
                    && let Some(parent_host) = self.capable(&parent, HostCapabilities::MOVE_CHILD)
                {
                    self.call_host(report, key, HostOperation::MoveChild, || {
                        parent_host.move_child(host.as_ref(), at)
                    });
                }
                Ok(true)
            }
            Patch::ReplaceRoot { node } => {
                if let Some(root) = tree.root_key()
                    && let Some(old) = tree.detach(&root)
                {
                    self.unmount(&old, report);
                }
                if let Some(node) = node {
                    let mut node = VNode::clone(node);
                    node.ensure_keys();
                    tree.attach(node.clone(), None, 0)?;
                    self.mount(&node, None, 0, None, report);
                }
                Ok(true)
            }
        }
    }

    /// Create, bind and announce hosts for `node` and its descendants.
    fn mount(
        &self,
        node: &VNode,
        parent: Option<&NodeKey>,
        index: usize,
        parent_host: Option<&Arc<dyn HostObject>>,
        report: &mut PatchReport,
    ) {
        let Some(key) = node.key() else {
            return;
        };
        let mut host = None;
        if let Some(factory) = &self.factory {
            let info = HostNodeInfo {
                key,
                name: node.name(),
                props: node.props(),
                parent,
                index,
            };
            match guarded(|| factory.create(&info)) {
                Ok(created) => host = created,
                Err(source) => record(report, key, HostOperation::Create, source),
            }
        }
        if let Some(host) = &host {
            self.bindings.bind(key.clone(), host);
            if let Some(parent_host) = parent_host
                && parent_host.capabilities().contains(HostCapabilities::ADD_CHILD)
            {
                self.call_host(report, key, HostOperation::AddChild, || {
                    parent_host.add_child(host, index)
                });
            }
        }
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.mount(key, node.name());
        }
        for (i, child) in node.children().iter().enumerate() {
            self.mount(child, Some(key), i, host.as_ref(), report);
        }
    }

    /// Tear down hosts of a detached subtree, children first.
    fn unmount(&self, node: &VNode, report: &mut PatchReport) {
        for child in node.children() {
            self.unmount(child, report);
        }
        let Some(key) = node.key() else {
            return;
        };
        if let Some(host) = self.capable(key, HostCapabilities::DESTROY) {
            self.call_host(report, key, HostOperation::Destroy, || host.destroy());
        }
        self.bindings.unbind(key);
        self.refs.remove_ref(key);
        if let Some(lifecycle) = &self.lifecycle
            && lifecycle.is_mounted(key)
        {
            lifecycle.unmount(key);
        }
    }

    fn capable(&self, key: &str, capability: HostCapabilities) -> Option<Arc<dyn HostObject>> {
        self.bindings
            .lookup(key)
            .filter(|host| host.capabilities().contains(capability))
    }

    fn call_host(
        &self,
        report: &mut PatchReport,
        key: &NodeKey,
        operation: HostOperation,
        call: impl FnOnce() -> HostResult,
    ) {
        if let Err(source) = guarded(call) {
            record(report, key, operation, source);
        }
    }
}

fn guarded<T>(call: impl FnOnce() -> std::result::Result<T, HostError>) -> std::result::Result<T, HostError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| Err(HostError::from_panic(payload)))
}

fn record(report: &mut PatchReport, key: &NodeKey, operation: HostOperation, source: HostError) {
    tracing::error!(
        message = "vdom.host.callback_failed",
        key = %key,
        operation = %operation,
        error = %source
    );
    report.host_failures.push(VdomError::HostCallbackFailure {
        key: key.clone(),
        operation,
        source,
    });
}
