#![forbid(unsafe_code)]

//! The live virtual tree.
//!
//! [`VTree`] owns its nodes in an arena and indexes them by key. Parents are
//! recorded as keys, never as owning pointers, so detaching a subtree is a
//! matter of unlinking one child id and dropping the arena slots beneath it.
//!
//! # Invariants
//!
//! - Keys are unique; every arena node is reachable from the key index and
//!   vice versa.
//! - Every non-root node appears in exactly one parent's child list, at its
//!   recorded `child_index`.
//! - Hashes of a mutated node and all its ancestors are recomputed before
//!   the mutating call returns.
//! - Dirty marks accumulate until [`VTree::consume_dirty_state`] or
//!   [`VTree::reset_dirty_tracking`].
//!
//! # Locking
//!
//! Each tree carries a re-entrant lock held for the full duration of every
//! public operation. [`Patcher`] holds it across a whole batch and invokes
//! host callbacks between tree operations, so a callback may call back into
//! the same tree on the same thread; other threads wait until the batch is
//! done.
//!
//! # Example
//!
//! ```
//! use ftui_vdom::component::Element;
//! use ftui_vdom::tree::VTree;
//!
//! let tree = VTree::new();
//! let root = tree.add(&Element::new("List").key("list"), None).unwrap();
//! tree.update(&root, &Element::new("List").key("list")
//!     .child(Element::new("Item").key("a"))).unwrap();
//! assert_eq!(tree.child_keys("list").unwrap().len(), 1);
//! ```

use std::cell::RefCell;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use thunderdome::{Arena, Index as NodeId};

use crate::bindings::HostBindings;
use crate::component::Component;
use crate::error::{Result, VdomError};
use crate::key::{KeySource, NodeKey};
use crate::memory::TreeStats;
use crate::node::{ChildHashInput, Hashes, VNode, props_hash};
use crate::patch::Patch;
use crate::patcher::{PatchReport, Patcher};
use crate::props::{PropDelta, Props};
use crate::reconciler::{DirtyState, Reconciler};
use crate::refs::{ComponentRef, ComponentRefs};
use crate::scheduler::EffectScheduler;

pub(crate) struct LiveNode {
    name: Arc<str>,
    props: Props,
    children: Vec<NodeId>,
    key: NodeKey,
    key_source: KeySource,
    parent: Option<NodeKey>,
    child_index: usize,
    hashes: Hashes,
    dirty: bool,
    props_dirty: bool,
}

impl LiveNode {
    fn stable_key(&self) -> Option<&NodeKey> {
        self.key_source.is_stable().then_some(&self.key)
    }
}

#[derive(Default)]
pub(crate) struct TreeState {
    nodes: Arena<LiveNode>,
    index: AHashMap<NodeKey, NodeId>,
    root: Option<NodeId>,
    dirty_keys: AHashSet<NodeKey>,
    structural_keys: AHashSet<NodeKey>,
}

impl TreeState {
    fn id(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    fn require(&self, key: &str) -> Result<NodeId> {
        self.id(key).ok_or_else(|| VdomError::not_found(key))
    }

    fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent.as_deref().and_then(|p| self.id(p))
    }

    /// Reject `node` if any key in it is taken or repeated.
    fn check_keys(&self, node: &VNode) -> Result<()> {
        let mut seen = AHashSet::new();
        for n in node.descendants() {
            let Some(key) = n.key() else { continue };
            check_reserved(n, key)?;
            if self.index.contains_key(key.as_str()) || !seen.insert(key) {
                return Err(VdomError::AlreadyExists { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Keys `new` would bring into the tree when it replaces the subtree at
    /// `id`: unique among themselves and not held anywhere outside that
    /// subtree. The root key is skipped when it will not be used.
    fn check_replacement_keys(&self, id: NodeId, new: &VNode) -> Result<()> {
        let mut owned = AHashSet::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let node = &self.nodes[cur];
            owned.insert(node.key.as_str());
            stack.extend(node.children.iter().copied());
        }
        let keeps_root = *self.nodes[id].name == *new.name();
        let mut seen = AHashSet::new();
        for n in new.descendants().skip(usize::from(keeps_root)) {
            let Some(key) = n.key() else { continue };
            check_reserved(n, key)?;
            let foreign = self.index.contains_key(key.as_str()) && !owned.contains(key.as_str());
            if foreign || !seen.insert(key) {
                return Err(VdomError::AlreadyExists { key: key.clone() });
            }
        }
        Ok(())
    }

    fn attach(&mut self, mut node: VNode, parent: Option<&str>, position: usize) -> Result<NodeKey> {
        let parent_id = match parent {
            Some(key) => Some(self.require(key)?),
            None if self.root.is_some() => {
                return Err(VdomError::invalid("tree already has a root"));
            }
            None => None,
        };
        node.ensure_keys();
        self.check_keys(&node)?;

        let parent_key = parent_id.map(|p| self.nodes[p].key.clone());
        let id = self.insert_subtree(&node, parent_key, 0);
        let key = self.nodes[id].key.clone();
        match parent_id {
            Some(pid) => {
                let siblings = &mut self.nodes[pid].children;
                let at = position.min(siblings.len());
                siblings.insert(at, id);
                self.reindex_children(pid, at);
                self.bubble(Some(pid));
            }
            None => self.root = Some(id),
        }
        self.mark(id, true);
        if let Some(pid) = parent_id {
            self.mark(pid, true);
            self.mark_ancestors(pid);
        }
        Ok(key)
    }

    fn insert_subtree(&mut self, node: &VNode, parent: Option<NodeKey>, child_index: usize) -> NodeId {
        // Keys were assigned by `ensure_keys` before we got here.
        let key = node.key().cloned().unwrap_or_else(|| crate::key::generate_key(None));
        let id = self.nodes.insert(LiveNode {
            name: Arc::clone(node.name_arc()),
            props: node.props().clone(),
            children: Vec::with_capacity(node.children().len()),
            key: key.clone(),
            key_source: node.key_source(),
            parent,
            child_index,
            hashes: *node.hashes(),
            dirty: false,
            props_dirty: false,
        });
        self.index.insert(key.clone(), id);
        for (i, child) in node.children().iter().enumerate() {
            let child_id = self.insert_subtree(child, Some(key.clone()), i);
            self.nodes[id].children.push(child_id);
        }
        id
    }

    fn detach(&mut self, key: &str) -> Option<VNode> {
        let id = self.id(key)?;
        let snapshot = self.snapshot(id);
        let parent_id = self.parent_id(id);
        match parent_id {
            Some(pid) => {
                let at = self.nodes[id].child_index;
                self.nodes[pid].children.remove(at);
                self.reindex_children(pid, at);
                self.bubble(Some(pid));
                self.mark(pid, true);
                self.mark_ancestors(pid);
            }
            None => self.root = None,
        }
        self.unregister(id);
        Some(snapshot)
    }

    fn unregister(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(id) {
            self.index.remove(&node.key);
            for child in node.children {
                self.unregister(child);
            }
        }
    }

    fn move_node(&mut self, key: &str, new_index: usize) -> Result<()> {
        let id = self.require(key)?;
        let Some(pid) = self.parent_id(id) else {
            return Ok(());
        };
        let from = self.nodes[id].child_index;
        let siblings = &mut self.nodes[pid].children;
        siblings.remove(from);
        let to = new_index.min(siblings.len());
        siblings.insert(to, id);
        self.reindex_children(pid, from.min(to));
        self.bubble(Some(pid));
        self.mark(id, false);
        self.mark(pid, true);
        self.mark_ancestors(pid);
        Ok(())
    }

    fn update_props(&mut self, key: &str, delta: &PropDelta) -> Result<()> {
        let id = self.require(key)?;
        let node = &mut self.nodes[id];
        delta.apply_to(&mut node.props);
        node.props_dirty = true;
        self.bubble(Some(id));
        self.mark(id, false);
        self.mark_ancestors(id);
        Ok(())
    }

    fn reindex_children(&mut self, parent: NodeId, from: usize) {
        let children = self.nodes[parent].children.clone();
        for (i, child) in children.into_iter().enumerate().skip(from) {
            self.nodes[child].child_index = i;
        }
    }

    /// Recompute hashes from `start` up to the root.
    fn bubble(&mut self, start: Option<NodeId>) {
        let mut cursor = start;
        while let Some(id) = cursor {
            self.recompute(id);
            cursor = self.parent_id(id);
        }
    }

    fn recompute(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        let props = if node.props_dirty {
            props_hash(&node.props)
        } else {
            node.hashes.props
        };
        let hashes = Hashes::compute(
            &node.name,
            props,
            Some(&node.key),
            node.children.iter().map(|&c| {
                let child = &self.nodes[c];
                ChildHashInput {
                    stable_key: child.stable_key(),
                    subtree: child.hashes.subtree,
                    identity: child.hashes.identity,
                    node_count: child.hashes.node_count,
                    keyed: child.key_source.is_stable() || child.hashes.has_keyed_children,
                }
            }),
        );
        let node = &mut self.nodes[id];
        node.hashes = hashes;
        node.props_dirty = false;
    }

    fn mark(&mut self, id: NodeId, structural: bool) {
        let node = &mut self.nodes[id];
        node.dirty = true;
        self.dirty_keys.insert(node.key.clone());
        if structural {
            self.structural_keys.insert(node.key.clone());
        }
    }

    fn mark_ancestors(&mut self, id: NodeId) {
        let mut cursor = self.parent_id(id);
        while let Some(ancestor) = cursor {
            self.mark(ancestor, false);
            cursor = self.parent_id(ancestor);
        }
    }

    fn consume_dirty(&mut self) -> Option<DirtyState> {
        if self.dirty_keys.is_empty() && self.structural_keys.is_empty() {
            return None;
        }
        let state = DirtyState {
            dirty: std::mem::take(&mut self.dirty_keys),
            structural: std::mem::take(&mut self.structural_keys),
        };
        for key in &state.dirty {
            if let Some(id) = self.id(key) {
                self.nodes[id].dirty = false;
            }
        }
        Some(state)
    }

    fn reset_dirty(&mut self) {
        self.dirty_keys.clear();
        self.structural_keys.clear();
        for (_, node) in self.nodes.iter_mut() {
            node.dirty = false;
        }
    }

    fn snapshot(&self, id: NodeId) -> VNode {
        let node = &self.nodes[id];
        let children = node
            .children
            .iter()
            .map(|&c| Arc::new(self.snapshot(c)))
            .collect();
        VNode::assemble(
            Arc::clone(&node.name),
            node.props.clone(),
            children,
            Some(node.key.clone()),
            node.key_source,
        )
    }
}

fn check_reserved(node: &VNode, key: &NodeKey) -> Result<()> {
    if node.key_source().is_stable() && key.is_reserved() {
        return Err(VdomError::invalid(format!(
            "key {key} uses the prefix reserved for generated keys"
        )));
    }
    Ok(())
}

/// Arena-backed tree of live nodes.
pub struct VTree {
    state: ReentrantMutex<RefCell<TreeState>>,
    reconciler: Reconciler,
    patcher: Patcher,
}

impl Default for VTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VTree")
            .field("root", &self.root_key())
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

impl VTree {
    /// Empty tree with its own bindings and scheduler and no host factory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_patcher(Patcher::new())
    }

    /// Empty tree applying patches through `patcher`.
    #[must_use]
    pub fn with_patcher(patcher: Patcher) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(TreeState::default())),
            reconciler: Reconciler::new(),
            patcher,
        }
    }

    #[must_use]
    pub fn patcher(&self) -> &Patcher {
        &self.patcher
    }

    #[must_use]
    pub fn bindings(&self) -> &Arc<HostBindings> {
        self.patcher.bindings()
    }

    /// Components registered through [`add_shared`](Self::add_shared) and
    /// [`update_shared`](Self::update_shared).
    #[must_use]
    pub fn refs(&self) -> &Arc<ComponentRefs> {
        self.patcher.refs()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<EffectScheduler> {
        self.patcher.scheduler()
    }

    /// Hold the tree lock; re-entrant on the current thread.
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<TreeState>> {
        self.state.lock()
    }

    fn read<R>(&self, f: impl FnOnce(&TreeState) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    fn write<R>(&self, f: impl FnOnce(&mut TreeState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    // ─── Component-level operations ─────────────────────────────────────

    /// Convert `component` and insert it: as the root of an empty tree,
    /// otherwise as the last child of the root. `key` overrides the derived
    /// key. Host objects are created through the patcher.
    pub fn add(&self, component: &dyn Component, key: Option<&str>) -> Result<NodeKey> {
        let _guard = self.lock();
        let mut node = VNode::from_component(component);
        if let Some(key) = key {
            node.set_key(NodeKey::from(key), KeySource::Explicit);
        }
        node.ensure_keys();
        let (parent, index) = self.read(|st| {
            st.check_keys(&node)?;
            Ok::<_, VdomError>(match st.root {
                Some(root) => (Some(st.nodes[root].key.clone()), st.nodes[root].children.len()),
                None => (None, 0),
            })
        })?;
        let key = node
            .key()
            .cloned()
            .ok_or_else(|| VdomError::invalid("converted node has no key"))?;
        let mut report = self.apply(&[Patch::AddNode {
            parent,
            index,
            node: Arc::new(node),
        }]);
        match report.rejected.pop() {
            Some(err) => Err(err),
            None => Ok(key),
        }
    }

    /// [`add`](Self::add), then remember `component` under the new key.
    /// The tree holds it weakly.
    pub fn add_shared(&self, component: &ComponentRef, key: Option<&str>) -> Result<NodeKey> {
        let key = self.add(component.as_ref(), key)?;
        self.refs().add_ref(key.clone(), component);
        Ok(key)
    }

    /// [`update`](Self::update), then remember `component` under the key
    /// of the resulting subtree, which differs from `key` when the subtree
    /// was replaced.
    pub fn update_shared(&self, key: &str, component: &ComponentRef) -> Result<Vec<Patch>> {
        let _guard = self.lock();
        let patches = self.update(key, component.as_ref())?;
        let mounted = if self.contains(key) {
            Some(NodeKey::from(key))
        } else {
            patches.iter().find_map(|patch| match patch {
                Patch::AddNode { node, .. } | Patch::ReplaceRoot { node: Some(node) } => {
                    node.key().cloned()
                }
                _ => None,
            })
        };
        if let Some(mounted) = mounted {
            self.refs().add_ref(mounted, component);
        }
        Ok(patches)
    }

    /// The live component registered for a mounted `key`.
    #[must_use]
    pub fn get_component(&self, key: &str) -> Option<ComponentRef> {
        if !self.contains(key) {
            return None;
        }
        self.refs().get_ref(key)
    }

    /// Reconcile the subtree at `key` against `component` and apply the
    /// resulting patches. Returns the patches.
    pub fn update(&self, key: &str, component: &dyn Component) -> Result<Vec<Patch>> {
        let _guard = self.lock();
        let (old, parent, index, is_root) = self.read(|st| {
            let id = st.require(key)?;
            let node = &st.nodes[id];
            Ok::<_, VdomError>((
                st.snapshot(id),
                node.parent.clone(),
                node.child_index,
                st.root == Some(id),
            ))
        })?;
        let new = VNode::from_component(component);
        self.read(|st| st.check_replacement_keys(st.require(key)?, &new))?;
        let mut patches = self.reconciler.reconcile(Some(&old), Some(&new), None)?;

        if !is_root {
            let replacement = match patches.as_slice() {
                [Patch::ReplaceRoot { node: Some(node) }] => Some(Arc::clone(node)),
                _ => None,
            };
            if let Some(node) = replacement {
                patches = vec![
                    Patch::remove_node(key),
                    Patch::AddNode {
                        parent,
                        index,
                        node,
                    },
                ];
            }
        }

        let report = self.apply(&patches);
        tracing::debug!(
            message = "vdom.tree.update",
            key,
            patches = patches.len(),
            applied = report.applied,
            host_failures = report.host_failures.len()
        );
        if let Some(err) = report.rejected.into_iter().next() {
            return Err(err);
        }
        Ok(patches)
    }

    /// Remove the subtree at `key`, tearing down its host objects. Returns
    /// `false` if the key is unknown.
    pub fn remove(&self, key: &str) -> bool {
        let _guard = self.lock();
        if !self.contains(key) {
            return false;
        }
        self.apply(&[Patch::remove_node(key)]).applied > 0
    }

    /// Apply a patch batch through this tree's patcher.
    pub fn apply(&self, patches: &[Patch]) -> PatchReport {
        self.patcher.apply(self, patches)
    }

    // ─── Structural operations (no host side effects) ───────────────────

    /// Insert `node` under `parent` at `position` (clamped). Keyless nodes
    /// get generated keys.
    pub fn attach(&self, node: VNode, parent: Option<&str>, position: usize) -> Result<NodeKey> {
        self.write(|st| st.attach(node, parent, position))
    }

    /// Unlink and drop the subtree at `key`, returning its snapshot.
    pub fn detach(&self, key: &str) -> Option<VNode> {
        self.write(|st| st.detach(key))
    }

    /// Move `key` to `new_index` (clamped) within its parent. Moving the
    /// root is a no-op.
    pub fn move_node(&self, key: &str, new_index: usize) -> Result<()> {
        self.write(|st| st.move_node(key, new_index))
    }

    pub fn update_props(&self, key: &str, delta: &PropDelta) -> Result<()> {
        self.write(|st| st.update_props(key, delta))
    }

    /// Take the dirty and structural key sets, clearing them. `None` when
    /// nothing was touched.
    pub fn consume_dirty_state(&self) -> Option<DirtyState> {
        self.write(TreeState::consume_dirty)
    }

    pub fn reset_dirty_tracking(&self) {
        self.write(TreeState::reset_dirty);
    }

    // ─── Queries ────────────────────────────────────────────────────────

    #[must_use]
    pub fn root_key(&self) -> Option<NodeKey> {
        self.read(|st| st.root.map(|r| st.nodes[r].key.clone()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read(|st| st.index.contains_key(key))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.read(|st| st.nodes.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// Detached copy of the subtree at `key`.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Option<VNode> {
        self.read(|st| st.id(key).map(|id| st.snapshot(id)))
    }

    #[must_use]
    pub fn root_snapshot(&self) -> Option<VNode> {
        self.read(|st| st.root.map(|r| st.snapshot(r)))
    }

    #[must_use]
    pub fn props(&self, key: &str) -> Option<Props> {
        self.read(|st| st.id(key).map(|id| st.nodes[id].props.clone()))
    }

    #[must_use]
    pub fn name(&self, key: &str) -> Option<Arc<str>> {
        self.read(|st| st.id(key).map(|id| Arc::clone(&st.nodes[id].name)))
    }

    #[must_use]
    pub fn child_keys(&self, key: &str) -> Option<Vec<NodeKey>> {
        self.read(|st| {
            let id = st.id(key)?;
            Some(
                st.nodes[id]
                    .children
                    .iter()
                    .map(|&c| st.nodes[c].key.clone())
                    .collect(),
            )
        })
    }

    #[must_use]
    pub fn parent_key(&self, key: &str) -> Option<NodeKey> {
        self.read(|st| st.id(key).and_then(|id| st.nodes[id].parent.clone()))
    }

    #[must_use]
    pub fn child_index(&self, key: &str) -> Option<usize> {
        self.read(|st| st.id(key).map(|id| st.nodes[id].child_index))
    }

    #[must_use]
    pub fn is_dirty(&self, key: &str) -> bool {
        self.read(|st| st.id(key).is_some_and(|id| st.nodes[id].dirty))
    }

    #[must_use]
    pub fn subtree_hash(&self, key: &str) -> Option<u64> {
        self.read(|st| st.id(key).map(|id| st.nodes[id].hashes.subtree))
    }

    /// Every key in the tree, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<NodeKey> {
        let mut keys = self.read(|st| st.index.keys().cloned().collect::<Vec<_>>());
        keys.sort();
        keys
    }

    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let (node_count, dirty_count, structural_count) = self.read(|st| {
            (
                st.nodes.len(),
                st.dirty_keys.len(),
                st.structural_keys.len(),
            )
        });
        TreeStats {
            node_count,
            dirty_count,
            structural_count,
            bound_hosts: self.bindings().len(),
            live_refs: self.refs().live_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Element;
    use crate::patch::PatchKind;

    fn item(key: &str, value: i64) -> VNode {
        VNode::new("item").with_key(key).with_prop("value", value)
    }

    fn list_tree(keys: &[&str]) -> VTree {
        let tree = VTree::new();
        tree.attach(VNode::new("list").with_key("list"), None, 0)
            .expect("root");
        for (i, key) in keys.iter().enumerate() {
            tree.attach(item(key, i as i64), Some("list"), usize::MAX)
                .expect("child");
        }
        tree.reset_dirty_tracking();
        tree
    }

    fn assert_consistent(tree: &VTree) {
        let guard = tree.lock();
        let st = guard.borrow();
        assert_eq!(st.nodes.len(), st.index.len());
        for (id, node) in st.nodes.iter() {
            assert_eq!(st.index.get(node.key.as_str()), Some(&id));
            for (i, &child) in node.children.iter().enumerate() {
                assert_eq!(st.nodes[child].child_index, i);
                assert_eq!(st.nodes[child].parent.as_ref(), Some(&node.key));
            }
        }
        drop(st);
        drop(guard);
        if let Some(root) = tree.root_snapshot() {
            let live = tree.subtree_hash(root.key().expect("root key")).expect("hash");
            assert_eq!(live, root.subtree_hash(), "live hash matches fresh snapshot");
        }
    }

    #[test]
    fn add_on_empty_tree_is_structural() {
        let tree = VTree::new();
        let key = tree.add(&Element::new("App"), None).expect("add");
        let dirty = tree.consume_dirty_state().expect("dirty");
        assert!(dirty.structural.contains(&key));
        assert!(tree.consume_dirty_state().is_none());
        assert!(!tree.is_dirty(&key));
    }

    #[test]
    fn add_appends_under_existing_root() {
        let tree = VTree::new();
        tree.add(&Element::new("App").key("app"), None).expect("root");
        let child = tree.add(&Element::new("Panel"), Some("panel")).expect("child");
        assert_eq!(child.as_str(), "panel");
        assert_eq!(tree.parent_key("panel").as_deref(), Some("app"));
        let err = tree.add(&Element::new("Panel"), Some("panel")).unwrap_err();
        assert_eq!(err, VdomError::AlreadyExists { key: "panel".into() });
    }

    #[test]
    fn attach_rejects_collisions_atomically() {
        let tree = list_tree(&["a", "b"]);
        let before = tree.node_count();
        let dup = VNode::new("group")
            .with_key("g")
            .with_child(item("c", 0))
            .with_child(item("a", 1));
        let err = tree.attach(dup, Some("list"), 0).unwrap_err();
        assert_eq!(err, VdomError::AlreadyExists { key: "a".into() });
        assert_eq!(tree.node_count(), before);
        assert!(!tree.contains("g"));
        assert!(!tree.contains("c"));
    }

    #[test]
    fn attach_validates_parent_and_root() {
        let tree = list_tree(&[]);
        assert_eq!(
            tree.attach(item("x", 0), Some("nope"), 0).unwrap_err(),
            VdomError::NotFound { key: "nope".into() }
        );
        assert!(matches!(
            tree.attach(item("x", 0), None, 0),
            Err(VdomError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn move_reorders_and_rehashes() {
        let tree = list_tree(&["a", "b", "c"]);
        let before = tree.subtree_hash("list").expect("hash");
        tree.move_node("c", 0).expect("move");
        let order: Vec<_> = tree.child_keys("list").expect("children");
        assert_eq!(order, vec![NodeKey::from("c"), "a".into(), "b".into()]);
        assert_ne!(tree.subtree_hash("list"), Some(before));
        assert_consistent(&tree);

        let dirty = tree.consume_dirty_state().expect("dirty");
        assert!(dirty.dirty.contains("c"));
        assert!(dirty.structural.contains("list"));
        assert!(!dirty.structural.contains("c"));
    }

    #[test]
    fn move_unknown_key_fails() {
        let tree = list_tree(&["a"]);
        assert_eq!(
            tree.move_node("zz", 0).unwrap_err(),
            VdomError::NotFound { key: "zz".into() }
        );
        assert!(tree.move_node("list", 3).is_ok());
    }

    #[test]
    fn update_props_bubbles_dirty_without_structure() {
        let tree = VTree::new();
        tree.attach(VNode::new("app").with_key("app"), None, 0).expect("root");
        tree.attach(VNode::new("panel").with_key("panel"), Some("app"), 0)
            .expect("panel");
        tree.attach(item("x", 1), Some("panel"), 0).expect("item");
        tree.reset_dirty_tracking();

        tree.update_props("x", &PropDelta::default().with("value", 2))
            .expect("update");
        assert_eq!(
            tree.props("x").and_then(|p| p.get("value").cloned()),
            Some(2i64.into())
        );
        let dirty = tree.consume_dirty_state().expect("dirty");
        for key in ["x", "panel", "app"] {
            assert!(dirty.dirty.contains(key), "{key} dirty");
        }
        assert!(dirty.structural.is_empty());
        assert_consistent(&tree);
        assert!(matches!(
            tree.update_props("missing", &PropDelta::default()),
            Err(VdomError::NotFound { .. })
        ));
    }

    #[test]
    fn detach_returns_subtree_and_frees_keys() {
        let tree = list_tree(&["a", "b"]);
        let detached = tree.detach("a").expect("detached");
        assert_eq!(detached.key().map(NodeKey::as_str), Some("a"));
        assert!(!tree.contains("a"));
        assert_eq!(tree.child_index("b"), Some(0));
        assert!(tree.detach("a").is_none());
        tree.attach(detached, Some("list"), 5).expect("reattach");
        assert_eq!(tree.child_index("a"), Some(1));
        assert_consistent(&tree);
    }

    #[test]
    fn update_with_same_key_patches_in_place() {
        let tree = VTree::new();
        let root = tree
            .add(&Element::new("x").key("x").prop("value", 1), None)
            .expect("add");
        let patches = tree
            .update(&root, &Element::new("x").key("x").prop("value", 2))
            .expect("update");
        assert_eq!(
            patches,
            vec![Patch::update_props("x", PropDelta::default().with("value", 2))]
        );
        assert_eq!(
            tree.props("x").and_then(|p| p.get("value").cloned()),
            Some(2i64.into())
        );
    }

    #[test]
    fn update_of_child_with_new_name_replaces_in_place() {
        let tree = VTree::new();
        tree.add(
            &Element::new("List")
                .key("list")
                .child(Element::new("A").key("first"))
                .child(Element::new("A").key("second")),
            None,
        )
        .expect("add");
        let patches = tree
            .update("first", &Element::new("B").key("first"))
            .expect("update");
        let kinds: Vec<_> = patches.iter().map(Patch::kind).collect();
        assert_eq!(kinds, vec![PatchKind::RemoveNode, PatchKind::AddNode]);
        assert_eq!(tree.name("first").as_deref(), Some("B"));
        assert_eq!(tree.child_index("first"), Some(0));
        assert_consistent(&tree);
    }

    fn two_panels() -> VTree {
        let tree = VTree::new();
        tree.add(
            &Element::new("App")
                .key("app")
                .child(
                    Element::new("Panel")
                        .key("left")
                        .child(Element::new("Item").key("x")),
                )
                .child(Element::new("Panel").key("right")),
            None,
        )
        .expect("add");
        tree.reset_dirty_tracking();
        tree
    }

    #[test]
    fn update_refuses_keys_held_by_another_subtree() {
        let tree = two_panels();
        let before = tree.node_count();
        let err = tree
            .update(
                "right",
                &Element::new("Panel")
                    .key("right")
                    .child(Element::new("Item").key("x")),
            )
            .unwrap_err();
        assert_eq!(err, VdomError::AlreadyExists { key: "x".into() });
        assert_eq!(tree.child_keys("right"), Some(Vec::new()));
        assert_eq!(tree.parent_key("x").as_deref(), Some("left"));
        assert_eq!(tree.node_count(), before);
        assert!(tree.consume_dirty_state().is_none());
        assert_consistent(&tree);
    }

    #[test]
    fn update_refuses_repeated_keys() {
        let tree = list_tree(&["a"]);
        let err = tree
            .update(
                "list",
                &Element::new("list")
                    .key("list")
                    .child(Element::new("item").key("a"))
                    .child(Element::new("item").key("a")),
            )
            .unwrap_err();
        assert_eq!(err, VdomError::AlreadyExists { key: "a".into() });
        assert_eq!(
            tree.child_keys("list"),
            Some(vec![NodeKey::from("a")])
        );
        assert_consistent(&tree);
    }

    #[test]
    fn update_may_move_keys_within_its_own_subtree() {
        let tree = two_panels();
        tree.update(
            "left",
            &Element::new("Panel").key("left").child(
                Element::new("Group")
                    .key("g")
                    .child(Element::new("Item").key("y")),
            ),
        )
        .expect("update");
        assert!(!tree.contains("x"));
        assert_eq!(tree.parent_key("y").as_deref(), Some("g"));
        assert_consistent(&tree);
    }

    #[test]
    fn stable_keys_may_not_use_the_generated_prefix() {
        let tree = list_tree(&[]);
        let err = tree.attach(item("#00000001", 0), Some("list"), 0).unwrap_err();
        assert!(matches!(err, VdomError::InvalidOperation { .. }), "{err:?}");
        let err = tree
            .update(
                "list",
                &Element::new("list")
                    .key("list")
                    .child(Element::new("item").key("#x")),
            )
            .unwrap_err();
        assert!(matches!(err, VdomError::InvalidOperation { .. }), "{err:?}");
        // Plain hex stays usable as an explicit key next to generated ones.
        tree.attach(item("00000001", 0), Some("list"), 0).expect("hex key");
        tree.attach(VNode::new("spacer"), Some("list"), usize::MAX)
            .expect("generated key");
        assert_eq!(tree.child_keys("list").map(|k| k.len()), Some(2));
    }

    #[test]
    fn shared_components_follow_mount_and_unmount() {
        let registry = Arc::new(ComponentRefs::new());
        let tree = VTree::with_patcher(Patcher::new().with_refs(Arc::clone(&registry)));
        let app: ComponentRef = Arc::new(Element::new("App").key("app"));
        tree.add_shared(&app, None).expect("add");
        let row: ComponentRef = Arc::new(Element::new("Row").key("row"));
        tree.add_shared(&row, None).expect("add");
        let found = tree.get_component("row").expect("registered");
        assert!(Arc::ptr_eq(&found, &row));

        // Same name: the key survives and now resolves to the new description.
        let row2: ComponentRef = Arc::new(Element::new("Row").key("row").prop("h", 2));
        tree.update_shared("row", &row2).expect("update");
        assert!(tree.get_component("row").is_some_and(|c| Arc::ptr_eq(&c, &row2)));

        // New name and key: the old key is unmounted and forgotten.
        let col: ComponentRef = Arc::new(Element::new("Col").key("col"));
        tree.update_shared("row", &col).expect("replace");
        assert!(tree.get_component("row").is_none());
        assert!(tree.get_component("col").is_some_and(|c| Arc::ptr_eq(&c, &col)));
        assert_eq!(tree.refs().keys(), vec![NodeKey::from("app"), "col".into()]);

        assert!(tree.remove("col"));
        assert_eq!(registry.keys(), vec![NodeKey::from("app")]);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let tree = list_tree(&["a"]);
        assert!(!tree.remove("zz"));
        assert!(tree.remove("a"));
        assert!(!tree.contains("a"));
    }

    #[test]
    fn update_unknown_key_fails() {
        let tree = VTree::new();
        assert!(matches!(
            tree.update("ghost", &Element::new("X")),
            Err(VdomError::NotFound { .. })
        ));
    }

    #[test]
    fn snapshot_hashes_match_detached_build() {
        let tree = list_tree(&["a", "b", "c"]);
        tree.update_props("b", &PropDelta::default().without("value"))
            .expect("update");
        tree.move_node("a", 2).expect("move");
        assert_consistent(&tree);
        let expected = VNode::new("list")
            .with_key("list")
            .with_child(VNode::new("item").with_key("b"))
            .with_child(item("c", 2))
            .with_child(item("a", 0));
        assert_eq!(
            tree.root_snapshot().map(|n| n.subtree_hash()),
            Some(expected.subtree_hash())
        );
    }

    #[test]
    fn callbacks_may_reenter_under_lock() {
        let tree = list_tree(&["a"]);
        let _outer = tree.lock();
        assert_eq!(tree.node_count(), 2);
        tree.update_props("a", &PropDelta::default().with("value", 9))
            .expect("re-entrant write");
    }
}
