#![forbid(unsafe_code)]

//! Tree diffing.
//!
//! [`Reconciler`] compares two snapshots and emits the [`Patch`] stream that
//! turns the old one into the new one. It never touches a live tree, so it
//! needs no lock.
//!
//! # Algorithm
//!
//! 1. Root names differ (or one side is absent): a single `ReplaceRoot`.
//! 2. Equal `subtree_hash` and neither key dirty: nothing to do.
//! 3. Props hashes differ: one `UpdateProps` carrying the [`PropDelta`].
//! 4. Child hashes differ: reconcile the child lists.
//!    - *Keyed* lists (any stably keyed child on either side) match children
//!      by key; keyless children pair up positionally among themselves. A
//!      matched pair whose names differ is removed and re-added. Unmatched
//!      old children are removed. Matched children whose old indices form
//!      the longest increasing run stay put; every other matched child
//!      moves exactly once, and unmatched new children are added.
//!    - *Positional* lists pair children by index.
//! 5. Every `RemoveNode` is stably hoisted to the front of the stream, so a
//!    key that moves between parents is released before it is re-added.
//!
//! Placement patches of one list are emitted right to left. Each one inserts
//! its node immediately before the node that follows it in the new order,
//! and its index is that position at the moment of application.
//!
//! # Tie-break
//!
//! When several increasing runs are longest, the kept run is the one built
//! by patience sorting with lower-bound replacement, read back from the last
//! tail: it ends at the smallest possible old index, and each earlier member
//! is the smallest tail available when its successor was placed. For
//! `a b c -> b a c` that keeps `a, c` and moves `b`.
//!
//! # Failure Modes
//!
//! [`VdomError::InvalidOperation`] when a patch would have to target a node
//! without a key. A keyless diff *root* may still receive prop updates,
//! which are emitted with `key: None`.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::error::{Result, VdomError};
use crate::key::NodeKey;
use crate::node::{VNode, hash_key};
use crate::patch::{Patch, PatchKind};
use crate::props::PropDelta;

/// Keys touched since the last consume, as reported by
/// [`VTree::consume_dirty_state`](crate::tree::VTree::consume_dirty_state).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyState {
    /// Nodes (and their ancestors) whose content changed.
    pub dirty: AHashSet<NodeKey>,
    /// Nodes whose child list changed.
    pub structural: AHashSet<NodeKey>,
}

impl DirtyState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.structural.is_empty()
    }

    #[must_use]
    pub fn is_dirty(&self, key: Option<&NodeKey>) -> bool {
        key.is_some_and(|k| self.dirty.contains(k))
    }

    #[must_use]
    pub fn is_structural(&self, key: Option<&NodeKey>) -> bool {
        key.is_some_and(|k| self.structural.contains(k))
    }

    /// Union with another state.
    pub fn merge(&mut self, other: DirtyState) {
        self.dirty.extend(other.dirty);
        self.structural.extend(other.structural);
    }

    /// Order-independent digest of both sets.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let fold = |set: &AHashSet<NodeKey>| set.iter().fold(0u64, |acc, k| acc ^ hash_key(k));
        fold(&self.dirty) ^ fold(&self.structural).rotate_left(17)
    }
}

/// How child lists are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildMatching {
    /// Keyed when any child has a stable key, positional otherwise.
    #[default]
    Auto,
    /// Always by index.
    Positional,
}

/// Snapshot differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    matching: ChildMatching,
    prune_clean: bool,
}

impl Reconciler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            matching: ChildMatching::Auto,
            prune_clean: false,
        }
    }

    #[must_use]
    pub const fn with_matching(mut self, matching: ChildMatching) -> Self {
        self.matching = matching;
        self
    }

    /// With a dirty state supplied, revisit only dirty children of parents
    /// whose child list did not change.
    #[must_use]
    pub const fn with_pruning(mut self, prune_clean: bool) -> Self {
        self.prune_clean = prune_clean;
        self
    }

    #[must_use]
    pub const fn matching(&self) -> ChildMatching {
        self.matching
    }

    /// Diff `old` against `new`.
    pub fn reconcile(
        &self,
        old: Option<&VNode>,
        new: Option<&VNode>,
        dirty: Option<&DirtyState>,
    ) -> Result<Vec<Patch>> {
        let mut out = Vec::new();
        self.reconcile_into(old, new, dirty, &mut out)?;
        Ok(out)
    }

    /// Diff into a caller-owned buffer, which is cleared first. On error the
    /// buffer holds an unspecified prefix.
    pub fn reconcile_into(
        &self,
        old: Option<&VNode>,
        new: Option<&VNode>,
        dirty: Option<&DirtyState>,
        out: &mut Vec<Patch>,
    ) -> Result<()> {
        out.clear();
        let (old, new) = match (old, new) {
            (None, None) => return Ok(()),
            (None, Some(new)) => {
                out.push(Patch::ReplaceRoot {
                    node: Some(Arc::new(new.clone())),
                });
                return Ok(());
            }
            (Some(_), None) => {
                out.push(Patch::ReplaceRoot { node: None });
                return Ok(());
            }
            (Some(old), Some(new)) => (old, new),
        };
        if old.name() != new.name() {
            tracing::trace!(message = "vdom.reconcile.replace_root", from = old.name(), to = new.name());
            out.push(Patch::ReplaceRoot {
                node: Some(Arc::new(new.clone())),
            });
            return Ok(());
        }

        let mut walk = Walk {
            matching: self.matching,
            prune_clean: self.prune_clean,
            dirty,
            out,
        };
        walk.node(old, new, 0)?;
        out.sort_by_key(|patch| patch.kind() != PatchKind::RemoveNode);
        Ok(())
    }
}

struct Walk<'a> {
    matching: ChildMatching,
    prune_clean: bool,
    dirty: Option<&'a DirtyState>,
    out: &'a mut Vec<Patch>,
}

fn keyless(node: &VNode, action: &str) -> VdomError {
    VdomError::invalid(format!(
        "cannot {action} keyless <{}> node; structural identity required",
        node.name()
    ))
}

fn require_key<'n>(node: &'n VNode, action: &str) -> Result<&'n NodeKey> {
    node.key().ok_or_else(|| keyless(node, action))
}

impl Walk<'_> {
    fn forced(&self, old: &VNode, new: &VNode) -> bool {
        self.dirty
            .is_some_and(|d| d.is_dirty(old.key()) || d.is_dirty(new.key()))
    }

    fn node(&mut self, old: &VNode, new: &VNode, depth: usize) -> Result<()> {
        let forced = self.forced(old, new);
        if old.subtree_hash() == new.subtree_hash() && !forced {
            return Ok(());
        }
        if old.props_hash() != new.props_hash() || forced {
            let delta = PropDelta::between(old.props(), new.props());
            if !delta.is_empty() {
                let key = match old.key() {
                    Some(key) => Some(key.clone()),
                    None if depth == 0 => None,
                    None => return Err(keyless(old, "update props of")),
                };
                self.out.push(Patch::UpdateProps { key, delta });
            }
        }
        if old.child_hash() != new.child_hash() || forced {
            self.children(old, new, depth)?;
        }
        Ok(())
    }

    fn children(&mut self, old: &VNode, new: &VNode, depth: usize) -> Result<()> {
        if self.prune_clean
            && let Some(dirty) = self.dirty
            && !dirty.is_structural(old.key())
            && !dirty.is_structural(new.key())
            && self.dirty_children(old, new, dirty, depth)?
        {
            return Ok(());
        }
        let keyed = self.matching == ChildMatching::Auto
            && (old.children().iter().any(|c| c.is_keyed())
                || new.children().iter().any(|c| c.is_keyed()));
        if keyed {
            self.keyed_children(old, new, depth)
        } else {
            self.positional_children(old, new, depth)
        }
    }

    /// Revisit only dirty children. Returns `false` when the lists disagree
    /// with the dirty state and a full pass is needed.
    fn dirty_children(
        &mut self,
        old: &VNode,
        new: &VNode,
        dirty: &DirtyState,
        depth: usize,
    ) -> Result<bool> {
        if old.children().len() != new.children().len() {
            return Ok(false);
        }
        let old_by_key: AHashMap<&NodeKey, &VNode> = old
            .children()
            .iter()
            .filter_map(|c| c.key().map(|k| (k, &**c)))
            .collect();
        let mut pairs = Vec::new();
        for child in new.children() {
            let Some(key) = child.key() else { continue };
            if !dirty.dirty.contains(key) {
                continue;
            }
            match old_by_key.get(key) {
                Some(prev) if prev.name() == child.name() => pairs.push((*prev, &**child)),
                _ => return Ok(false),
            }
        }
        for (prev, next) in pairs {
            self.node(prev, next, depth + 1)?;
        }
        Ok(true)
    }

    fn keyed_children(&mut self, old: &VNode, new: &VNode, depth: usize) -> Result<()> {
        let old_children = old.children();
        let new_children = new.children();

        let mut old_keyed: AHashMap<&NodeKey, usize> = AHashMap::with_capacity(old_children.len());
        let mut old_unkeyed = Vec::new();
        for (i, child) in old_children.iter().enumerate() {
            match child.stable_key() {
                Some(key) => {
                    old_keyed.insert(key, i);
                }
                None => old_unkeyed.push(i),
            }
        }

        let mut matched = vec![false; old_children.len()];
        let mut sources: Vec<Option<usize>> = Vec::with_capacity(new_children.len());
        let mut unkeyed_cursor = 0;
        for child in new_children {
            let candidate = match child.stable_key() {
                Some(key) => old_keyed.get(key).copied().filter(|&i| !matched[i]),
                None => {
                    let next = old_unkeyed.get(unkeyed_cursor).copied();
                    unkeyed_cursor += usize::from(next.is_some());
                    next
                }
            };
            let source = candidate.filter(|&i| old_children[i].name() == child.name());
            if let Some(i) = source {
                matched[i] = true;
            }
            sources.push(source);
        }

        for (i, child) in old_children.iter().enumerate() {
            if !matched[i] {
                let key = require_key(child, "remove")?;
                self.out.push(Patch::RemoveNode { key: key.clone() });
            }
        }

        let keep = stable_positions(&sources);

        // Live order during placement, without simulating the list: a kept
        // or not yet placed child sorts by `(old index, n_new)`, a placed
        // child by `(old index of the next kept child, its new position)`.
        let n_old = old_children.len();
        let n_new = new_children.len();
        let mut anchors = vec![n_old; n_new];
        let mut next_kept = n_old;
        for j in (0..n_new).rev() {
            anchors[j] = next_kept;
            if keep[j]
                && let Some(i) = sources[j]
            {
                next_kept = i;
            }
        }
        let mut order: Vec<(usize, usize)> = (0..n_old)
            .filter(|&i| matched[i])
            .map(|i| (i, n_new))
            .chain((0..n_new).filter(|&j| !keep[j]).map(|j| (anchors[j], j)))
            .collect();
        order.sort_unstable();
        let rank = |slot: (usize, usize)| order.partition_point(|&o| o < slot);
        let mut live = OrderIndex::new(order.len());
        for i in (0..n_old).filter(|&i| matched[i]) {
            live.add(rank((i, n_new)), 1);
        }

        for j in (0..n_new).rev() {
            if keep[j] {
                continue;
            }
            if let Some(i) = sources[j] {
                live.add(rank((i, n_new)), -1);
            }
            let slot = rank((anchors[j], j));
            let at = live.before(slot);
            live.add(slot, 1);
            match sources[j] {
                Some(i) => {
                    let key = require_key(&old_children[i], "move")?;
                    self.out.push(Patch::MoveNode {
                        key: key.clone(),
                        index: at,
                    });
                }
                None => {
                    let parent = require_key(old, "add children to")?;
                    self.out.push(Patch::AddNode {
                        parent: Some(parent.clone()),
                        index: at,
                        node: Arc::clone(&new_children[j]),
                    });
                }
            }
        }

        for (j, child) in new_children.iter().enumerate() {
            if let Some(i) = sources[j] {
                self.node(&old_children[i], child, depth + 1)?;
            }
        }
        Ok(())
    }

    fn positional_children(&mut self, old: &VNode, new: &VNode, depth: usize) -> Result<()> {
        let old_children = old.children();
        let new_children = new.children();
        let common = old_children.len().min(new_children.len());

        let mut pairs = Vec::with_capacity(common);
        let mut adds = Vec::new();
        for i in 0..common {
            if old_children[i].name() == new_children[i].name() {
                pairs.push(i);
            } else {
                let key = require_key(&old_children[i], "replace")?;
                self.out.push(Patch::RemoveNode { key: key.clone() });
                adds.push(i);
            }
        }
        for child in &old_children[common..] {
            let key = require_key(child, "remove")?;
            self.out.push(Patch::RemoveNode { key: key.clone() });
        }
        adds.extend(common..new_children.len());
        if !adds.is_empty() {
            let parent = require_key(old, "add children to")?;
            for j in adds {
                self.out.push(Patch::AddNode {
                    parent: Some(parent.clone()),
                    index: j,
                    node: Arc::clone(&new_children[j]),
                });
            }
        }

        for i in pairs {
            self.node(&old_children[i], &new_children[i], depth + 1)?;
        }
        Ok(())
    }
}

/// Fenwick tree over order slots; counts the occupied slots before a given
/// one in logarithmic time.
struct OrderIndex {
    counts: Vec<isize>,
}

impl OrderIndex {
    fn new(len: usize) -> Self {
        Self {
            counts: vec![0; len + 1],
        }
    }

    fn add(&mut self, slot: usize, delta: isize) {
        let mut i = slot + 1;
        while i < self.counts.len() {
            self.counts[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    /// Occupied slots strictly before `slot`.
    fn before(&self, slot: usize) -> usize {
        let mut sum = 0;
        let mut i = slot;
        while i > 0 {
            sum += self.counts[i];
            i &= i - 1;
        }
        sum.unsigned_abs()
    }
}

/// Mark the positions of `sources` that lie on the kept longest increasing
/// run of old indices. `None` entries are never kept.
pub(crate) fn stable_positions(sources: &[Option<usize>]) -> Vec<bool> {
    let seq: Vec<(usize, usize)> = sources
        .iter()
        .enumerate()
        .filter_map(|(pos, value)| value.map(|v| (pos, v)))
        .collect();
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &(_, value)) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t].1 < value);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }
    let mut keep = vec![false; sources.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep[seq[i].0] = true;
        cursor = prev[i];
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::props;

    fn item(key: &str) -> VNode {
        VNode::new("item").with_key(key).with_prop("label", key)
    }

    fn list(keys: &[&str]) -> VNode {
        VNode::new("list")
            .with_key("list")
            .with_children(keys.iter().map(|k| item(k)))
    }

    fn diff(old: &VNode, new: &VNode) -> Vec<Patch> {
        Reconciler::new()
            .reconcile(Some(old), Some(new), None)
            .expect("reconcile")
    }

    /// Replays keyed placement patches over a key list.
    fn replay(start: &[&str], patches: &[Patch]) -> Vec<String> {
        let mut keys: Vec<String> = start.iter().map(|s| (*s).to_owned()).collect();
        for patch in patches {
            match patch {
                Patch::RemoveNode { key } => keys.retain(|k| k != key.as_str()),
                Patch::MoveNode { key, index } => {
                    let pos = keys.iter().position(|k| k == key.as_str()).expect("present");
                    let k = keys.remove(pos);
                    keys.insert(*index, k);
                }
                Patch::AddNode { index, node, .. } => {
                    keys.insert(*index, node.key().expect("key").to_string());
                }
                _ => {}
            }
        }
        keys
    }

    #[test]
    fn identical_trees_produce_nothing() {
        let a = list(&["a", "b"]);
        assert!(diff(&a, &a.clone()).is_empty());
    }

    #[test]
    fn swap_is_a_single_move() {
        let patches = diff(&list(&["a", "b", "c"]), &list(&["b", "a", "c"]));
        assert_eq!(patches, vec![Patch::move_node("b", 0)]);
    }

    #[test]
    fn prop_change_is_one_update() {
        let old = VNode::new("x").with_key("x").with_prop("value", 1);
        let new = VNode::new("x").with_key("x").with_prop("value", 2);
        assert_eq!(
            diff(&old, &new),
            vec![Patch::update_props("x", PropDelta::setting(props([("value", 2)])))]
        );
    }

    #[test]
    fn root_name_change_replaces_root() {
        let patches = diff(&VNode::new("A"), &VNode::new("B"));
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].kind(), PatchKind::ReplaceRoot);
    }

    #[test]
    fn absent_sides_replace_root() {
        let r = Reconciler::new();
        let node = VNode::new("A");
        assert_eq!(
            r.reconcile(None, Some(&node), None).expect("ok")[0].kind(),
            PatchKind::ReplaceRoot
        );
        assert_eq!(
            r.reconcile(Some(&node), None, None).expect("ok"),
            vec![Patch::ReplaceRoot { node: None }]
        );
        assert!(r.reconcile(None, None, None).expect("ok").is_empty());
    }

    #[test]
    fn mixed_add_remove_move_replays() {
        let old = ["a", "b", "c", "d", "e"];
        let new = ["e", "x", "b", "a", "d", "y"];
        let patches = diff(&list(&old), &list(&new));
        assert_eq!(replay(&old, &patches), new.map(str::to_owned).to_vec());
        let removes = patches.iter().take_while(|p| p.kind() == PatchKind::RemoveNode).count();
        assert_eq!(removes, 1, "only c is removed, and first");
    }

    #[test]
    fn reverse_moves_all_but_one() {
        let old = ["a", "b", "c", "d"];
        let new = ["d", "c", "b", "a"];
        let patches = diff(&list(&old), &list(&new));
        assert!(patches.iter().all(|p| p.kind() == PatchKind::MoveNode));
        assert_eq!(patches.len(), 3);
        assert_eq!(replay(&old, &patches), new.map(str::to_owned).to_vec());
    }

    #[test]
    fn long_reversal_with_interleaved_adds_replays() {
        let n = 2_000;
        let old: Vec<String> = (0..n).map(|i| format!("k{i}")).collect();
        let mut new: Vec<String> = Vec::with_capacity(n + n / 10);
        for (i, key) in old.iter().rev().enumerate() {
            if i % 10 == 0 {
                new.push(format!("fresh{i}"));
            }
            new.push(key.clone());
        }
        let old_refs: Vec<&str> = old.iter().map(String::as_str).collect();
        let new_refs: Vec<&str> = new.iter().map(String::as_str).collect();
        let patches = diff(&list(&old_refs), &list(&new_refs));
        let moves = patches.iter().filter(|p| p.kind() == PatchKind::MoveNode).count();
        let adds = patches.iter().filter(|p| p.kind() == PatchKind::AddNode).count();
        assert_eq!(moves, n - 1);
        assert_eq!(adds, n / 10);
        assert_eq!(replay(&old_refs, &patches), new);
    }

    #[test]
    fn scrambled_lists_replay() {
        let old: Vec<String> = (0..300).map(|i| format!("k{i}")).collect();
        // Multiplying by a unit mod 300 permutes the indices; drop every
        // seventh and append a few new keys.
        let mut new: Vec<String> = (0..300)
            .map(|i| (i * 7 + 3) % 300)
            .filter(|i| i % 7 != 0)
            .map(|i| format!("k{i}"))
            .collect();
        new.insert(5, "n0".into());
        new.insert(100, "n1".into());
        new.push("n2".into());
        let old_refs: Vec<&str> = old.iter().map(String::as_str).collect();
        let new_refs: Vec<&str> = new.iter().map(String::as_str).collect();
        let patches = diff(&list(&old_refs), &list(&new_refs));
        assert_eq!(replay(&old_refs, &patches), new);
    }

    #[test]
    fn nested_update_inside_moved_child() {
        let old = list(&["a", "b"]);
        let new = VNode::new("list")
            .with_key("list")
            .with_child(item("b").with_prop("hot", true))
            .with_child(item("a"));
        let patches = diff(&old, &new);
        assert_eq!(
            patches,
            vec![
                Patch::move_node("b", 0),
                Patch::update_props("b", PropDelta::default().with("hot", true)),
            ]
        );
    }

    #[test]
    fn renamed_keyed_child_is_replaced() {
        let old = list(&["a"]);
        let new = VNode::new("list")
            .with_key("list")
            .with_child(VNode::new("other").with_key("a"));
        let kinds: Vec<_> = diff(&old, &new).iter().map(Patch::kind).collect();
        assert_eq!(kinds, vec![PatchKind::RemoveNode, PatchKind::AddNode]);
    }

    #[test]
    fn positional_lists_pair_by_index() {
        let mut old = VNode::new("row")
            .with_key("row")
            .with_child(VNode::text("a"))
            .with_child(VNode::text("b"))
            .with_child(VNode::new("icon"));
        old.ensure_keys();
        let new = VNode::new("row")
            .with_key("row")
            .with_child(VNode::text("a"))
            .with_child(VNode::text("B"));
        let patches = diff(&old, &new);
        let kinds: Vec<_> = patches.iter().map(Patch::kind).collect();
        assert_eq!(kinds, vec![PatchKind::RemoveNode, PatchKind::UpdateProps]);
        assert_eq!(patches[1].key(), old.children()[1].key());
    }

    #[test]
    fn keyless_nested_update_is_rejected() {
        let old = VNode::new("row").with_child(VNode::text("a"));
        let new = VNode::new("row").with_child(VNode::text("b"));
        assert!(matches!(
            Reconciler::new().reconcile(Some(&old), Some(&new), None),
            Err(VdomError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn keyless_root_update_targets_root() {
        let old = VNode::new("row").with_prop("w", 1);
        let new = VNode::new("row").with_prop("w", 2);
        assert_eq!(
            diff(&old, &new),
            vec![Patch::UpdateProps {
                key: None,
                delta: PropDelta::default().with("w", 2),
            }]
        );
    }

    #[test]
    fn removes_are_hoisted_across_parents() {
        let old = VNode::new("root")
            .with_key("root")
            .with_child(VNode::new("left").with_key("left").with_child(item("k")))
            .with_child(VNode::new("right").with_key("right"));
        let new = VNode::new("root")
            .with_key("root")
            .with_child(VNode::new("left").with_key("left"))
            .with_child(VNode::new("right").with_key("right").with_child(item("k")));
        let patches = diff(&old, &new);
        assert_eq!(patches[0], Patch::remove_node("k"));
        assert_eq!(patches[1].kind(), PatchKind::AddNode);
    }

    #[test]
    fn dirty_revisit_of_equal_trees_is_empty() {
        let node = list(&["a"]);
        let mut dirty = DirtyState::default();
        dirty.dirty.extend([NodeKey::from("list"), NodeKey::from("a")]);
        let patches = Reconciler::new()
            .reconcile(Some(&node), Some(&node), Some(&dirty))
            .expect("ok");
        assert!(patches.is_empty());
    }

    #[test]
    fn pruning_visits_only_dirty_children() {
        let old = list(&["a", "b"]);
        let new = VNode::new("list")
            .with_key("list")
            .with_child(item("a").with_prop("v", 1))
            .with_child(item("b").with_prop("v", 1));
        let mut dirty = DirtyState::default();
        dirty.dirty.extend([NodeKey::from("list"), NodeKey::from("b")]);
        let patches = Reconciler::new()
            .with_pruning(true)
            .reconcile(Some(&old), Some(&new), Some(&dirty))
            .expect("ok");
        assert_eq!(
            patches,
            vec![Patch::update_props("b", PropDelta::default().with("v", 1))]
        );

        dirty.structural.insert("list".into());
        let full = Reconciler::new()
            .with_pruning(true)
            .reconcile(Some(&old), Some(&new), Some(&dirty))
            .expect("ok");
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn forced_positional_ignores_keys() {
        let patches = Reconciler::new()
            .with_matching(ChildMatching::Positional)
            .reconcile(
                Some(&list(&["a", "b"])),
                Some(&list(&["b", "a"])),
                None,
            )
            .expect("ok");
        assert!(patches.iter().all(|p| p.kind() == PatchKind::UpdateProps));
        assert_eq!(patches.len(), 2);
    }

    #[test]
    fn stable_positions_tie_break() {
        assert_eq!(
            stable_positions(&[Some(1), Some(0), Some(2)]),
            vec![false, true, true]
        );
        assert_eq!(
            stable_positions(&[Some(3), None, Some(1), Some(2), Some(0)]),
            vec![false, false, true, true, false]
        );
        assert!(stable_positions(&[]).is_empty());
    }

    #[test]
    fn fingerprint_ignores_order() {
        let mut a = DirtyState::default();
        a.dirty.extend([NodeKey::from("x"), NodeKey::from("y")]);
        let mut b = DirtyState::default();
        b.dirty.extend([NodeKey::from("y"), NodeKey::from("x")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.structural.insert("x".into());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
