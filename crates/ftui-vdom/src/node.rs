#![forbid(unsafe_code)]

//! Snapshot nodes and structural hashing.
//!
//! A [`VNode`] is an immutable-leaning description of one subtree. Children
//! are shared (`Arc<VNode>`), so cloning a snapshot or embedding a subtree in
//! a [`Patch`](crate::patch::Patch) costs one pointer bump per direct child.
//!
//! # Invariants
//!
//! Every builder and mutator recomputes the node's cached hashes before it
//! returns, so for any `VNode` reachable from safe code:
//!
//! - `props_hash` is the hash of the sorted props,
//! - `child_hash` folds `(index, stable key, child.subtree_hash)` over the
//!   children, so a reorder of keyed children changes it,
//! - `subtree_hash = H(name, props_hash, child_hash)`,
//! - `identity_hash` covers every key in the subtree, generated ones
//!   included.
//!
//! Generated keys never feed `subtree_hash`: converting the same keyless
//! description twice yields equal subtree hashes even though the keys differ.
//! Hashes are seeded deterministically and are stable within a build.

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::{Arc, LazyLock};

use ahash::{AHasher, RandomState};

use crate::key::{KeySource, NodeKey, generate_key};
use crate::props::{PropValue, Props};

/// Name of nodes created from text children.
pub const TEXT_NODE: &str = "text";
/// Prop carrying the content of a text node.
pub const TEXT_CONTENT: &str = "content";

static HASH_STATE: LazyLock<RandomState> = LazyLock::new(|| {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
});

#[inline]
fn hasher() -> AHasher {
    HASH_STATE.build_hasher()
}

pub(crate) fn props_hash(props: &Props) -> u64 {
    let mut h = hasher();
    props.hash(&mut h);
    h.finish()
}

pub(crate) fn child_slot_hash(index: usize, stable_key: Option<&NodeKey>, subtree_hash: u64) -> u64 {
    let mut h = hasher();
    h.write_usize(index);
    match stable_key {
        Some(key) => {
            h.write_u8(1);
            key.as_str().hash(&mut h);
        }
        None => h.write_u8(0),
    }
    h.write_u64(subtree_hash);
    h.finish()
}

pub(crate) fn subtree_hash(name: &str, props_hash: u64, child_hash: u64) -> u64 {
    let mut h = hasher();
    name.hash(&mut h);
    h.write_u64(props_hash);
    h.write_u64(child_hash);
    h.finish()
}

pub(crate) fn identity_slot_hash(index: usize, identity_hash: u64) -> u64 {
    let mut h = hasher();
    h.write_usize(index);
    h.write_u64(identity_hash);
    h.finish()
}

pub(crate) fn identity_hash(key: Option<&NodeKey>, children_identity: u64) -> u64 {
    let mut h = hasher();
    key.map(NodeKey::as_str).hash(&mut h);
    h.write_u64(children_identity);
    h.finish()
}

pub(crate) fn hash_key(key: &str) -> u64 {
    let mut h = hasher();
    key.hash(&mut h);
    h.finish()
}

/// Cached hash bundle shared by snapshot and live nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Hashes {
    pub(crate) props: u64,
    pub(crate) children: u64,
    pub(crate) subtree: u64,
    pub(crate) identity: u64,
    pub(crate) node_count: usize,
    pub(crate) has_keyed_children: bool,
}

/// Per-child inputs to [`Hashes::compute`].
pub(crate) struct ChildHashInput<'a> {
    pub(crate) stable_key: Option<&'a NodeKey>,
    pub(crate) subtree: u64,
    pub(crate) identity: u64,
    pub(crate) node_count: usize,
    pub(crate) keyed: bool,
}

impl Hashes {
    pub(crate) fn compute<'a>(
        name: &str,
        props_hash: u64,
        key: Option<&NodeKey>,
        children: impl Iterator<Item = ChildHashInput<'a>>,
    ) -> Self {
        let mut child_hash = 0u64;
        let mut child_identity = 0u64;
        let mut node_count = 1usize;
        let mut has_keyed_children = false;
        for (index, child) in children.enumerate() {
            child_hash ^= child_slot_hash(index, child.stable_key, child.subtree);
            child_identity ^= identity_slot_hash(index, child.identity);
            node_count += child.node_count;
            has_keyed_children |= child.keyed;
        }
        Self {
            props: props_hash,
            children: child_hash,
            subtree: subtree_hash(name, props_hash, child_hash),
            identity: identity_hash(key, child_identity),
            node_count,
            has_keyed_children,
        }
    }
}

/// One node of a detached tree snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct VNode {
    name: Arc<str>,
    props: Props,
    children: Vec<Arc<VNode>>,
    key: Option<NodeKey>,
    key_source: KeySource,
    hashes: Hashes,
}

impl VNode {
    /// Empty keyless node named `name`.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::assemble(name.into(), Props::new(), Vec::new(), None, KeySource::Generated)
    }

    /// Keyless text node.
    #[must_use]
    pub fn text(content: impl Into<PropValue>) -> Self {
        let mut props = Props::new();
        props.insert(TEXT_CONTENT.to_owned(), content.into());
        Self::assemble(Arc::from(TEXT_NODE), props, Vec::new(), None, KeySource::Generated)
    }

    pub(crate) fn assemble(
        name: Arc<str>,
        props: Props,
        children: Vec<Arc<VNode>>,
        key: Option<NodeKey>,
        key_source: KeySource,
    ) -> Self {
        let mut node = Self {
            name,
            props,
            children,
            key,
            key_source,
            hashes: Hashes::default(),
        };
        node.hashes.props = props_hash(&node.props);
        node.rehash();
        node
    }

    /// Builder: explicit key.
    #[must_use]
    pub fn with_key(self, key: impl Into<NodeKey>) -> Self {
        self.with_key_from(key, KeySource::Explicit)
    }

    /// Builder: key with a given source.
    #[must_use]
    pub fn with_key_from(mut self, key: impl Into<NodeKey>, source: KeySource) -> Self {
        self.set_key(key.into(), source);
        self
    }

    /// Builder: set one prop.
    #[must_use]
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self.hashes.props = props_hash(&self.props);
        self.rehash();
        self
    }

    /// Builder: replace all props.
    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self.hashes.props = props_hash(&self.props);
        self.rehash();
        self
    }

    /// Builder: append a child.
    #[must_use]
    pub fn with_child(mut self, child: VNode) -> Self {
        self.children.push(Arc::new(child));
        self.rehash();
        self
    }

    /// Builder: append children.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children.into_iter().map(Arc::new));
        self.rehash();
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[Arc<VNode>] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&NodeKey> {
        self.key.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn key_source(&self) -> KeySource {
        self.key_source
    }

    /// The key, if it survives re-conversion.
    #[must_use]
    pub fn stable_key(&self) -> Option<&NodeKey> {
        self.key.as_ref().filter(|_| self.key_source.is_stable())
    }

    /// Whether this node takes part in keyed matching.
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.stable_key().is_some()
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        &*self.name == TEXT_NODE
    }

    #[inline]
    #[must_use]
    pub const fn props_hash(&self) -> u64 {
        self.hashes.props
    }

    #[inline]
    #[must_use]
    pub const fn child_hash(&self) -> u64 {
        self.hashes.children
    }

    #[inline]
    #[must_use]
    pub const fn subtree_hash(&self) -> u64 {
        self.hashes.subtree
    }

    #[inline]
    #[must_use]
    pub const fn identity_hash(&self) -> u64 {
        self.hashes.identity
    }

    /// Nodes in this subtree, including `self`.
    #[inline]
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.hashes.node_count
    }

    /// Whether any child list in this subtree has a stably keyed member.
    #[inline]
    #[must_use]
    pub const fn has_keyed_children(&self) -> bool {
        self.hashes.has_keyed_children
    }

    /// Pre-order traversal of this subtree.
    pub fn descendants(&self) -> impl Iterator<Item = &VNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|c| &**c));
            Some(node)
        })
    }

    pub(crate) fn set_key(&mut self, key: NodeKey, source: KeySource) {
        self.key = Some(key);
        self.key_source = source;
        self.rehash();
    }

    /// Give every keyless node in the subtree a generated key.
    pub(crate) fn ensure_keys(&mut self) {
        for child in &mut self.children {
            if child.descendants().any(|n| n.key.is_none()) {
                Arc::make_mut(child).ensure_keys();
            }
        }
        if self.key.is_none() {
            let hint = self.is_text().then_some(TEXT_NODE);
            self.key = Some(generate_key(hint));
            self.key_source = KeySource::Generated;
        }
        self.rehash();
    }

    pub(crate) const fn hashes(&self) -> &Hashes {
        &self.hashes
    }

    pub(crate) fn hash_input(&self) -> ChildHashInput<'_> {
        ChildHashInput {
            stable_key: self.stable_key(),
            subtree: self.hashes.subtree,
            identity: self.hashes.identity,
            node_count: self.hashes.node_count,
            keyed: self.is_keyed() || self.hashes.has_keyed_children,
        }
    }

    fn rehash(&mut self) {
        self.hashes = Hashes::compute(
            &self.name,
            self.hashes.props,
            self.key.as_ref(),
            self.children.iter().map(|c| c.hash_input()),
        );
    }
}
