#![forbid(unsafe_code)]

//! Patch instructions.
//!
//! A patch stream is applied strictly in order. Indices in `AddNode` and
//! `MoveNode` are positions in the parent's child list at the moment the
//! patch is applied, after every earlier patch in the stream.

use std::fmt;
use std::sync::Arc;

use crate::key::NodeKey;
use crate::node::VNode;
use crate::props::PropDelta;

/// One mutation instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Insert `node` (and its subtree) into `parent` at `index`. A `None`
    /// parent installs a new root into an empty tree.
    AddNode {
        parent: Option<NodeKey>,
        index: usize,
        node: Arc<VNode>,
    },
    /// Detach and destroy the subtree rooted at `key`.
    RemoveNode { key: NodeKey },
    /// Merge `delta` into the props of `key`. `None` targets the root.
    UpdateProps {
        key: Option<NodeKey>,
        delta: PropDelta,
    },
    /// Reposition `key` within its parent.
    MoveNode { key: NodeKey, index: usize },
    /// Replace the whole tree; `None` clears it.
    ReplaceRoot { node: Option<Arc<VNode>> },
}

/// Discriminant of a [`Patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatchKind {
    AddNode,
    RemoveNode,
    UpdateProps,
    MoveNode,
    ReplaceRoot,
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AddNode => "ADD_NODE",
            Self::RemoveNode => "REMOVE_NODE",
            Self::UpdateProps => "UPDATE_PROPS",
            Self::MoveNode => "MOVE_NODE",
            Self::ReplaceRoot => "REPLACE_ROOT",
        })
    }
}

impl Patch {
    #[must_use]
    pub fn add_node(parent: Option<NodeKey>, index: usize, node: VNode) -> Self {
        Self::AddNode {
            parent,
            index,
            node: Arc::new(node),
        }
    }

    #[must_use]
    pub fn remove_node(key: impl Into<NodeKey>) -> Self {
        Self::RemoveNode { key: key.into() }
    }

    #[must_use]
    pub fn update_props(key: impl Into<NodeKey>, delta: PropDelta) -> Self {
        Self::UpdateProps {
            key: Some(key.into()),
            delta,
        }
    }

    #[must_use]
    pub fn move_node(key: impl Into<NodeKey>, index: usize) -> Self {
        Self::MoveNode {
            key: key.into(),
            index,
        }
    }

    #[must_use]
    pub fn replace_root(node: Option<VNode>) -> Self {
        Self::ReplaceRoot {
            node: node.map(Arc::new),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> PatchKind {
        match self {
            Self::AddNode { .. } => PatchKind::AddNode,
            Self::RemoveNode { .. } => PatchKind::RemoveNode,
            Self::UpdateProps { .. } => PatchKind::UpdateProps,
            Self::MoveNode { .. } => PatchKind::MoveNode,
            Self::ReplaceRoot { .. } => PatchKind::ReplaceRoot,
        }
    }

    /// Key of the node this patch targets (the added node for `AddNode`).
    #[must_use]
    pub fn key(&self) -> Option<&NodeKey> {
        match self {
            Self::AddNode { node, .. } => node.key(),
            Self::RemoveNode { key } | Self::MoveNode { key, .. } => Some(key),
            Self::UpdateProps { key, .. } => key.as_ref(),
            Self::ReplaceRoot { .. } => None,
        }
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddNode {
                parent,
                index,
                node,
            } => write!(
                f,
                "{} {}<{}> -> {}[{index}]",
                self.kind(),
                node.key().map_or("?", NodeKey::as_str),
                node.name(),
                parent.as_ref().map_or("<root>", NodeKey::as_str),
            ),
            Self::RemoveNode { key } => write!(f, "{} {key}", self.kind()),
            Self::UpdateProps { key, delta } => write!(
                f,
                "{} {} (+{} -{})",
                self.kind(),
                key.as_ref().map_or("<root>", NodeKey::as_str),
                delta.set.len(),
                delta.removed.len()
            ),
            Self::MoveNode { key, index } => write!(f, "{} {key} -> {index}", self.kind()),
            Self::ReplaceRoot { node } => write!(
                f,
                "{} {}",
                self.kind(),
                node.as_ref().map_or("<empty>", |n| n.name())
            ),
        }
    }
}

/// Count patches of each kind, in [`PatchKind`] order.
#[must_use]
pub fn kind_counts(patches: &[Patch]) -> [usize; 5] {
    let mut counts = [0usize; 5];
    for patch in patches {
        counts[patch.kind() as usize] += 1;
    }
    counts
}
