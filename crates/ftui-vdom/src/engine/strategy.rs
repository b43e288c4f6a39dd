#![forbid(unsafe_code)]

//! Diff strategies.
//!
//! Each strategy is a [`Reconciler`] configuration:
//!
//! | Strategy | Child matching | Dirty state |
//! |----------|----------------|-------------|
//! | [`PositionalDiff`] | by index | forces revisits |
//! | [`KeyedDiff`] | by stable key | forces revisits |
//! | [`IncrementalDiff`] | by stable key | also prunes clean children |

use std::fmt;

use crate::error::Result;
use crate::node::VNode;
use crate::patch::Patch;
use crate::reconciler::{ChildMatching, DirtyState, Reconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StrategyKind {
    Positional,
    Keyed,
    Incremental,
}

impl StrategyKind {
    pub const ALL: [Self; 3] = [Self::Positional, Self::Keyed, Self::Incremental];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::Keyed => "keyed",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A way of turning two snapshots into patches.
pub trait DiffStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Diff into `out`, which is cleared first.
    fn diff_into(
        &self,
        old: Option<&VNode>,
        new: Option<&VNode>,
        dirty: Option<&DirtyState>,
        out: &mut Vec<Patch>,
    ) -> Result<()>;

    fn diff(
        &self,
        old: Option<&VNode>,
        new: Option<&VNode>,
        dirty: Option<&DirtyState>,
    ) -> Result<Vec<Patch>> {
        let mut out = Vec::new();
        self.diff_into(old, new, dirty, &mut out)?;
        Ok(out)
    }
}

macro_rules! reconciler_strategy {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $reconciler:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl DiffStrategy for $name {
            fn kind(&self) -> StrategyKind {
                $kind
            }

            fn diff_into(
                &self,
                old: Option<&VNode>,
                new: Option<&VNode>,
                dirty: Option<&DirtyState>,
                out: &mut Vec<Patch>,
            ) -> Result<()> {
                const RECONCILER: Reconciler = $reconciler;
                RECONCILER.reconcile_into(old, new, dirty, out)
            }
        }
    };
}

reconciler_strategy!(
    /// Index pairing; keys are ignored for matching.
    PositionalDiff,
    StrategyKind::Positional,
    Reconciler::new().with_matching(ChildMatching::Positional)
);

reconciler_strategy!(
    /// Key matching with minimal moves.
    KeyedDiff,
    StrategyKind::Keyed,
    Reconciler::new()
);

reconciler_strategy!(
    /// Key matching that skips children outside the dirty set.
    IncrementalDiff,
    StrategyKind::Incremental,
    Reconciler::new().with_pruning(true)
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::NodeKey;
    use crate::patch::PatchKind;

    fn list(keys: &[&str]) -> VNode {
        VNode::new("list")
            .with_key("list")
            .with_children(keys.iter().map(|k| VNode::new("item").with_key(*k).with_prop("k", *k)))
    }

    #[test]
    fn strategies_disagree_on_reorders() {
        let old = list(&["a", "b"]);
        let new = list(&["b", "a"]);
        let keyed = KeyedDiff.diff(Some(&old), Some(&new), None).expect("keyed");
        let positional = PositionalDiff
            .diff(Some(&old), Some(&new), None)
            .expect("positional");
        assert_eq!(keyed, vec![Patch::move_node("b", 0)]);
        assert!(positional.iter().all(|p| p.kind() == PatchKind::UpdateProps));
    }

    #[test]
    fn incremental_without_dirty_state_matches_keyed() {
        let old = list(&["a", "b", "c"]);
        let new = list(&["c", "a"]);
        assert_eq!(
            IncrementalDiff.diff(Some(&old), Some(&new), None).expect("incremental"),
            KeyedDiff.diff(Some(&old), Some(&new), None).expect("keyed")
        );
    }

    #[test]
    fn incremental_trusts_dirty_state() {
        let old = list(&["a", "b"]);
        let new = VNode::new("list")
            .with_key("list")
            .with_child(VNode::new("item").with_key("a").with_prop("k", "A"))
            .with_child(VNode::new("item").with_key("b").with_prop("k", "B"));
        let mut dirty = DirtyState::default();
        dirty.dirty.insert(NodeKey::from("list"));
        dirty.dirty.insert(NodeKey::from("a"));
        let patches = IncrementalDiff
            .diff(Some(&old), Some(&new), Some(&dirty))
            .expect("incremental");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].key().map(NodeKey::as_str), Some("a"));
    }

    #[test]
    fn kinds_display() {
        let names: Vec<String> = StrategyKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["positional", "keyed", "incremental"]);
    }
}
