#![forbid(unsafe_code)]

//! Virtual tree reconciliation: keyed diffing, patch application, host
//! bindings, and post-commit effects.
//!
//! A [`Component`](component::Component) description is converted into an
//! immutable [`VNode`] snapshot with structural hashes. The
//! [`Reconciler`] (or the caching [`DiffingEngine`]) compares two snapshots
//! and emits [`Patch`]es, which the [`Patcher`] applies to a live [`VTree`]
//! and its bound host objects inside one scheduler commit.
//!
//! ```
//! use ftui_vdom::prelude::*;
//!
//! let old = VNode::new("list").with_key("list")
//!     .with_child(VNode::new("item").with_key("a"))
//!     .with_child(VNode::new("item").with_key("b"));
//! let new = VNode::new("list").with_key("list")
//!     .with_child(VNode::new("item").with_key("b"))
//!     .with_child(VNode::new("item").with_key("a"));
//!
//! let patches = Reconciler::new().reconcile(Some(&old), Some(&new), None).unwrap();
//! assert_eq!(patches, vec![Patch::move_node("b", 0)]);
//! ```

pub mod bindings;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod key;
pub mod lifecycle;
pub mod memory;
pub mod node;
pub mod patch;
pub mod patcher;
pub mod pool;
pub mod props;
pub mod reconciler;
pub mod refs;
pub mod scheduler;
pub mod tree;

pub use config::VdomConfig;
pub use engine::DiffingEngine;
pub use error::{HostError, Result, VdomError};
pub use key::NodeKey;
pub use node::VNode;
pub use patch::Patch;
pub use patcher::{PatchReport, Patcher};
pub use reconciler::{DirtyState, Reconciler};
pub use tree::VTree;

pub mod prelude {
    pub use crate::component::{Child, Component, Element};
    pub use crate::engine::{DiffStrategy, DiffingEngine, StrategyKind};
    pub use crate::error::{HostError, HostResult, VdomError};
    pub use crate::host::{HostCapabilities, HostFactory, HostNodeInfo, HostObject};
    pub use crate::key::{KeySource, NodeKey};
    pub use crate::lifecycle::LifecycleListener;
    pub use crate::node::VNode;
    pub use crate::patch::{Patch, PatchKind};
    pub use crate::patcher::{PatchReport, Patcher};
    pub use crate::props::{PropDelta, PropValue, Props, props};
    pub use crate::reconciler::{DirtyState, Reconciler};
    pub use crate::refs::{ComponentRef, ComponentRefs};
    pub use crate::scheduler::{EffectPriority, EffectScheduler};
    pub use crate::tree::VTree;
}
