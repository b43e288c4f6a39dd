#![forbid(unsafe_code)]

//! Host object contract.
//!
//! Backends render nodes into *host objects* (terminal widgets, DOM nodes,
//! native views). The patcher drives them through [`HostObject`], calling a
//! method only when the object advertises the matching
//! [`HostCapabilities`] flag. Every method defaults to a no-op, so a backend
//! implements only what it supports.
//!
//! # Failure Modes
//!
//! Errors returned from host methods, and panics raised inside them, are
//! caught by the patcher, logged, and recorded in its report. They never
//! abort the surrounding patch batch.

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::{HostError, HostResult};
use crate::key::NodeKey;
use crate::props::{PropDelta, Props};

bitflags! {
    /// Optional host operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostCapabilities: u8 {
        const DESTROY = 1 << 0;
        const UPDATE_PROPERTIES = 1 << 1;
        const SET_CHILD_INDEX = 1 << 2;
        const MOVE_CHILD = 1 << 3;
        const ADD_CHILD = 1 << 4;
    }
}

/// A backend object bound to one node.
pub trait HostObject: Send + Sync + 'static {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::empty()
    }

    /// Release backend resources. Called once when the node is removed.
    fn destroy(&self) -> HostResult {
        Ok(())
    }

    fn update_properties(&self, _delta: &PropDelta) -> HostResult {
        Ok(())
    }

    /// Reposition this object within its parent.
    fn set_child_index(&self, _index: usize) -> HostResult {
        Ok(())
    }

    /// Reposition `child` within this object. Used when the child cannot
    /// move itself.
    fn move_child(&self, _child: &dyn HostObject, _index: usize) -> HostResult {
        Ok(())
    }

    fn add_child(&self, _child: &Arc<dyn HostObject>, _index: usize) -> HostResult {
        Ok(())
    }

    /// Ask the binding registry to hold this object strongly. Backends that
    /// do not own their objects elsewhere return `true`.
    fn retain_strongly(&self) -> bool {
        false
    }
}

/// What a factory sees when asked to create a host object.
#[derive(Debug, Clone, Copy)]
pub struct HostNodeInfo<'a> {
    pub key: &'a NodeKey,
    pub name: &'a str,
    pub props: &'a Props,
    pub parent: Option<&'a NodeKey>,
    pub index: usize,
}

/// Creates host objects for newly attached nodes.
///
/// Returning `Ok(None)` leaves the node unbound.
pub trait HostFactory: Send + Sync {
    fn create(&self, node: &HostNodeInfo<'_>) -> Result<Option<Arc<dyn HostObject>>, HostError>;
}

impl<F> HostFactory for F
where
    F: Fn(&HostNodeInfo<'_>) -> Result<Option<Arc<dyn HostObject>>, HostError> + Send + Sync,
{
    fn create(&self, node: &HostNodeInfo<'_>) -> Result<Option<Arc<dyn HostObject>>, HostError> {
        self(node)
    }
}
