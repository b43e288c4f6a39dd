#![forbid(unsafe_code)]

//! Error types.
//!
//! Tree misuse (unknown keys, key collisions, impossible patches) is returned
//! to the caller as [`VdomError`]. Host callback failures are caught by the
//! patcher, logged, and recorded in its report as
//! [`VdomError::HostCallbackFailure`]; they never abort a batch.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::key::NodeKey;

/// Errors produced by tree, reconciler and patcher operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VdomError {
    #[error("node not found: {key}")]
    NotFound { key: NodeKey },

    #[error("node already exists: {key}")]
    AlreadyExists { key: NodeKey },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("host {operation} failed for {key}: {source}")]
    HostCallbackFailure {
        key: NodeKey,
        operation: HostOperation,
        #[source]
        source: HostError,
    },
}

impl VdomError {
    pub(crate) fn not_found(key: impl Into<NodeKey>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VdomError>;

/// Failure reported by a host object or host factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload))
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "non-string panic payload".to_owned(), |s| (*s).to_owned()),
    }
}

/// Result of a host callback.
pub type HostResult = std::result::Result<(), HostError>;

/// The host callback that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOperation {
    Create,
    Destroy,
    UpdateProperties,
    SetChildIndex,
    MoveChild,
    AddChild,
}

impl fmt::Display for HostOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::UpdateProperties => "update_properties",
            Self::SetChildIndex => "set_child_index",
            Self::MoveChild => "move_child",
            Self::AddChild => "add_child",
        })
    }
}
