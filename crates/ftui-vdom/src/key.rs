#![forbid(unsafe_code)]

//! Node identity.
//!
//! Every node in a [`VTree`](crate::tree::VTree) carries a [`NodeKey`]. Keys
//! come from one of four sources, tried in order when a component is
//! converted:
//!
//! 1. an explicit key supplied by the caller,
//! 2. the component's stable id,
//! 3. the component's instance name plus a generated suffix,
//! 4. a fully generated key.
//!
//! Only the first two are *stable*: they identify the same logical child
//! across commits and drive keyed matching. Named and generated keys are
//! unique within a process but change every time a description is
//! converted, so the reconciler treats those children positionally.
//!
//! Generated and named keys start with [`GENERATED_KEY_PREFIX`]. The tree
//! refuses stable keys carrying that prefix, so the two namespaces never
//! meet.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cheaply cloneable node key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    /// Create a key from any string-like value.
    #[must_use]
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key lies in the namespace reserved for [`generate_key`].
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(GENERATED_KEY_PREFIX)
    }
}

impl Deref for NodeKey {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeKey {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for NodeKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&NodeKey> for NodeKey {
    fn from(value: &NodeKey) -> Self {
        value.clone()
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({:?})", &*self.0)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NodeKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NodeKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw))
    }
}

/// Where a node's key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeySource {
    /// Supplied by the caller.
    Explicit,
    /// The component's stable id.
    StableId,
    /// Instance name plus a generated suffix.
    Named,
    /// Fully generated.
    #[default]
    Generated,
}

impl KeySource {
    /// Whether keys from this source survive re-conversion.
    #[inline]
    #[must_use]
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::Explicit | Self::StableId)
    }
}

/// Leading character of every generated key.
pub const GENERATED_KEY_PREFIX: char = '#';

static NEXT_KEY_SEQ: AtomicU64 = AtomicU64::new(1);

/// Produce a process-unique key, optionally carrying `hint`.
///
/// Text nodes use the hint `"text"`; named components use their instance
/// name. The result always starts with [`GENERATED_KEY_PREFIX`].
#[must_use]
pub fn generate_key(hint: Option<&str>) -> NodeKey {
    let seq = NEXT_KEY_SEQ.fetch_add(1, Ordering::Relaxed);
    match hint {
        Some(hint) => NodeKey::from(format!("{GENERATED_KEY_PREFIX}{hint}-{seq:08x}")),
        None => NodeKey::from(format!("{GENERATED_KEY_PREFIX}{seq:08x}")),
    }
}
