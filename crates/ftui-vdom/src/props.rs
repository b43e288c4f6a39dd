#![forbid(unsafe_code)]

//! Node properties and property deltas.
//!
//! [`Props`] is an ordered map, so iteration order and therefore the
//! normalized props hash never depend on insertion order. A [`PropDelta`]
//! carries both the changed entries and the removed names, so applying
//! `PropDelta::between(a, b)` to `a` always yields exactly `b`.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Property map of a node.
pub type Props = BTreeMap<String, PropValue>;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PropValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PropValue>),
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

// Floats hash by bit pattern with -0.0 folded onto 0.0 and every NaN onto one
// payload, keeping `a == b => hash(a) == hash(b)`.
fn float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl Hash for PropValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Float(v) => float_bits(*v).hash(state),
            Self::Str(v) => v.hash(state),
            Self::List(items) => items.hash(state),
            Self::Map(entries) => entries.hash(state),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Difference between two property maps.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropDelta {
    /// Entries that are new or whose value changed.
    pub set: Props,
    /// Names present before and absent after, sorted.
    pub removed: Vec<String>,
}

impl PropDelta {
    /// Delta turning `old` into `new`.
    #[must_use]
    pub fn between(old: &Props, new: &Props) -> Self {
        let set = new
            .iter()
            .filter(|(name, value)| old.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let removed = old
            .keys()
            .filter(|name| !new.contains_key(*name))
            .cloned()
            .collect();
        Self { set, removed }
    }

    /// Delta that only sets entries.
    #[must_use]
    pub fn setting(set: Props) -> Self {
        Self {
            set,
            removed: Vec::new(),
        }
    }

    /// Builder: set one entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        let name = name.into();
        self.removed.retain(|r| *r != name);
        self.set.insert(name, value.into());
        self
    }

    /// Builder: remove one entry.
    #[must_use]
    pub fn without(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.set.remove(&name);
        if let Err(pos) = self.removed.binary_search(&name) {
            self.removed.insert(pos, name);
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }

    /// Number of touched property names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len() + self.removed.len()
    }

    /// Apply to a property map in place.
    pub fn apply_to(&self, props: &mut Props) {
        for name in &self.removed {
            props.remove(name);
        }
        for (name, value) in &self.set {
            props.insert(name.clone(), value.clone());
        }
    }

    /// Fold a later delta into this one; the result equals applying both in
    /// sequence.
    pub fn merge(&mut self, later: &PropDelta) {
        for name in &later.removed {
            self.set.remove(name);
            if let Err(pos) = self.removed.binary_search(name) {
                self.removed.insert(pos, name.clone());
            }
        }
        for (name, value) in &later.set {
            if let Ok(pos) = self.removed.binary_search(name) {
                self.removed.remove(pos);
            }
            self.set.insert(name.clone(), value.clone());
        }
    }
}

/// Build a [`Props`] map from `(name, value)` pairs.
///
/// ```
/// use ftui_vdom::props::{props, PropValue};
///
/// let p = props([("value", PropValue::from(1)), ("label", "ok".into())]);
/// assert_eq!(p.len(), 2);
/// ```
pub fn props<I, K, V>(entries: I) -> Props
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
