#![forbid(unsafe_code)]

//! Upstream component descriptions and their conversion into [`VNode`]s.
//!
//! Anything implementing [`Component`] can be turned into a snapshot. The
//! crate ships [`Element`], a plain builder, for callers without their own
//! component type.
//!
//! # Key derivation
//!
//! Explicit key, then stable id, then `"{instance_name}-{generated}"`, then a
//! generated key. Non-component children (strings, numbers, any
//! [`PropValue`]) become `text` nodes with a `content` prop and a
//! `"text-{generated}"` key.

use std::borrow::Cow;
use std::sync::Arc;

use crate::key::{KeySource, NodeKey, generate_key};
use crate::node::{TEXT_NODE, VNode};
use crate::props::{PropValue, Props};

/// A child of a component description.
pub enum Child<'a> {
    Component(&'a dyn Component),
    Text(Cow<'a, str>),
    Value(PropValue),
}

/// Description of one component instance, as produced by a UI layer.
pub trait Component {
    /// Component type name; a change of name at the same position means a
    /// different component.
    fn component_name(&self) -> &str;

    /// Caller-supplied key.
    fn key(&self) -> Option<&str> {
        None
    }

    /// Stable id, used when no explicit key is present.
    fn stable_id(&self) -> Option<&str> {
        None
    }

    /// Human-facing instance name, used as the prefix of a generated key.
    fn instance_name(&self) -> Option<&str> {
        None
    }

    fn props(&self) -> Props {
        Props::new()
    }

    fn children(&self) -> Vec<Child<'_>> {
        Vec::new()
    }
}

impl VNode {
    /// Convert a component description into a fully keyed snapshot.
    #[must_use]
    pub fn from_component(component: &dyn Component) -> Self {
        let (key, source) = derive_key(component);
        let children = component
            .children()
            .into_iter()
            .map(|child| Arc::new(convert_child(child)))
            .collect();
        VNode::assemble(
            Arc::from(component.component_name()),
            component.props(),
            children,
            Some(key),
            source,
        )
    }
}

fn derive_key(component: &dyn Component) -> (NodeKey, KeySource) {
    if let Some(key) = component.key() {
        return (NodeKey::from(key), KeySource::Explicit);
    }
    if let Some(id) = component.stable_id() {
        return (NodeKey::from(id), KeySource::StableId);
    }
    match component.instance_name() {
        Some(name) => (generate_key(Some(name)), KeySource::Named),
        None => (generate_key(None), KeySource::Generated),
    }
}

fn convert_child(child: Child<'_>) -> VNode {
    let content = match child {
        Child::Component(component) => return VNode::from_component(component),
        Child::Text(text) => PropValue::Str(text.into_owned()),
        Child::Value(value) => PropValue::Str(value.to_string()),
    };
    VNode::text(content).with_key_from(generate_key(Some(TEXT_NODE)), KeySource::Generated)
}

/// Child of an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementChild {
    Element(Element),
    Text(String),
    Value(PropValue),
}

/// Plain component description.
///
/// ```
/// use ftui_vdom::component::Element;
/// use ftui_vdom::node::VNode;
///
/// let list = Element::new("List")
///     .key("todos")
///     .child(Element::new("Item").key("a").prop("done", false))
///     .text("footer");
/// let node = VNode::from_component(&list);
/// assert_eq!(node.children().len(), 2);
/// assert!(node.children()[1].is_text());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    name: String,
    key: Option<String>,
    stable_id: Option<String>,
    instance_name: Option<String>,
    props: Props,
    children: Vec<ElementChild>,
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn stable_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    #[must_use]
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(ElementChild::Element(child));
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(ElementChild::Element));
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(ElementChild::Text(text.into()));
        self
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<PropValue>) -> Self {
        self.children.push(ElementChild::Value(value.into()));
        self
    }
}

impl Component for Element {
    fn component_name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn stable_id(&self) -> Option<&str> {
        self.stable_id.as_deref()
    }

    fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    fn props(&self) -> Props {
        self.props.clone()
    }

    fn children(&self) -> Vec<Child<'_>> {
        self.children
            .iter()
            .map(|child| match child {
                ElementChild::Element(element) => Child::Component(element),
                ElementChild::Text(text) => Child::Text(Cow::Borrowed(text)),
                ElementChild::Value(value) => Child::Value(value.clone()),
            })
            .collect()
    }
}
