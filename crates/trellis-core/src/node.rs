//! Immutable description values produced by component renders.
//!
//! Nodes are shared through `Rc` and never mutated after construction; the
//! engine identifies a node by its allocation, never by deep equality.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::Constructor;
use crate::host::{HostEvent, HostNodeId};
use crate::properties::{Callback, PropValue, Properties};
use crate::registry::RegistryItem;

/// Explicit sibling identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value.into())
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

/// How previous properties are computed when an element is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Compare against the previous description.
    #[default]
    Vdom,
    /// Treat every property as new on each update.
    None,
    /// Read previous values back from the host node.
    Dom,
}

pub type DeferredPropertiesFn = Rc<dyn Fn(bool) -> Properties>;

#[derive(Clone)]
pub enum Node {
    Element(Rc<ElementNode>),
    Component(Rc<ComponentNode>),
    /// Raw text, coerced into a text element during expansion.
    Text(Rc<str>),
    /// Placeholder for an absent child.
    Empty,
}

impl Node {
    pub fn text(text: impl AsRef<str>) -> Self {
        Node::Text(Rc::from(text.as_ref()))
    }

    pub fn as_element(&self) -> Option<&Rc<ElementNode>> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&Rc<ComponentNode>> {
        match self {
            Node::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Node::Element(e) => e.key.as_ref(),
            Node::Component(c) => c.key.as_ref(),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(e) => e.children.as_deref().unwrap_or(&[]),
            Node::Component(c) => &c.children,
            _ => &[],
        }
    }

    /// Address of the shared node, used as its identity.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Node::Element(e) => Some(Rc::as_ptr(e) as usize),
            Node::Component(c) => Some(Rc::as_ptr(c) as usize),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(e) if e.is_text() => write!(f, "Text({:?})", e.text),
            Node::Element(e) => write!(f, "Element(<{}>, key={:?})", e.tag, e.key),
            Node::Component(c) => {
                write!(f, "Component({}, key={:?})", c.constructor.label(), c.key)
            }
            Node::Text(t) => write!(f, "Text({t:?})"),
            Node::Empty => f.write_str("Empty"),
        }
    }
}

impl From<ElementNode> for Node {
    fn from(value: ElementNode) -> Self {
        Node::Element(Rc::new(value))
    }
}

impl From<ComponentNode> for Node {
    fn from(value: ComponentNode) -> Self {
        Node::Component(Rc::new(value))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::text(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(Rc::from(value))
    }
}

impl From<bool> for Node {
    fn from(_: bool) -> Self {
        Node::Empty
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Node::Empty)
    }
}

/// Description of one host element or text node.
#[derive(Clone, Default)]
pub struct ElementNode {
    /// Element tag; empty for text nodes.
    pub tag: Rc<str>,
    pub text: Option<Rc<str>>,
    pub key: Option<Key>,
    pub properties: Properties,
    /// `None` values remove the attribute.
    pub attributes: Option<IndexMap<String, Option<String>>>,
    pub events: Option<IndexMap<String, Callback>>,
    pub children: Option<Vec<Node>>,
    pub namespace: Option<Rc<str>>,
    pub diff_mode: DiffMode,
    pub enter_animation: Option<Rc<str>>,
    pub exit_animation: Option<Rc<str>>,
    pub deferred_properties: Option<DeferredPropertiesFn>,
    /// Existing host node to adopt instead of allocating one.
    pub host_node: Option<HostNodeId>,
    pub on_attach: Option<Rc<dyn Fn()>>,
}

/// Starts an element description.
pub fn element(tag: &str) -> ElementNode {
    ElementNode {
        tag: Rc::from(tag),
        ..ElementNode::default()
    }
}

impl ElementNode {
    pub fn text_node(text: &str) -> Self {
        ElementNode {
            tag: Rc::from(""),
            text: Some(Rc::from(text)),
            ..ElementNode::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.tag.is_empty()
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn props(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Attaches an event handler as an `on<event>` property.
    pub fn on(mut self, event: &str, handler: impl Fn(&HostEvent) + 'static) -> Self {
        self.properties
            .insert(format!("on{event}"), PropValue::callback(handler));
        self
    }

    /// Switches the node to explicit attribute/event maps.
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes
            .get_or_insert_with(IndexMap::new)
            .insert(name.to_string(), Some(value.into()));
        self.events.get_or_insert_with(IndexMap::new);
        self
    }

    /// Declares an attribute that must be absent on the host node.
    pub fn attr_absent(mut self, name: &str) -> Self {
        self.attributes
            .get_or_insert_with(IndexMap::new)
            .insert(name.to_string(), None);
        self.events.get_or_insert_with(IndexMap::new);
        self
    }

    pub fn event(mut self, name: &str, callback: Callback) -> Self {
        self.attributes.get_or_insert_with(IndexMap::new);
        self.events
            .get_or_insert_with(IndexMap::new)
            .insert(name.to_string(), callback);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children
            .get_or_insert_with(Vec::new)
            .push(child.into());
        self
    }

    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children
            .get_or_insert_with(Vec::new)
            .extend(children.into_iter().map(Into::into));
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(Rc::from(namespace));
        self
    }

    pub fn diff_mode(mut self, mode: DiffMode) -> Self {
        self.diff_mode = mode;
        self
    }

    pub fn enter_animation(mut self, name: &str) -> Self {
        self.enter_animation = Some(Rc::from(name));
        self
    }

    pub fn exit_animation(mut self, name: &str) -> Self {
        self.exit_animation = Some(Rc::from(name));
        self
    }

    /// `callback(false)` runs at expansion; `callback(true)` runs after the
    /// node is mounted and its result is merged under the explicit properties.
    pub fn deferred_properties(mut self, callback: impl Fn(bool) -> Properties + 'static) -> Self {
        self.deferred_properties = Some(Rc::new(callback));
        self
    }

    pub fn host_node(mut self, node: HostNodeId) -> Self {
        self.host_node = Some(node);
        self
    }

    pub fn on_attach(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_attach = Some(Rc::new(hook));
        self
    }
}

/// How a component node names its constructor.
#[derive(Clone)]
pub enum ComponentRef {
    Constructor(Constructor),
    /// Resolved through the registry.
    Label(Rc<str>),
    /// Defined in the registry on first use, then resolved by label.
    Lazy { label: Rc<str>, item: RegistryItem },
}

impl ComponentRef {
    pub fn label(&self) -> &str {
        match self {
            ComponentRef::Constructor(c) => c.name(),
            ComponentRef::Label(label) => label,
            ComponentRef::Lazy { label, .. } => label,
        }
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        match self {
            ComponentRef::Constructor(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ComponentNode {
    pub constructor: ComponentRef,
    pub key: Option<Key>,
    pub properties: Properties,
    pub children: Vec<Node>,
}

/// Starts a component description for a known constructor.
pub fn component(constructor: &Constructor) -> ComponentNode {
    ComponentNode {
        constructor: ComponentRef::Constructor(constructor.clone()),
        key: None,
        properties: Properties::new(),
        children: Vec::new(),
    }
}

/// Component resolved through the registry by label.
pub fn registry_component(label: &str) -> ComponentNode {
    ComponentNode {
        constructor: ComponentRef::Label(Rc::from(label)),
        key: None,
        properties: Properties::new(),
        children: Vec::new(),
    }
}

/// Component whose registry entry is defined on first use.
pub fn lazy_component(label: &str, item: RegistryItem) -> ComponentNode {
    ComponentNode {
        constructor: ComponentRef::Lazy {
            label: Rc::from(label),
            item,
        },
        key: None,
        properties: Properties::new(),
        children: Vec::new(),
    }
}

impl ComponentNode {
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn props(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}
