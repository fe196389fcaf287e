//! In-memory [`HostDocument`] used by tests, benchmarks and headless
//! embedders. Every structural or property write is appended to an
//! operation log so callers can assert on mutation counts.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::{HostDocument, HostError, HostNodeId, Listener, NodeOperation};
use crate::properties::PropValue;

#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: HostNodeId, tag: String },
    CreateText { node: HostNodeId, text: String },
    Insert { parent: HostNodeId, child: HostNodeId, anchor: Option<HostNodeId> },
    Remove { parent: HostNodeId, child: HostNodeId },
    Replace { parent: HostNodeId, new_child: HostNodeId, old_child: HostNodeId },
    SetAttribute { node: HostNodeId, name: String, value: String },
    RemoveAttribute { node: HostNodeId, name: String },
    SetProperty { node: HostNodeId, name: String },
    SetStyle { node: HostNodeId, name: String, value: String },
    AddListener { node: HostNodeId, event: String },
    RemoveListener { node: HostNodeId, event: String },
    Invoke { node: HostNodeId, operation: NodeOperation },
}

impl HostOp {
    /// Structural operations: creation, insertion, removal, replacement.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            HostOp::CreateElement { .. }
                | HostOp::CreateText { .. }
                | HostOp::Insert { .. }
                | HostOp::Remove { .. }
                | HostOp::Replace { .. }
        )
    }
}

enum MemoryNodeKind {
    Element { tag: String, namespace: Option<String> },
    Text(String),
}

struct MemoryNode {
    kind: MemoryNodeKind,
    parent: Option<HostNodeId>,
    children: Vec<HostNodeId>,
    attributes: IndexMap<String, String>,
    attribute_namespaces: IndexMap<String, String>,
    properties: IndexMap<String, PropValue>,
    styles: IndexMap<String, String>,
    listeners: Vec<(String, Listener)>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            attribute_namespaces: IndexMap::new(),
            properties: IndexMap::new(),
            styles: IndexMap::new(),
            listeners: Vec::new(),
        }
    }

    fn tag(&self) -> &str {
        match &self.kind {
            MemoryNodeKind::Element { tag, .. } => tag,
            MemoryNodeKind::Text(_) => "",
        }
    }
}

pub struct MemoryDocument {
    nodes: Vec<Option<MemoryNode>>,
    root: HostNodeId,
    ops: Vec<HostOp>,
}

impl MemoryDocument {
    /// Creates a document whose root is an empty `body` element.
    pub fn new() -> Self {
        let root = MemoryNode::new(MemoryNodeKind::Element {
            tag: "body".into(),
            namespace: None,
        });
        Self {
            nodes: vec![Some(root)],
            root: 0,
            ops: Vec::new(),
        }
    }

    fn node(&self, id: HostNodeId) -> Option<&MemoryNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: HostNodeId) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    fn alloc(&mut self, node: MemoryNode) -> HostNodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        id
    }

    /// Adds pre-existing markup without logging, as if the host had been
    /// populated before mounting.
    pub fn preset_element(&mut self, parent: HostNodeId, tag: &str) -> HostNodeId {
        let id = self.alloc(MemoryNode::new(MemoryNodeKind::Element {
            tag: tag.to_string(),
            namespace: None,
        }));
        self.attach(parent, id, None);
        id
    }

    pub fn preset_text(&mut self, parent: HostNodeId, text: &str) -> HostNodeId {
        let id = self.alloc(MemoryNode::new(MemoryNodeKind::Text(text.to_string())));
        self.attach(parent, id, None);
        id
    }

    /// Sets an attribute without logging.
    pub fn preset_attribute(&mut self, node: HostNodeId, name: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            n.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn text(&self, node: HostNodeId) -> Option<&str> {
        match &self.node(node)?.kind {
            MemoryNodeKind::Text(text) => Some(text),
            MemoryNodeKind::Element { .. } => None,
        }
    }

    pub fn namespace(&self, node: HostNodeId) -> Option<&str> {
        match &self.node(node)?.kind {
            MemoryNodeKind::Element { namespace, .. } => namespace.as_deref(),
            MemoryNodeKind::Text(_) => None,
        }
    }

    pub fn attribute_namespace(&self, node: HostNodeId, name: &str) -> Option<&str> {
        self.node(node)?
            .attribute_namespaces
            .get(name)
            .map(String::as_str)
    }

    pub fn style(&self, node: HostNodeId, name: &str) -> Option<&str> {
        self.node(node)?.styles.get(name).map(String::as_str)
    }

    /// Listeners currently registered for `event` on `node`.
    pub fn listeners(&self, node: HostNodeId, event: &str) -> Vec<Listener> {
        self.node(node)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|(name, _)| name == event)
                    .map(|(_, listener)| listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialises the children of `node` as compact markup, e.g.
    /// `<div class="a"><span>hi</span></div>`.
    pub fn inner_markup(&self, node: HostNodeId) -> String {
        let mut output = String::new();
        if let Some(n) = self.node(node) {
            for child in &n.children {
                self.write_markup(&mut output, *child);
            }
        }
        output
    }

    fn write_markup(&self, output: &mut String, id: HostNodeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            MemoryNodeKind::Text(text) => output.push_str(text),
            MemoryNodeKind::Element { tag, .. } => {
                output.push('<');
                output.push_str(tag);
                for (name, value) in &node.attributes {
                    output.push_str(&format!(" {name}=\"{value}\""));
                }
                output.push('>');
                for child in &node.children {
                    self.write_markup(output, *child);
                }
                output.push_str(&format!("</{tag}>"));
            }
        }
    }

    pub fn dump_tree(&self, root: Option<HostNodeId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.dump_node(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: HostNodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Some(node) => {
                match &node.kind {
                    MemoryNodeKind::Element { tag, .. } => {
                        output.push_str(&format!("{indent}[{id}] <{tag}>\n"))
                    }
                    MemoryNodeKind::Text(text) => {
                        output.push_str(&format!("{indent}[{id}] {text:?}\n"))
                    }
                }
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            None => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }

    fn detach(&mut self, child: HostNodeId) {
        let parent = self.node(child).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|c| *c != child);
            }
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }

    fn attach(&mut self, parent: HostNodeId, child: HostNodeId, anchor: Option<HostNodeId>) {
        self.detach(child);
        if let Some(p) = self.node_mut(parent) {
            let index = anchor
                .and_then(|a| p.children.iter().position(|c| *c == a))
                .unwrap_or(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn select_accepts(&self, select: HostNodeId, value: &str) -> bool {
        let mut stack = self.children(select);
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                if node.tag().eq_ignore_ascii_case("option") {
                    let option_value = node
                        .properties
                        .get("value")
                        .and_then(PropValue::as_str)
                        .map(str::to_string)
                        .or_else(|| node.attributes.get("value").cloned());
                    if option_value.as_deref() == Some(value) {
                        return true;
                    }
                }
                stack.extend(node.children.iter().copied());
            }
        }
        false
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDocument for MemoryDocument {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> HostNodeId {
        let id = self.alloc(MemoryNode::new(MemoryNodeKind::Element {
            tag: tag.to_string(),
            namespace: namespace.map(str::to_string),
        }));
        self.ops.push(HostOp::CreateElement {
            node: id,
            tag: tag.to_string(),
        });
        id
    }

    fn create_text(&mut self, text: &str) -> HostNodeId {
        let id = self.alloc(MemoryNode::new(MemoryNodeKind::Text(text.to_string())));
        self.ops.push(HostOp::CreateText {
            node: id,
            text: text.to_string(),
        });
        id
    }

    fn root(&self) -> HostNodeId {
        self.root
    }

    fn contains(&self, node: HostNodeId) -> bool {
        self.node(node).is_some()
    }

    fn parent(&self, node: HostNodeId) -> Option<HostNodeId> {
        self.node(node)?.parent
    }

    fn children(&self, node: HostNodeId) -> Vec<HostNodeId> {
        self.node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn tag_name(&self, node: HostNodeId) -> Option<String> {
        self.node(node).map(|n| n.tag().to_string())
    }

    fn insert_before(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        anchor: Option<HostNodeId>,
    ) -> Result<(), HostError> {
        if self.node(parent).is_none() {
            return Err(HostError::Missing { node: parent });
        }
        if self.node(child).is_none() {
            return Err(HostError::Missing { node: child });
        }
        if let Some(anchor) = anchor {
            if self.parent(anchor) != Some(parent) {
                return Err(HostError::NotAChild {
                    parent,
                    child: anchor,
                });
            }
        }
        self.attach(parent, child, anchor);
        self.ops.push(HostOp::Insert {
            parent,
            child,
            anchor,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        if self.parent(child) != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child);
        self.ops.push(HostOp::Remove { parent, child });
        Ok(())
    }

    fn replace_child(
        &mut self,
        parent: HostNodeId,
        new_child: HostNodeId,
        old_child: HostNodeId,
    ) -> Result<(), HostError> {
        if self.parent(old_child) != Some(parent) {
            return Err(HostError::NotAChild {
                parent,
                child: old_child,
            });
        }
        if self.node(new_child).is_none() {
            return Err(HostError::Missing { node: new_child });
        }
        self.attach(parent, new_child, Some(old_child));
        self.detach(old_child);
        self.ops.push(HostOp::Replace {
            parent,
            new_child,
            old_child,
        });
        Ok(())
    }

    fn get_attribute(&self, node: HostNodeId, name: &str) -> Option<String> {
        self.node(node)?.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, node: HostNodeId, name: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            n.attributes.insert(name.to_string(), value.to_string());
            n.attribute_namespaces.shift_remove(name);
            self.ops.push(HostOp::SetAttribute {
                node,
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    fn set_attribute_ns(&mut self, node: HostNodeId, namespace: &str, name: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            n.attributes.insert(name.to_string(), value.to_string());
            n.attribute_namespaces
                .insert(name.to_string(), namespace.to_string());
            self.ops.push(HostOp::SetAttribute {
                node,
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    fn remove_attribute(&mut self, node: HostNodeId, name: &str) {
        if let Some(n) = self.node_mut(node) {
            if n.attributes.shift_remove(name).is_some() {
                n.attribute_namespaces.shift_remove(name);
                self.ops.push(HostOp::RemoveAttribute {
                    node,
                    name: name.to_string(),
                });
            }
        }
    }

    fn get_property(&self, node: HostNodeId, name: &str) -> Option<PropValue> {
        self.node(node)?.properties.get(name).cloned()
    }

    fn set_property(&mut self, node: HostNodeId, name: &str, value: PropValue) {
        let is_select = self
            .node(node)
            .map(|n| n.tag().eq_ignore_ascii_case("select"))
            .unwrap_or(false);
        let value = match (&value, is_select && name == "value") {
            (PropValue::Str(v), true) if !self.select_accepts(node, v) => PropValue::str(""),
            _ => value,
        };
        if let Some(n) = self.node_mut(node) {
            n.properties.insert(name.to_string(), value);
            self.ops.push(HostOp::SetProperty {
                node,
                name: name.to_string(),
            });
        }
    }

    fn set_style(&mut self, node: HostNodeId, name: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            if value.is_empty() {
                n.styles.shift_remove(name);
            } else {
                n.styles.insert(name.to_string(), value.to_string());
            }
            self.ops.push(HostOp::SetStyle {
                node,
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    fn add_event_listener(&mut self, node: HostNodeId, event: &str, listener: Listener) {
        if let Some(n) = self.node_mut(node) {
            n.listeners.push((event.to_string(), listener));
            self.ops.push(HostOp::AddListener {
                node,
                event: event.to_string(),
            });
        }
    }

    fn remove_event_listener(&mut self, node: HostNodeId, event: &str, listener: &Listener) {
        if let Some(n) = self.node_mut(node) {
            let before = n.listeners.len();
            n.listeners
                .retain(|(name, l)| !(name == event && Rc::ptr_eq(l, listener)));
            if n.listeners.len() != before {
                self.ops.push(HostOp::RemoveListener {
                    node,
                    event: event.to_string(),
                });
            }
        }
    }

    fn invoke(&mut self, node: HostNodeId, operation: NodeOperation) {
        if self.node(node).is_some() {
            self.ops.push(HostOp::Invoke { node, operation });
        }
    }
}
