//! Engine-private wrapper records and the relation tables linking them.
//!
//! Wrappers live in a generational arena. Parent and next-sibling links are
//! kept in side tables keyed by [`WrapperId`] so nodes, which may be shared
//! between passes, never carry back-pointers.

use std::cell::RefCell;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use crate::collections::{map::HashMap, new_map};
use crate::component::{ComponentId, Constructor};
use crate::host::HostNodeId;
use crate::node::{ComponentNode, ElementNode, Node};
use crate::properties::Properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapperId {
    index: u32,
    generation: u32,
}

/// Unconsumed pre-existing host children offered for adoption.
pub(crate) type MergeNodes = Rc<RefCell<Vec<HostNodeId>>>;

pub(crate) enum WrapperKind {
    Element {
        merged: bool,
        inserted: bool,
        deferred_properties: Option<Properties>,
    },
    Component {
        id: Option<ComponentId>,
        resolved: Option<Constructor>,
        merge_nodes: Option<MergeNodes>,
    },
}

pub(crate) struct Wrapper {
    pub(crate) node: Node,
    pub(crate) depth: usize,
    pub(crate) order: usize,
    pub(crate) requires_insert_before: bool,
    pub(crate) has_previous_siblings: Option<bool>,
    pub(crate) has_parent_component: bool,
    pub(crate) namespace: Option<Rc<str>>,
    pub(crate) has_animations: bool,
    pub(crate) host: Option<HostNodeId>,
    pub(crate) children: Option<Rc<[WrapperId]>>,
    pub(crate) kind: WrapperKind,
}

impl Wrapper {
    pub(crate) fn new(node: Node, depth: usize, order: usize) -> Self {
        let kind = match node {
            Node::Component(_) => WrapperKind::Component {
                id: None,
                resolved: None,
                merge_nodes: None,
            },
            _ => WrapperKind::Element {
                merged: false,
                inserted: false,
                deferred_properties: None,
            },
        };
        Self {
            node,
            depth,
            order,
            requires_insert_before: false,
            has_previous_siblings: None,
            has_parent_component: false,
            namespace: None,
            has_animations: false,
            host: None,
            children: None,
            kind,
        }
    }

    pub(crate) fn element(&self) -> Option<&Rc<ElementNode>> {
        self.node.as_element()
    }

    pub(crate) fn component_node(&self) -> Option<&Rc<ComponentNode>> {
        self.node.as_component()
    }

    pub(crate) fn is_element(&self) -> bool {
        matches!(self.kind, WrapperKind::Element { .. })
    }

    pub(crate) fn is_component(&self) -> bool {
        matches!(self.kind, WrapperKind::Component { .. })
    }

    pub(crate) fn component_id(&self) -> Option<ComponentId> {
        match &self.kind {
            WrapperKind::Component { id, .. } => *id,
            WrapperKind::Element { .. } => None,
        }
    }

    /// Registry-resolved constructor, falling back to a direct reference.
    pub(crate) fn constructor(&self) -> Option<Constructor> {
        match &self.kind {
            WrapperKind::Component { resolved, .. } => resolved.clone().or_else(|| {
                self.component_node()
                    .and_then(|c| c.constructor.constructor().cloned())
            }),
            WrapperKind::Element { .. } => None,
        }
    }

    pub(crate) fn is_merged(&self) -> bool {
        matches!(self.kind, WrapperKind::Element { merged: true, .. })
    }

    pub(crate) fn children_list(&self) -> Rc<[WrapperId]> {
        self.children.clone().unwrap_or_else(|| Rc::from(Vec::new()))
    }

    /// Properties in effect on the host: deferred ones under explicit ones.
    pub(crate) fn effective_properties(&self) -> Properties {
        let explicit = self
            .element()
            .map(|e| e.properties.clone())
            .unwrap_or_default();
        match &self.kind {
            WrapperKind::Element {
                deferred_properties: Some(deferred),
                ..
            } => {
                let mut merged = deferred.clone();
                merged.extend(explicit);
                merged
            }
            _ => explicit,
        }
    }
}

struct Slot {
    generation: u32,
    wrapper: Option<Wrapper>,
}

/// Wrapper arena plus parent and next-sibling relation tables.
pub(crate) struct WrapperTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    parent: HashMap<WrapperId, WrapperId>,
    sibling: HashMap<WrapperId, WrapperId>,
}

impl WrapperTree {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            parent: new_map(),
            sibling: new_map(),
        }
    }

    pub(crate) fn insert(&mut self, wrapper: Wrapper) -> WrapperId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.wrapper = Some(wrapper);
            return WrapperId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            wrapper: Some(wrapper),
        });
        WrapperId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: WrapperId) -> Option<&Wrapper> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.wrapper.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: WrapperId) -> Option<&mut Wrapper> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.wrapper.as_mut())
    }

    pub(crate) fn contains(&self, id: WrapperId) -> bool {
        self.get(id).is_some()
    }

    /// Frees a wrapper and drops its relation entries.
    pub(crate) fn remove(&mut self, id: WrapperId) -> Option<Wrapper> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let wrapper = slot.wrapper.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.unlink(id);
        Some(wrapper)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.wrapper.is_some()).count()
    }

    pub(crate) fn parent_of(&self, id: WrapperId) -> Option<WrapperId> {
        self.parent.get(&id).copied()
    }

    pub(crate) fn sibling_of(&self, id: WrapperId) -> Option<WrapperId> {
        self.sibling.get(&id).copied()
    }

    pub(crate) fn set_parent(&mut self, child: WrapperId, parent: WrapperId) {
        self.parent.insert(child, parent);
    }

    pub(crate) fn set_sibling(&mut self, wrapper: WrapperId, next: WrapperId) {
        self.sibling.insert(wrapper, next);
    }

    pub(crate) fn unlink(&mut self, id: WrapperId) {
        self.parent.remove(&id);
        self.sibling.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn relation_count(&self) -> usize {
        self.parent.len() + self.sibling.len()
    }

    /// Nearest ancestor that is a component wrapper.
    pub(crate) fn parent_component(&self, id: WrapperId) -> Option<WrapperId> {
        let mut cursor = self.parent_of(id);
        while let Some(parent) = cursor {
            if self.get(parent).map(Wrapper::is_component).unwrap_or(false) {
                return Some(parent);
            }
            cursor = self.parent_of(parent);
        }
        None
    }

    /// Host node of the nearest ancestor element that has one.
    pub(crate) fn parent_host(&self, id: WrapperId) -> Option<HostNodeId> {
        let mut cursor = self.parent_of(id);
        while let Some(parent) = cursor {
            if let Some(wrapper) = self.get(parent) {
                if wrapper.is_element() {
                    if let Some(host) = wrapper.host {
                        return Some(host);
                    }
                }
            }
            cursor = self.parent_of(parent);
        }
        None
    }

    /// Host node of the nearest ancestor element, or `None` when that
    /// element has not been materialised yet.
    pub(crate) fn direct_parent_host(&self, id: WrapperId) -> Option<HostNodeId> {
        let mut cursor = self.parent_of(id);
        while let Some(parent) = cursor {
            let wrapper = self.get(parent)?;
            if wrapper.is_element() {
                return wrapper.host;
            }
            cursor = self.parent_of(parent);
        }
        None
    }
}

impl Index<WrapperId> for WrapperTree {
    type Output = Wrapper;

    fn index(&self, id: WrapperId) -> &Wrapper {
        match self.get(id) {
            Some(wrapper) => wrapper,
            None => panic!("wrapper {id:?} used after it was freed"),
        }
    }
}

impl IndexMut<WrapperId> for WrapperTree {
    fn index_mut(&mut self, id: WrapperId) -> &mut Wrapper {
        match self.get_mut(id) {
            Some(wrapper) => wrapper,
            None => panic!("wrapper {id:?} used after it was freed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::element;

    #[test]
    fn freed_slots_are_reused_with_a_new_generation() {
        let mut tree = WrapperTree::new();
        let a = tree.insert(Wrapper::new(element("a").into(), 1, 0));
        let b = tree.insert(Wrapper::new(element("b").into(), 1, 1));
        tree.set_sibling(a, b);
        assert!(tree.remove(a).is_some());
        assert_eq!(tree.relation_count(), 0);

        let c = tree.insert(Wrapper::new(element("c").into(), 1, 0));
        assert_ne!(a, c);
        assert!(tree.get(a).is_none());
        assert_eq!(tree[c].element().map(|e| e.tag.to_string()), Some("c".into()));
    }

    #[test]
    fn parent_lookups_skip_component_wrappers() {
        let mut tree = WrapperTree::new();
        let mut root = Wrapper::new(element("root").into(), 0, 0);
        root.host = Some(42);
        let root = tree.insert(root);
        let comp_node = crate::node::component(&Constructor::functional("C", |_| Vec::new()));
        let comp = tree.insert(Wrapper::new(comp_node.into(), 1, 0));
        let leaf = tree.insert(Wrapper::new(element("span").into(), 2, 0));
        tree.set_parent(comp, root);
        tree.set_parent(leaf, comp);

        assert_eq!(tree.parent_host(leaf), Some(42));
        assert_eq!(tree.direct_parent_host(leaf), Some(42));
        assert_eq!(tree.parent_component(leaf), Some(comp));
    }
}
