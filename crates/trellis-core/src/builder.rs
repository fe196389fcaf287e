//! Turns rendered node lists into linked wrapper lists.

use std::rc::Rc;

use crate::component::ComponentId;
use crate::engine::Engine;
use crate::host::HostDocument;
use crate::node::{ComponentRef, ElementNode, Node};
use crate::wrapper::{Wrapper, WrapperId, WrapperKind};

impl<D: HostDocument> Engine<D> {
    /// Builds wrappers for `rendered` under `parent`. `current_parent` is the
    /// wrapper `parent` replaces, if any.
    pub(crate) fn rendered_to_wrappers(
        &mut self,
        rendered: &[Node],
        parent: WrapperId,
        current_parent: Option<WrapperId>,
    ) -> Rc<[WrapperId]> {
        let (depth, namespace, parent_is_component, parent_id, wants_anchor) = {
            let p = &self.tree[parent];
            (
                p.depth,
                p.namespace.clone(),
                p.is_component(),
                p.component_id(),
                p.requires_insert_before || p.has_previous_siblings != Some(false),
            )
        };
        let replaced_children = current_parent
            .and_then(|c| self.tree.get(c))
            .filter(|c| c.is_element())
            .and_then(|c| c.children.as_ref().map(|list| list.len()))
            .unwrap_or(0);
        let requires_insert_before = (wants_anchor && parent_is_component)
            || (replaced_children > 0 && rendered.len() > 1);

        if parent_is_component {
            if let Some(owner) = parent_id {
                self.map_nodes_to_owner(rendered, owner);
            }
        }

        let mut wrappers = Vec::with_capacity(rendered.len());
        let mut previous: Option<WrapperId> = None;
        for (order, node) in rendered.iter().enumerate() {
            let node = match node {
                Node::Empty => continue,
                Node::Text(text) => Node::Element(Rc::new(ElementNode::text_node(text))),
                other => other.clone(),
            };
            let mut wrapper = Wrapper::new(node, depth + 1, order);
            wrapper.requires_insert_before = requires_insert_before;
            wrapper.has_parent_component = parent_is_component;
            wrapper.namespace = namespace.clone();
            let mut animated = false;
            if let Some(element) = wrapper.element().cloned() {
                if let Some(ns) = &element.namespace {
                    wrapper.namespace = Some(ns.clone());
                }
                if let Some(callback) = &element.deferred_properties {
                    if let WrapperKind::Element {
                        deferred_properties,
                        ..
                    } = &mut wrapper.kind
                    {
                        *deferred_properties = Some(callback(false));
                    }
                }
                animated = element.exit_animation.is_some();
            }
            let is_component = wrapper.is_component();
            let id = self.tree.insert(wrapper);
            self.tree.set_parent(id, parent);
            if let Some(prev) = previous {
                self.tree.set_sibling(prev, id);
            }
            if animated {
                self.mark_animations(parent);
            }
            if is_component {
                self.resolve_registry_item(id, parent_id);
            }
            wrappers.push(id);
            previous = Some(id);
        }
        Rc::from(wrappers)
    }

    /// Flags `wrapper` and its ancestors as containing exit animations.
    fn mark_animations(&mut self, wrapper: WrapperId) {
        let mut cursor = Some(wrapper);
        while let Some(id) = cursor {
            match self.tree.get_mut(id) {
                Some(w) if !w.has_animations => w.has_animations = true,
                _ => break,
            }
            cursor = self.tree.parent_of(id);
        }
    }

    /// Records `owner` as the renderer of every node reachable from `nodes`
    /// that has no owner yet.
    fn map_nodes_to_owner(&mut self, nodes: &[Node], owner: ComponentId) {
        let mut stack: Vec<&Node> = nodes.iter().collect();
        while let Some(node) = stack.pop() {
            let Some(identity) = node.identity() else {
                continue;
            };
            if self.owners.contains_key(&identity) {
                continue;
            }
            self.owners.insert(identity, (node.clone(), owner));
            stack.extend(node.children());
        }
    }

    fn owner_of(&self, node: &Node) -> Option<ComponentId> {
        node.identity()
            .and_then(|identity| self.owners.get(&identity))
            .map(|(_, owner)| *owner)
    }

    /// Resolves a label or lazy component reference through the mount
    /// registry. A miss subscribes the owning component so it re-renders
    /// when the registry changes.
    pub(crate) fn resolve_registry_item(&mut self, wrapper: WrapperId, fallback: Option<ComponentId>) {
        let node = self.tree[wrapper].node.clone();
        let Some(component) = node.as_component() else {
            return;
        };
        let label = match &component.constructor {
            ComponentRef::Constructor(_) => return,
            ComponentRef::Label(label) => label.clone(),
            ComponentRef::Lazy { label, .. } => label.clone(),
        };
        let Some(registry) = self.options.registry.clone() else {
            log::warn!("component `{label}` rendered without a registry");
            return;
        };
        if let ComponentRef::Lazy { item, .. } = &component.constructor {
            if !registry.has(&label) {
                registry.define(&label, item.clone());
            }
        }
        let owner = self.owner_of(&node).or(fallback);
        match registry.get(&label) {
            Some(constructor) => {
                if let WrapperKind::Component { resolved, .. } = &mut self.tree[wrapper].kind {
                    *resolved = Some(constructor);
                }
            }
            None => {
                log::debug!("component `{label}` is not registered yet");
                if let Some(owner) = owner {
                    self.subscribe_to_registry(owner);
                }
            }
        }
    }

    fn subscribe_to_registry(&mut self, owner: ComponentId) {
        let Some(registry) = self.options.registry.clone() else {
            return;
        };
        let Some(meta) = self.store.meta(owner) else {
            return;
        };
        let Some(record) = self.components.get_mut(&owner) else {
            return;
        };
        if !record.subscriptions.is_empty() {
            return;
        }
        let invalidator = self.store.invalidator(&meta);
        let subscription = registry.subscribe(Rc::new(move || invalidator.invalidate()));
        record.subscriptions.push(subscription);
    }
}
