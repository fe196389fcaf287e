//! Element diffing and the host mutation phase.
//!
//! Diffing only decides what changes; host nodes are created, moved and
//! written when the application queue runs.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::animation::ExitCompletion;
use crate::engine::{Application, DeferredEffect, Engine, PreviousProperties, ProcessResult, Work};
use crate::host::{
    HostDocument, HostNodeId, Listener, NodeOperation, RenderError, SVG_NAMESPACE, XLINK_NAMESPACE,
};
use crate::node::{DiffMode, ElementNode};
use crate::properties::{class_string, Callback, PropValue, Properties};
use crate::wrapper::{WrapperId, WrapperKind};

fn text_changed(current: &ElementNode, next: &ElementNode) -> bool {
    match &next.text {
        Some(text) if !text.is_empty() => current.text.as_deref() != Some(&**text),
        _ => false,
    }
}

impl<D: HostDocument> Engine<D> {
    pub(crate) fn create_element(&mut self, next: WrapperId) -> ProcessResult {
        let Some(element) = self.tree[next].element().cloned() else {
            return ProcessResult::default();
        };
        let mut merge_nodes = Vec::new();
        match self.tree[next].host {
            None => {
                if let Some(host) = element.host_node {
                    self.tree[next].host = Some(host);
                } else if &*element.tag == "svg" {
                    self.tree[next].namespace = Some(Rc::from(SVG_NAMESPACE));
                }
                let anchor = match (self.insert_before.is_some(), self.all_merged.first()) {
                    (true, Some(&first)) => {
                        let parent = self.tree.direct_parent_host(next);
                        (parent.is_some() && parent == self.document.parent(first)).then_some(first)
                    }
                    _ => None,
                };
                if let (Some(anchor), Some(anchors)) = (anchor, self.insert_before.as_mut()) {
                    anchors.insert(next, anchor);
                }
            }
            Some(host) => {
                if self.options.merge {
                    merge_nodes = self.document.children(host);
                    self.all_merged.extend(merge_nodes.iter().copied());
                }
                if let WrapperKind::Element { merged, .. } = &mut self.tree[next].kind {
                    *merged = true;
                }
            }
        }
        let children = element
            .children
            .as_ref()
            .map(|children| self.rendered_to_wrappers(children, next, None));
        self.tree[next].children = children.clone();
        ProcessResult {
            item: children.map(|children| Work::Diff {
                current: Rc::from(Vec::new()),
                next: children,
                merge_nodes: Some(Rc::new(RefCell::new(merge_nodes))),
                old_index: 0,
                new_index: 0,
            }),
            side: None,
            application: Some(Application::Create { wrapper: next }),
        }
    }

    pub(crate) fn update_element(&mut self, current: WrapperId, next: WrapperId) -> ProcessResult {
        let (Some(current_element), Some(next_element)) = (
            self.tree[current].element().cloned(),
            self.tree[next].element().cloned(),
        ) else {
            return ProcessResult::default();
        };
        let host = self.tree[current].host;
        let namespace = self.tree[current].namespace.clone();
        {
            let wrapper = &mut self.tree[next];
            wrapper.host = host;
            wrapper.namespace = namespace;
        }
        let children = if text_changed(&current_element, &next_element) {
            None
        } else {
            next_element
                .children
                .as_ref()
                .map(|children| self.rendered_to_wrappers(children, next, Some(current)))
        };
        self.tree[next].children = children.clone();
        let previous = self.tree[current].children_list();
        self.retire(current);
        ProcessResult {
            item: Some(Work::diff(
                previous,
                children.unwrap_or_else(|| Rc::from(Vec::new())),
            )),
            side: None,
            application: Some(Application::Update { current, next }),
        }
    }

    pub(crate) fn remove_element(&mut self, current: WrapperId) -> ProcessResult {
        self.tree.unlink(current);
        let children = self.tree[current].children_list();
        if self.tree[current].has_animations {
            return ProcessResult {
                item: Some(Work::diff(children, Rc::from(Vec::new()))),
                side: None,
                application: Some(Application::Delete { wrapper: current }),
            };
        }
        if !children.is_empty() {
            self.deactivate_subtree(&children);
            self.deferred_effects.push(DeferredEffect::Purge { children });
        }
        ProcessResult {
            item: None,
            side: None,
            application: Some(Application::Delete { wrapper: current }),
        }
    }

    /// Applies queued host mutations in order.
    pub(crate) fn run_application_queue(&mut self) -> Result<(), RenderError> {
        let queue = std::mem::take(&mut self.application_queue);
        log::trace!("applying {} host mutations", queue.len());
        for application in queue {
            match application {
                Application::Create { wrapper } => self.apply_create(wrapper)?,
                Application::Update { current, next } => self.apply_update(current, next)?,
                Application::Delete { wrapper } => self.apply_delete(wrapper)?,
                Application::Attach { id, attached } => {
                    if let Some(record) = self.components.get_mut(&id) {
                        record.lifecycle.attach(attached);
                    }
                }
                Application::Detach {
                    wrapper,
                    mut record,
                } => {
                    record.lifecycle.detach();
                    self.retire(wrapper);
                }
            }
        }
        if self.deferred_process.is_empty() {
            self.owners.clear();
        }
        self.release_retired();
        Ok(())
    }

    fn apply_create(&mut self, wrapper: WrapperId) -> Result<(), RenderError> {
        let Some(element) = self.tree.get(wrapper).and_then(|w| w.element().cloned()) else {
            return Ok(());
        };
        let host = match self.tree[wrapper].host {
            Some(host) => host,
            None => {
                let host = if element.is_text() {
                    self.document
                        .create_text(element.text.as_deref().unwrap_or_default())
                } else {
                    let namespace = self.tree[wrapper].namespace.clone();
                    self.document.create_element(&element.tag, namespace.as_deref())
                };
                self.tree[wrapper].host = Some(host);
                host
            }
        };
        if self.tree[wrapper].has_parent_component {
            self.set_host_on_parent_components(wrapper);
        }
        if !element.is_text() {
            self.process_properties(wrapper, &PreviousProperties::default());
            self.run_deferred_properties(wrapper);
        }

        if !self.tree[wrapper].is_merged() {
            let Some(parent) = self.tree.parent_host(wrapper) else {
                return Err(RenderError::NotMounted);
            };
            let anchor = if self.tree[wrapper].requires_insert_before {
                self.find_insert_before(wrapper, parent)
            } else {
                self.insert_before
                    .as_ref()
                    .and_then(|anchors| anchors.get(&wrapper).copied())
                    .filter(|&anchor| self.document.parent(anchor) == Some(parent))
            };
            self.document.insert_before(parent, host, anchor)?;
            if let Some(hook) = &element.on_attach {
                hook();
            }
        }

        if element.tag.eq_ignore_ascii_case("option") {
            if let Some(select) = self.document.parent(host) {
                self.set_value(select, None, None);
            }
        }
        if let Some(animation) = &element.enter_animation {
            let transition = self.options.transition.clone();
            transition.enter(host, &element.properties, animation);
        }
        self.register_keyed_node(wrapper, &element, host);
        if let WrapperKind::Element { inserted, .. } = &mut self.tree[wrapper].kind {
            *inserted = true;
        }
        Ok(())
    }

    fn apply_update(&mut self, current: WrapperId, next: WrapperId) -> Result<(), RenderError> {
        let (Some(current_element), Some(next_element)) = (
            self.tree.get(current).and_then(|w| w.element().cloned()),
            self.tree.get(next).and_then(|w| w.element().cloned()),
        ) else {
            return Ok(());
        };
        let Some(host) = self.tree[next].host else {
            return Ok(());
        };
        if text_changed(&current_element, &next_element) {
            let text = next_element.text.as_deref().unwrap_or_default();
            let replacement = self.document.create_text(text);
            if let Some(parent) = self.document.parent(host) {
                self.document.replace_child(parent, replacement, host)?;
            }
            self.tree[next].host = Some(replacement);
            return Ok(());
        }
        if next_element.is_text() {
            return Ok(());
        }
        let previous = self.previous_properties(current, &current_element);
        self.process_properties(next, &previous);
        self.run_deferred_properties(next);
        self.register_keyed_node(next, &next_element, host);
        Ok(())
    }

    fn apply_delete(&mut self, wrapper: WrapperId) -> Result<(), RenderError> {
        let Some(element) = self.tree.get(wrapper).and_then(|w| w.element().cloned()) else {
            return Ok(());
        };
        if let Some(host) = self.tree[wrapper].host.take() {
            match &element.exit_animation {
                Some(animation) => {
                    let done = ExitCompletion::new(host, self.runtime.handle());
                    let transition = self.options.transition.clone();
                    transition.exit(host, &element.properties, animation, done);
                }
                None => {
                    self.forget_host(host);
                    if let Some(parent) = self.document.parent(host) {
                        self.document.remove_child(parent, host)?;
                    }
                }
            }
        }
        self.retire(wrapper);
        Ok(())
    }

    fn register_keyed_node(&mut self, wrapper: WrapperId, element: &Rc<ElementNode>, host: HostNodeId) {
        let Some(key) = &element.key else {
            return;
        };
        let identity = self.tree[wrapper].node.identity();
        let owner = identity
            .and_then(|identity| self.owners.get(&identity))
            .map(|(_, owner)| *owner);
        if let Some(owner) = owner {
            self.store.add_node(owner, key, host);
        }
    }

    /// Gives component ancestors without a host node this wrapper's host.
    fn set_host_on_parent_components(&mut self, wrapper: WrapperId) {
        let host = self.tree[wrapper].host;
        let mut cursor = self.tree.parent_component(wrapper);
        while let Some(component) = cursor {
            if self.tree[component].host.is_some() {
                break;
            }
            self.tree[component].host = host;
            cursor = self
                .tree
                .parent_of(component)
                .filter(|&parent| self.tree[parent].is_component());
        }
    }

    /// First host node after `wrapper` among its siblings, climbing through
    /// component boundaries.
    fn find_insert_before(&self, wrapper: WrapperId, parent: HostNodeId) -> Option<HostNodeId> {
        let mut search = wrapper;
        loop {
            if let Some(sibling) = self.tree.sibling_of(search) {
                let host = self.tree.get(sibling).and_then(|w| w.host);
                if let Some(host) = host {
                    if self.document.parent(host) == Some(parent) {
                        return Some(host);
                    }
                }
                search = sibling;
                continue;
            }
            match self.tree.parent_of(search) {
                Some(up) if self.tree.get(up).map(|w| w.is_component()).unwrap_or(false) => {
                    search = up;
                }
                _ => return None,
            }
        }
    }

    fn previous_properties(&self, current: WrapperId, element: &ElementNode) -> PreviousProperties {
        match element.diff_mode {
            DiffMode::Vdom => PreviousProperties {
                properties: self.tree[current].effective_properties(),
                attributes: element.attributes.clone(),
                events: element.events.clone(),
            },
            DiffMode::None => PreviousProperties {
                properties: Properties::new(),
                attributes: element.attributes.as_ref().map(|_| IndexMap::new()),
                events: element.events.clone(),
            },
            DiffMode::Dom => {
                let host = self.tree[current].host;
                let read = |name: &str| host.and_then(|h| self.document.get_attribute(h, name));
                let mut properties = Properties::new();
                match &element.attributes {
                    Some(attributes) => {
                        for name in element.properties.keys() {
                            let value = host
                                .and_then(|h| self.document.get_property(h, name))
                                .unwrap_or(PropValue::Null);
                            properties.insert(name.clone(), value);
                        }
                        PreviousProperties {
                            properties,
                            attributes: Some(
                                attributes
                                    .keys()
                                    .map(|name| (name.clone(), read(name)))
                                    .collect(),
                            ),
                            events: element.events.clone(),
                        }
                    }
                    None => {
                        for name in element.properties.keys() {
                            let value = match read(name) {
                                Some(value) => PropValue::str(value),
                                None => host
                                    .and_then(|h| self.document.get_property(h, name))
                                    .unwrap_or(PropValue::Null),
                            };
                            properties.insert(name.clone(), value);
                        }
                        PreviousProperties {
                            properties,
                            attributes: None,
                            events: element.events.clone(),
                        }
                    }
                }
            }
        }
    }

    fn process_properties(&mut self, wrapper: WrapperId, previous: &PreviousProperties) {
        let Some(element) = self.tree[wrapper].element().cloned() else {
            return;
        };
        let Some(host) = self.tree[wrapper].host else {
            return;
        };
        match (&element.attributes, &element.events) {
            (Some(attributes), Some(events)) => {
                let namespace = self.tree[wrapper].namespace.clone();
                self.update_attributes(host, previous.attributes.as_ref(), attributes, namespace.as_deref());
                self.set_properties(wrapper, host, &previous.properties, false);
                if let Some(previous_events) = &previous.events {
                    for (name, callback) in previous_events {
                        if !events.contains_key(name) {
                            self.remove_listener(host, name, callback);
                        }
                    }
                }
                for (name, callback) in events {
                    let before = previous.events.as_ref().and_then(|e| e.get(name));
                    self.update_event(host, name, callback, before);
                }
            }
            _ => self.set_properties(wrapper, host, &previous.properties, true),
        }
    }

    fn update_attributes(
        &mut self,
        host: HostNodeId,
        previous: Option<&IndexMap<String, Option<String>>>,
        attributes: &IndexMap<String, Option<String>>,
        namespace: Option<&str>,
    ) {
        for (name, value) in attributes {
            let before = previous.and_then(|p| p.get(name)).and_then(|v| v.as_deref());
            if value.as_deref() != before {
                self.update_attribute(host, name, value.as_deref(), namespace);
            }
        }
        if let Some(previous) = previous {
            for name in previous.keys() {
                if !attributes.contains_key(name) {
                    self.document.remove_attribute(host, name);
                }
            }
        }
    }

    fn update_attribute(&mut self, host: HostNodeId, name: &str, value: Option<&str>, namespace: Option<&str>) {
        match value {
            Some(value) if namespace == Some(SVG_NAMESPACE) && name == "href" => {
                self.document
                    .set_attribute_ns(host, XLINK_NAMESPACE, name, value);
            }
            Some("") if name == "role" => self.document.remove_attribute(host, name),
            Some(value) => self.document.set_attribute(host, name, value),
            None => self.document.remove_attribute(host, name),
        }
    }

    fn set_properties(
        &mut self,
        wrapper: WrapperId,
        host: HostNodeId,
        previous: &Properties,
        include_events_and_attributes: bool,
    ) {
        let properties = self.tree[wrapper].effective_properties();
        let merged = self.tree[wrapper].is_merged();
        let namespace = self.tree[wrapper].namespace.clone();

        if !properties.contains_key("classes") && previous.contains_key("classes") {
            self.document.remove_attribute(host, "class");
        }
        if include_events_and_attributes {
            for (name, value) in previous {
                let Some(event) = name.strip_prefix("on") else {
                    continue;
                };
                let still_bound = properties.get(name).map(PropValue::is_truthy).unwrap_or(false);
                if !still_bound {
                    if let Some(callback) = value.as_callback() {
                        self.remove_listener(host, event, callback);
                    }
                }
            }
        }

        for (name, value) in &properties {
            let before = previous.get(name);
            if name == "classes" {
                let previous_classes = class_string(before);
                let mut classes = class_string(Some(value));
                if previous_classes == classes {
                    continue;
                }
                if classes.is_empty() {
                    self.document.remove_attribute(host, "class");
                    continue;
                }
                if merged {
                    if let Some(existing) = self.document.get_attribute(host, "class") {
                        let mut union: Vec<&str> = existing.split_whitespace().collect();
                        for class in classes.split_whitespace() {
                            if !union.contains(&class) {
                                union.push(class);
                            }
                        }
                        classes = union.join(" ");
                    }
                }
                self.document.set_attribute(host, "class", &classes);
            } else if let Some(operation) = NodeOperation::from_property(name) {
                let was_set = before.map(PropValue::is_truthy).unwrap_or(false);
                if value.is_truthy() && !was_set {
                    self.deferred_effects
                        .push(DeferredEffect::NodeOperation { host, operation });
                }
            } else if name == "styles" {
                let Some(styles) = value.as_map() else {
                    continue;
                };
                let previous_styles = before.and_then(PropValue::as_map);
                for (style, style_value) in styles {
                    if previous_styles.and_then(|p| p.get(style)) == Some(style_value) {
                        continue;
                    }
                    let text = if style_value.is_truthy() {
                        style_value.to_host_string()
                    } else {
                        String::new()
                    };
                    self.document.set_style(host, style, &text);
                }
            } else {
                let value = if !value.is_truthy() && matches!(before, Some(PropValue::Str(_))) {
                    PropValue::str("")
                } else {
                    value.clone()
                };
                if name == "value" {
                    if self.document.tag_name(host).as_deref() == Some("select") {
                        self.select_values.insert(host, value.clone());
                    }
                    self.set_value(host, Some(&value), before);
                } else if name != "key" && Some(&value) != before {
                    match &value {
                        PropValue::Callback(callback)
                            if include_events_and_attributes && name.starts_with("on") =>
                        {
                            let previous_callback = before.and_then(PropValue::as_callback);
                            self.update_event(host, &name[2..], callback, previous_callback);
                        }
                        PropValue::Str(text) if include_events_and_attributes && name != "innerHTML" => {
                            self.update_attribute(host, name, Some(text), namespace.as_deref());
                        }
                        _ if name == "scrollLeft" || name == "scrollTop" => {
                            if self.document.get_property(host, name).as_ref() != Some(&value) {
                                self.document.set_property(host, name, value);
                            }
                        }
                        _ => self.document.set_property(host, name, value),
                    }
                }
            }
        }
    }

    /// Reconciles the `value` property with what the user typed and with a
    /// select whose options may not exist yet.
    fn set_value(&mut self, host: HostNodeId, value: Option<&PropValue>, previous: Option<&PropValue>) {
        let dom_value = self.document.get_property(host, "value");
        let typed = self.input_values.borrow().get(&host).cloned();
        let pending_select = self
            .select_values
            .get(&host)
            .filter(|pending| pending.is_truthy() && Some(*pending) != dom_value.as_ref())
            .cloned();
        if let Some(pending) = pending_select {
            self.document.set_property(host, "value", pending.clone());
            if self.document.get_property(host, "value").as_ref() == Some(&pending) {
                self.select_values.remove(&host);
            }
            return;
        }
        let typed_matches = match (&typed, &dom_value) {
            (Some(typed), Some(dom)) => dom.as_str() == Some(typed.as_str()),
            _ => false,
        };
        if typed_matches || value != previous {
            if let Some(value) = value {
                self.document.set_property(host, "value", value.clone());
            }
            self.input_values.borrow_mut().remove(&host);
        }
    }

    fn update_event(&mut self, host: HostNodeId, event: &str, callback: &Callback, previous: Option<&Callback>) {
        if previous == Some(callback) {
            return;
        }
        if let Some(previous) = previous {
            self.remove_listener(host, event, previous);
        }
        let listener: Listener = if event == "input" {
            let inputs = self.input_values.clone();
            let callback = callback.clone();
            Rc::new(move |e| {
                callback.call(e);
                if let Some(value) = &e.value {
                    inputs.borrow_mut().insert(e.target, value.clone());
                }
            })
        } else {
            callback.listener()
        };
        self.document.add_event_listener(host, event, listener.clone());
        self.listeners.insert((host, callback.identity()), listener);
    }

    fn remove_listener(&mut self, host: HostNodeId, event: &str, callback: &Callback) {
        if let Some(listener) = self.listeners.remove(&(host, callback.identity())) {
            self.document.remove_event_listener(host, event, &listener);
        }
    }

    fn run_deferred_properties(&mut self, wrapper: WrapperId) {
        let deferred = self.tree[wrapper]
            .element()
            .map(|e| e.deferred_properties.is_some())
            .unwrap_or(false);
        if deferred {
            self.deferred_effects
                .push(DeferredEffect::DeferredProperties { wrapper });
        }
    }

    /// Drops every remaining pre-existing host node nothing adopted and
    /// leaves merge mode.
    pub(crate) fn cleanup_merged_nodes(&mut self) -> Result<(), RenderError> {
        if !self.deferred_process.is_empty() {
            return Ok(());
        }
        while let Some(node) = self.all_merged.pop() {
            if let Some(parent) = self.document.parent(node) {
                log::debug!("removing unmatched pre-existing node {node}");
                self.document.remove_child(parent, node)?;
            }
        }
        self.options.merge = false;
        Ok(())
    }

    pub(crate) fn run_deferred_effects(&mut self, effects: Vec<DeferredEffect>) -> Result<(), RenderError> {
        for effect in effects {
            match effect {
                DeferredEffect::NodeOperation { host, operation } => {
                    if self.document.contains(host) {
                        self.document.invoke(host, operation);
                    }
                }
                DeferredEffect::DeferredProperties { wrapper } => self.apply_deferred_properties(wrapper),
                DeferredEffect::Purge { children } => self.purge(&children),
            }
        }
        Ok(())
    }

    fn apply_deferred_properties(&mut self, wrapper: WrapperId) {
        let Some(element) = self.tree.get(wrapper).and_then(|w| w.element().cloned()) else {
            return;
        };
        let Some(callback) = &element.deferred_properties else {
            return;
        };
        let computed = callback(true);
        let previous_deferred = match &mut self.tree[wrapper].kind {
            WrapperKind::Element {
                deferred_properties,
                ..
            } => deferred_properties.replace(computed).unwrap_or_default(),
            WrapperKind::Component { .. } => return,
        };
        let mut properties = previous_deferred;
        properties.extend(element.properties.clone());
        let previous = PreviousProperties {
            properties,
            attributes: element.attributes.clone(),
            events: element.events.clone(),
        };
        self.process_properties(wrapper, &previous);
    }

    /// Drops the listener and value bookkeeping kept for a removed host node.
    pub(crate) fn forget_host(&mut self, host: HostNodeId) {
        self.listeners.retain(|(node, _), _| *node != host);
        self.input_values.borrow_mut().remove(&host);
        self.select_values.remove(&host);
    }

    /// Stops the components of a removed subtree from scheduling renders
    /// until the deferred purge tears them down.
    fn deactivate_subtree(&self, children: &[WrapperId]) {
        let mut stack: Vec<WrapperId> = children.to_vec();
        while let Some(wrapper) = stack.pop() {
            let wrapper = self.live_wrapper(wrapper);
            let Some(record) = self.tree.get(wrapper) else {
                continue;
            };
            if let Some(id) = record.component_id() {
                self.store.deactivate(id);
            }
            if let Some(children) = &record.children {
                stack.extend(children.iter().copied());
            }
        }
    }

    /// Tears down the components of a removed subtree and frees its wrappers.
    fn purge(&mut self, children: &[WrapperId]) {
        let mut stack: Vec<WrapperId> = children.to_vec();
        while let Some(wrapper) = stack.pop() {
            let Some(removed) = self.tree.remove(wrapper) else {
                continue;
            };
            let mut subtree = removed.children.clone();
            if let Some(id) = removed.component_id() {
                if let Some(live) = self.live.remove(&id) {
                    if live != wrapper {
                        if let Some(live) = self.tree.remove(live) {
                            subtree = live.children.clone();
                        }
                    }
                }
                if let Some(mut record) = self.components.remove(&id) {
                    record.teardown();
                    record.lifecycle.detach();
                }
            }
            if let Some(host) = removed.host {
                self.forget_host(host);
            }
            if let Some(subtree) = subtree {
                stack.extend(subtree.iter().copied());
            }
        }
    }
}
