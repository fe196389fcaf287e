//! Component creation, update and removal during diffing.

use std::rc::Rc;

use crate::component::{instantiate, ComponentRecord};
use crate::engine::{Engine, ProcessResult, Work};
use crate::host::HostDocument;
use crate::wrapper::{WrapperId, WrapperKind};

impl<D: HostDocument> Engine<D> {
    /// Instantiates and renders a component. `None` when its constructor is
    /// still unresolved.
    pub(crate) fn create_component(&mut self, next: WrapperId) -> Option<ProcessResult> {
        let constructor = self.tree[next].constructor()?;
        let node = self.tree[next].component_node().cloned()?;
        let (depth, order) = (self.tree[next].depth, self.tree[next].order);

        let lifecycle = instantiate(&constructor, &self.store, depth, order, &node.properties);
        let id = lifecycle.meta().id;
        log::trace!("creating {} as {id}", constructor.name());
        self.components.insert(id, ComponentRecord::new(lifecycle));
        if let WrapperKind::Component { id: slot, .. } = &mut self.tree[next].kind {
            *slot = Some(id);
        }
        self.live.insert(id, next);

        let rendered = match self.components.get_mut(&id) {
            Some(record) => record.lifecycle.create(&node.properties, &node.children),
            None => Vec::new(),
        };
        let children = self.rendered_to_wrappers(&rendered, next, None);
        self.tree[next].children = Some(children.clone());
        let merge_nodes = match &mut self.tree[next].kind {
            WrapperKind::Component { merge_nodes, .. } => merge_nodes.take(),
            WrapperKind::Element { .. } => None,
        };

        Some(ProcessResult {
            item: Some(Work::Diff {
                current: Rc::from(Vec::new()),
                next: children,
                merge_nodes,
                old_index: 0,
                new_index: 0,
            }),
            side: constructor
                .is_stateful()
                .then_some(Work::Attach { id, attached: true }),
            application: None,
        })
    }

    /// Updates a matched component. `current == next` is the self-update
    /// path used by the invalidation scheduler.
    pub(crate) fn update_component(&mut self, current: WrapperId, next: WrapperId) -> ProcessResult {
        let current = self.live_wrapper(current);
        let Some(id) = self.tree[current].component_id() else {
            return ProcessResult::default();
        };
        if self.tree[next].constructor().is_none() || !self.components.contains_key(&id) {
            return ProcessResult::default();
        }

        let has_animations = self.tree[current].has_animations;
        let host = self.tree[current].host;
        let host_attached = host
            .map(|h| self.document.parent(h).is_some())
            .unwrap_or(false);
        {
            let wrapper = &mut self.tree[next];
            wrapper.has_animations = has_animations;
            if let WrapperKind::Component { id: slot, .. } = &mut wrapper.kind {
                *slot = Some(id);
            }
            if host_attached {
                wrapper.host = host;
            }
        }

        let (depth, order) = (self.tree[next].depth, self.tree[next].order);
        let previous_properties = self.tree[current]
            .component_node()
            .map(|c| c.properties.clone())
            .unwrap_or_default();
        let node = self.tree[next].component_node().cloned();
        let (properties, children) = node
            .map(|c| (c.properties.clone(), c.children.clone()))
            .unwrap_or_default();

        let (rendered, stateful) = match self.components.get_mut(&id) {
            Some(record) => {
                let meta = record.lifecycle.meta();
                meta.depth.set(depth);
                meta.order.set(order);
                let stateful = meta.stateful;
                (
                    record
                        .lifecycle
                        .update(&previous_properties, &properties, &children),
                    stateful,
                )
            }
            None => (None, false),
        };

        let side = stateful.then_some(Work::Attach {
            id,
            attached: false,
        });
        let item = match rendered {
            None => {
                let reused = self.tree[current].children.clone();
                if current != next {
                    if let Some(list) = &reused {
                        for &child in list.iter() {
                            self.tree.set_parent(child, next);
                        }
                    }
                    self.tree[next].children = reused;
                }
                None
            }
            Some(rendered) => {
                let previous = self.tree[current].children_list();
                let children = self.rendered_to_wrappers(&rendered, next, Some(current));
                self.tree[next].children = Some(children.clone());
                Some(Work::diff(previous, children))
            }
        };

        self.live.insert(id, next);
        if current != next {
            self.retire(current);
        }
        ProcessResult {
            item,
            side,
            application: None,
        }
    }

    pub(crate) fn remove_component(&mut self, current: WrapperId) -> ProcessResult {
        let current = self.live_wrapper(current);
        self.tree.unlink(current);
        let id = self.tree[current].component_id();
        let record = id.and_then(|id| {
            self.live.remove(&id);
            self.components.remove(&id)
        });
        let children = self.tree[current].children_list();
        let side = match record {
            Some(mut record) => {
                log::trace!("removing {}", record.id());
                record.teardown();
                Some(Work::Detach {
                    wrapper: current,
                    record,
                })
            }
            None => {
                self.retire(current);
                None
            }
        };
        ProcessResult {
            item: Some(Work::diff(children, Rc::from(Vec::new()))),
            side,
            application: None,
        }
    }
}
