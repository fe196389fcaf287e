//! Mutable reconciliation state shared by the builder, the list diff, the
//! component lifecycle, the host applier and the invalidation scheduler.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::animation::{NoopTransitions, TransitionStrategy};
use crate::collections::{map::HashMap, new_map, new_set};
use crate::component::{ComponentId, ComponentRecord, ComponentStore};
use crate::host::{HostDocument, HostNodeId, Listener, NodeOperation, RenderError};
use crate::node::{Key, Node};
use crate::properties::{Callback, PropValue, Properties};
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::wrapper::{MergeNodes, WrapperId, WrapperTree};

pub(crate) struct EngineOptions {
    pub(crate) sync: bool,
    pub(crate) merge: bool,
    pub(crate) transition: Rc<dyn TransitionStrategy>,
    pub(crate) registry: Option<Rc<dyn Registry>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sync: false,
            merge: true,
            transition: Rc::new(NoopTransitions),
            registry: None,
        }
    }
}

/// Entry of the process queue.
pub(crate) enum Work {
    /// Resume diffing two sibling lists at the given cursors.
    Diff {
        current: Rc<[WrapperId]>,
        next: Rc<[WrapperId]>,
        merge_nodes: Option<MergeNodes>,
        old_index: usize,
        new_index: usize,
    },
    Attach {
        id: ComponentId,
        attached: bool,
    },
    Detach {
        wrapper: WrapperId,
        record: ComponentRecord,
    },
}

impl Work {
    pub(crate) fn diff(current: Rc<[WrapperId]>, next: Rc<[WrapperId]>) -> Self {
        Work::Diff {
            current,
            next,
            merge_nodes: None,
            old_index: 0,
            new_index: 0,
        }
    }
}

/// Host mutation queued during diffing and applied afterwards.
pub(crate) enum Application {
    Create { wrapper: WrapperId },
    Update { current: WrapperId, next: WrapperId },
    Delete { wrapper: WrapperId },
    Attach { id: ComponentId, attached: bool },
    Detach { wrapper: WrapperId, record: ComponentRecord },
}

/// Outcome of one instruction: a follow-up list job, a component side
/// instruction and a host mutation, each optional.
#[derive(Default)]
pub(crate) struct ProcessResult {
    pub(crate) item: Option<Work>,
    pub(crate) side: Option<Work>,
    pub(crate) application: Option<Application>,
}

/// Work that runs after the mutation phase, batched into one frame.
pub(crate) enum DeferredEffect {
    NodeOperation {
        host: HostNodeId,
        operation: NodeOperation,
    },
    DeferredProperties {
        wrapper: WrapperId,
    },
    /// Tears down the subtree of an element removed without animations.
    Purge {
        children: Rc<[WrapperId]>,
    },
}

/// Structural identity of a sibling, captured for the idle-time check.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Signature {
    Text,
    Element {
        tag: Rc<str>,
        key: Option<Key>,
        host_node: Option<HostNodeId>,
    },
    Component {
        constructor: Option<usize>,
        key: Option<Key>,
        label: String,
    },
}

pub(crate) enum IdleTask {
    CheckDistinguishable {
        siblings: Vec<Signature>,
        index: usize,
        owner: String,
    },
}

/// Two unkeyed siblings could not be told apart while a list changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name of the component whose children changed.
    pub owner: String,
    /// Tag or component name of the ambiguous sibling.
    pub node: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A component ({}) has had a child added or removed, but they could not be uniquely \
             identified. Provide a unique key when rendering the same element or component ({}) \
             multiple times as siblings",
            self.owner, self.node
        )
    }
}

/// Previous state an element update is diffed against.
#[derive(Default)]
pub(crate) struct PreviousProperties {
    pub(crate) properties: Properties,
    pub(crate) attributes: Option<IndexMap<String, Option<String>>>,
    pub(crate) events: Option<IndexMap<String, Callback>>,
}

pub(crate) struct RootState {
    pub(crate) id: ComponentId,
}

pub(crate) struct Engine<D: HostDocument> {
    pub(crate) document: D,
    pub(crate) runtime: Runtime,
    pub(crate) store: Rc<ComponentStore>,
    pub(crate) tree: WrapperTree,
    /// Node identity to the component that rendered it.
    pub(crate) owners: HashMap<usize, (Node, ComponentId)>,
    /// Live wrapper per stable component id.
    pub(crate) live: HashMap<ComponentId, WrapperId>,
    pub(crate) components: HashMap<ComponentId, ComponentRecord>,
    pub(crate) process_queue: Vec<Work>,
    pub(crate) deferred_process: Vec<Work>,
    pub(crate) application_queue: Vec<Application>,
    pub(crate) all_merged: Vec<HostNodeId>,
    pub(crate) insert_before: Option<HashMap<WrapperId, HostNodeId>>,
    pub(crate) options: EngineOptions,
    /// Installed listeners keyed by host node and callback identity.
    pub(crate) listeners: HashMap<(HostNodeId, usize), Listener>,
    pub(crate) input_values: Rc<RefCell<HashMap<HostNodeId, String>>>,
    pub(crate) select_values: HashMap<HostNodeId, PropValue>,
    pub(crate) deferred_effects: Vec<DeferredEffect>,
    pub(crate) idle_tasks: Vec<IdleTask>,
    pub(crate) retired: Vec<WrapperId>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) root: Option<RootState>,
}

impl<D: HostDocument> Engine<D> {
    pub(crate) fn new(document: D, runtime: Runtime, store: Rc<ComponentStore>) -> Self {
        Self {
            document,
            runtime,
            store,
            tree: WrapperTree::new(),
            owners: new_map(),
            live: new_map(),
            components: new_map(),
            process_queue: Vec::new(),
            deferred_process: Vec::new(),
            application_queue: Vec::new(),
            all_merged: Vec::new(),
            insert_before: None,
            options: EngineOptions::default(),
            listeners: new_map(),
            input_values: Rc::new(RefCell::new(new_map())),
            select_values: new_map(),
            deferred_effects: Vec::new(),
            idle_tasks: Vec::new(),
            retired: Vec::new(),
            diagnostics: Vec::new(),
            root: None,
        }
    }

    /// Wrapper that is live for `wrapper`'s component id, or `wrapper`.
    pub(crate) fn live_wrapper(&self, wrapper: WrapperId) -> WrapperId {
        self.tree
            .get(wrapper)
            .and_then(|w| w.component_id())
            .and_then(|id| self.live.get(&id).copied())
            .filter(|live| self.tree.contains(*live))
            .unwrap_or(wrapper)
    }

    pub(crate) fn retire(&mut self, wrapper: WrapperId) {
        self.retired.push(wrapper);
    }

    /// Frees retired wrappers once no deferred process work can still
    /// reference them.
    pub(crate) fn release_retired(&mut self) {
        if !self.deferred_process.is_empty() {
            return;
        }
        let mut live = new_set();
        live.extend(self.live.values().copied());
        for wrapper in std::mem::take(&mut self.retired) {
            if !live.contains(&wrapper) {
                self.tree.remove(wrapper);
            }
        }
    }

    /// Runs the invalidation queue, completed exits and, in sync mode, the
    /// deferred effects until nothing new was requested.
    pub(crate) fn flush(&mut self) -> Result<(), RenderError> {
        let _guard = self.runtime.enter_pass();
        loop {
            if self.runtime.has_invalidations() {
                self.run_invalidation_queue()?;
            }
            self.remove_completed_exits()?;
            if self.options.sync {
                let effects = std::mem::take(&mut self.deferred_effects);
                self.run_deferred_effects(effects)?;
                self.run_idle_tasks();
            }
            let more = self.runtime.take_rerun()
                && (self.runtime.has_invalidations() || self.runtime.has_completed_exits());
            if !more {
                break;
            }
        }
        Ok(())
    }

    /// One animation frame in batched mode.
    pub(crate) fn run_frame(&mut self) -> Result<(), RenderError> {
        let _guard = self.runtime.enter_pass();
        let effects = std::mem::take(&mut self.deferred_effects);
        let rendered = if self.runtime.begin_frame() {
            self.run_invalidation_queue()
        } else {
            Ok(())
        };
        let rendered = rendered.and_then(|()| self.remove_completed_exits());
        // Effects taken above belong to the previous pass and still run
        // when this one failed.
        self.run_deferred_effects(effects)?;
        rendered?;
        if !self.deferred_effects.is_empty() || self.runtime.has_completed_exits() {
            self.runtime.request_frame();
        }
        Ok(())
    }

    pub(crate) fn run_idle(&mut self) {
        let _guard = self.runtime.enter_pass();
        self.runtime.begin_idle();
        self.run_idle_tasks();
    }

    pub(crate) fn remove_completed_exits(&mut self) -> Result<(), RenderError> {
        for host in self.runtime.take_completed_exits() {
            self.forget_host(host);
            if let Some(parent) = self.document.parent(host) {
                self.document.remove_child(parent, host)?;
            }
        }
        Ok(())
    }

    /// Queues or runs post-mutation work depending on the scheduling mode.
    pub(crate) fn run_callbacks(&mut self) -> Result<(), RenderError> {
        if !self.idle_tasks.is_empty() {
            if self.options.sync {
                self.run_idle_tasks();
            } else {
                self.runtime.request_idle();
            }
        }
        if !self.deferred_effects.is_empty() {
            if self.options.sync {
                let effects = std::mem::take(&mut self.deferred_effects);
                self.run_deferred_effects(effects)?;
            } else {
                self.runtime.request_frame();
            }
        }
        Ok(())
    }

    pub(crate) fn run_idle_tasks(&mut self) {
        for task in std::mem::take(&mut self.idle_tasks) {
            match task {
                IdleTask::CheckDistinguishable {
                    siblings,
                    index,
                    owner,
                } => self.check_distinguishable(&siblings, index, owner),
            }
        }
    }
}
