//! Public entry point: mounts a root producer into a host document and
//! drives reconciliation passes.

use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use crate::animation::{NoopTransitions, TransitionStrategy};
use crate::collections::new_map;
use crate::component::{ComponentId, ComponentStore, Constructor};
use crate::engine::{Diagnostic, Engine, EngineOptions, RootState, Work};
use crate::host::{HostDocument, HostNodeId, RenderError};
use crate::node::{component, element, Key, Node};
use crate::platform::{DefaultScheduler, RuntimeScheduler};
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::wrapper::Wrapper;

type RootProducer = Rc<dyn Fn() -> Vec<Node>>;

/// Options for [`Renderer::mount`].
#[derive(Clone)]
pub struct MountOptions {
    pub sync: bool,
    pub merge: bool,
    pub transition: Rc<dyn TransitionStrategy>,
    /// Defaults to the document root.
    pub mount_point: Option<HostNodeId>,
    pub registry: Option<Rc<dyn Registry>>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            sync: false,
            merge: true,
            transition: Rc::new(NoopTransitions),
            mount_point: None,
            registry: None,
        }
    }
}

impl MountOptions {
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn transition(mut self, transition: Rc<dyn TransitionStrategy>) -> Self {
        self.transition = transition;
        self
    }

    pub fn mount_point(mut self, node: HostNodeId) -> Self {
        self.mount_point = Some(node);
        self
    }

    pub fn registry(mut self, registry: Rc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

struct RendererInner<D: HostDocument> {
    engine: RefCell<Engine<D>>,
    runtime: Runtime,
    store: Rc<ComponentStore>,
    producer: RootProducer,
}

/// Owns a host document and the reconciliation state rendered into it.
///
/// In sync mode every invalidation re-renders before `invalidate` returns.
/// Otherwise work is batched until the embedder calls [`run_frame`] after
/// the scheduler asked for a frame.
///
/// [`run_frame`]: Renderer::run_frame
pub struct Renderer<D: HostDocument + 'static> {
    inner: Rc<RendererInner<D>>,
}

impl<D: HostDocument + 'static> Clone for Renderer<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Alias of [`Renderer::new`].
pub fn create_renderer<D: HostDocument + 'static>(
    document: D,
    root: impl Fn() -> Vec<Node> + 'static,
) -> Renderer<D> {
    Renderer::new(document, root)
}

impl<D: HostDocument + 'static> Renderer<D> {
    pub fn new(document: D, root: impl Fn() -> Vec<Node> + 'static) -> Self {
        Self::with_scheduler(document, root, Arc::new(DefaultScheduler))
    }

    pub fn with_scheduler(
        document: D,
        root: impl Fn() -> Vec<Node> + 'static,
        scheduler: Arc<dyn RuntimeScheduler>,
    ) -> Self {
        let runtime = Runtime::new(scheduler);
        let store = Rc::new(ComponentStore::new(runtime.handle()));
        let engine = Engine::new(document, runtime.clone(), store.clone());
        let inner = Rc::new(RendererInner {
            engine: RefCell::new(engine),
            runtime: runtime.clone(),
            store,
            producer: Rc::new(root),
        });
        let weak = Rc::downgrade(&inner);
        runtime.set_driver(Rc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Ok(mut engine) = inner.engine.try_borrow_mut() else {
                log::warn!("render requested while the document is borrowed; deferring to the next frame");
                inner.runtime.request_frame();
                return;
            };
            if let Err(err) = engine.flush() {
                log::error!("render pass failed: {err}");
            }
        }));
        Self { inner }
    }

    fn engine(&self) -> RefMut<'_, Engine<D>> {
        self.inner.engine.borrow_mut()
    }

    /// Renders the root producer into the mount point.
    pub fn mount(&self, options: MountOptions) -> Result<(), RenderError> {
        let producer = self.inner.producer.clone();
        let mut engine = self.engine();
        engine.mount(options, producer)?;
        let pending = self.inner.runtime.take_rerun() && self.inner.runtime.has_invalidations();
        if pending && engine.options.sync {
            engine.flush()?;
        }
        Ok(())
    }

    /// Re-runs the root producer.
    pub fn invalidate(&self) {
        let Some(id) = self.root_component() else {
            return;
        };
        if let Some(meta) = self.inner.store.meta(id) {
            self.inner.store.invalidator(&meta).invalidate();
        }
    }

    /// Runs one animation frame: pending invalidations, completed exits and
    /// the deferred effects queued by the previous pass.
    pub fn run_frame(&self) -> Result<(), RenderError> {
        self.engine().run_frame()
    }

    /// Runs idle-time tasks such as the sibling distinguishability check.
    pub fn run_idle(&self) -> Result<(), RenderError> {
        self.engine().run_idle();
        Ok(())
    }

    /// Processes everything queued so far regardless of scheduling mode.
    pub fn flush(&self) -> Result<(), RenderError> {
        let mut engine = self.engine();
        engine.flush()?;
        let effects = std::mem::take(&mut engine.deferred_effects);
        engine.run_deferred_effects(effects)?;
        engine.run_idle();
        Ok(())
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.runtime.needs_frame()
    }

    pub fn needs_idle(&self) -> bool {
        self.inner.runtime.needs_idle()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.engine.borrow().root.is_some()
    }

    pub fn root_component(&self) -> Option<ComponentId> {
        self.inner.engine.borrow().root.as_ref().map(|root| root.id)
    }

    /// Host node a component rendered under `key`.
    pub fn host_node_by_key(&self, id: ComponentId, key: &Key) -> Option<HostNodeId> {
        self.inner.store.node_by_key(id, key)
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.inner.engine.borrow().document)
    }

    pub fn with_document_mut<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.engine().document)
    }

    /// Ambiguous-sibling reports collected so far.
    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.engine().diagnostics)
    }

    pub fn component_count(&self) -> usize {
        self.inner.store.len()
    }

    pub fn wrapper_count(&self) -> usize {
        self.inner.engine.borrow().tree.len()
    }
}

impl<D: HostDocument> Drop for RendererInner<D> {
    fn drop(&mut self) {
        self.runtime.clear_driver();
    }
}

impl<D: HostDocument> Engine<D> {
    pub(crate) fn mount(&mut self, options: MountOptions, producer: RootProducer) -> Result<(), RenderError> {
        if self.root.is_some() {
            return Err(RenderError::AlreadyMounted);
        }
        let mount_point = options.mount_point.unwrap_or_else(|| self.document.root());
        if !self.document.contains(mount_point) {
            return Err(RenderError::MountPointMissing { node: mount_point });
        }
        log::debug!(
            "mounting into node {mount_point} (sync: {}, merge: {})",
            options.sync,
            options.merge
        );
        self.options = EngineOptions {
            sync: options.sync,
            merge: options.merge,
            transition: options.transition,
            registry: options.registry,
        };
        self.runtime.set_sync(options.sync);
        let _guard = self.runtime.enter_pass();

        let root_constructor = Constructor::functional("Root", move |_| producer());
        let mut anchor = Wrapper::new(element("root").into(), 0, 0);
        anchor.host = Some(mount_point);
        let anchor = self.tree.insert(anchor);
        let root = self
            .tree
            .insert(Wrapper::new(component(&root_constructor).into(), 1, 0));
        self.tree.set_parent(root, anchor);

        let candidates = if self.options.merge {
            let children = self.document.children(mount_point);
            self.all_merged.extend(children.iter().copied());
            children
        } else {
            Vec::new()
        };
        self.insert_before = Some(new_map());
        self.process_queue.push(Work::Diff {
            current: Rc::from(Vec::new()),
            next: Rc::from(vec![root]),
            merge_nodes: Some(Rc::new(RefCell::new(candidates))),
            old_index: 0,
            new_index: 0,
        });
        self.run_process_queue();

        let Some(id) = self.tree[root].component_id() else {
            return Err(RenderError::NotMounted);
        };
        self.root = Some(RootState { id });

        self.cleanup_merged_nodes()?;
        let applied = self.run_application_queue();
        self.insert_before = None;
        applied?;
        self.remove_completed_exits()?;
        self.run_callbacks()
    }
}
