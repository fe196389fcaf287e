use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::component::ComponentId;
use crate::host::HostNodeId;
use crate::platform::{DefaultScheduler, RuntimeScheduler};

/// A pending "component is stale" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub id: ComponentId,
    pub depth: usize,
    pub order: usize,
}

type PassDriver = Rc<dyn Fn()>;

pub(crate) struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    sync: Cell<bool>,
    needs_frame: Cell<bool>,
    needs_idle: Cell<bool>,
    in_pass: Cell<bool>,
    rerun: Cell<bool>,
    render_scheduled: Cell<bool>,
    invalidations: RefCell<Vec<Invalidation>>,
    completed_exits: RefCell<Vec<HostNodeId>>,
    driver: RefCell<Option<PassDriver>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            sync: Cell::new(false),
            needs_frame: Cell::new(false),
            needs_idle: Cell::new(false),
            in_pass: Cell::new(false),
            rerun: Cell::new(false),
            render_scheduled: Cell::new(false),
            invalidations: RefCell::new(Vec::new()),
            completed_exits: RefCell::new(Vec::new()),
            driver: RefCell::new(None),
        }
    }

    fn request_frame(&self) {
        self.needs_frame.set(true);
        self.scheduler.schedule_frame();
    }

    fn request_idle(&self) {
        self.needs_idle.set(true);
        self.scheduler.schedule_idle();
    }

    fn drive(&self) {
        if self.in_pass.get() {
            self.rerun.set(true);
            return;
        }
        let driver = self.driver.borrow().clone();
        match driver {
            Some(driver) => driver(),
            None => self.rerun.set(true),
        }
    }

    fn schedule_render(&self) {
        if self.sync.get() {
            self.drive();
        } else if !self.render_scheduled.get() {
            self.render_scheduled.set(true);
            self.request_frame();
        }
    }

    fn invalidate(&self, invalidation: Invalidation) {
        self.invalidations.borrow_mut().push(invalidation);
        self.schedule_render();
    }

    fn complete_exit(&self, host: HostNodeId) {
        self.completed_exits.borrow_mut().push(host);
        if self.sync.get() {
            self.drive();
        } else {
            self.request_frame();
        }
    }
}

/// Owns the scheduling state shared between a renderer and the callbacks it
/// hands out (invalidators, exit completions).
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.needs_frame.get()
    }

    pub fn needs_idle(&self) -> bool {
        self.inner.needs_idle.get()
    }

    pub fn is_sync(&self) -> bool {
        self.inner.sync.get()
    }

    pub fn has_invalidations(&self) -> bool {
        !self.inner.invalidations.borrow().is_empty()
    }

    pub(crate) fn set_sync(&self, sync: bool) {
        self.inner.sync.set(sync);
    }

    pub(crate) fn set_driver(&self, driver: PassDriver) {
        *self.inner.driver.borrow_mut() = Some(driver);
    }

    pub(crate) fn clear_driver(&self) {
        self.inner.driver.borrow_mut().take();
    }

    pub(crate) fn request_frame(&self) {
        self.inner.request_frame();
    }

    pub(crate) fn request_idle(&self) {
        self.inner.request_idle();
    }

    pub(crate) fn begin_frame(&self) -> bool {
        self.inner.needs_frame.set(false);
        self.inner.render_scheduled.replace(false)
    }

    pub(crate) fn begin_idle(&self) {
        self.inner.needs_idle.set(false);
    }

    pub(crate) fn take_invalidations(&self) -> Vec<Invalidation> {
        std::mem::take(&mut *self.inner.invalidations.borrow_mut())
    }

    pub(crate) fn take_completed_exits(&self) -> Vec<HostNodeId> {
        std::mem::take(&mut *self.inner.completed_exits.borrow_mut())
    }

    pub(crate) fn has_completed_exits(&self) -> bool {
        !self.inner.completed_exits.borrow().is_empty()
    }

    pub(crate) fn take_rerun(&self) -> bool {
        self.inner.rerun.replace(false)
    }

    /// Marks the runtime as inside a pass until the guard drops.
    pub(crate) fn enter_pass(&self) -> PassGuard {
        let was_in_pass = self.inner.in_pass.replace(true);
        PassGuard {
            runtime: self.clone(),
            was_in_pass,
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(DefaultScheduler))
    }
}

pub(crate) struct PassGuard {
    runtime: Runtime,
    was_in_pass: bool,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.runtime.inner.in_pass.set(self.was_in_pass);
    }
}

/// Weak handle captured by callbacks that outlive a single pass.
#[derive(Clone)]
pub struct RuntimeHandle(pub(crate) Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn invalidate(&self, invalidation: Invalidation) {
        if let Some(inner) = self.0.upgrade() {
            inner.invalidate(invalidation);
        }
    }

    /// Queues an invalidation raised by a component during its own render.
    /// Sync renderers pick it up on the next pass instead of re-entering.
    pub(crate) fn defer_invalidation(&self, invalidation: Invalidation) {
        if let Some(inner) = self.0.upgrade() {
            inner.invalidations.borrow_mut().push(invalidation);
            if !inner.sync.get() {
                inner.schedule_render();
            }
        }
    }

    pub(crate) fn complete_exit(&self, host: HostNodeId) {
        if let Some(inner) = self.0.upgrade() {
            inner.complete_exit(host);
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}
