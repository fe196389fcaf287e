//! Standard runtime services backed by Rust's `std` library.
//!
//! Provides a [`RuntimeScheduler`] that records frame and idle requests in
//! atomics and optionally wakes an event loop, plus a [`StdRuntime`] bundle
//! that builds renderers on top of it and drains their queued work.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use trellis_core::{HostDocument, Node, RenderError, Renderer, RuntimeScheduler};

/// Upper bound on passes run by a single [`StdRuntime::drain`] call.
const MAX_DRAIN_PASSES: usize = 256;

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records requests and wakes a registered event loop.
pub struct StdScheduler {
    frame_requested: AtomicBool,
    idle_requested: AtomicBool,
    waker: RwLock<Option<Waker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            frame_requested: AtomicBool::new(false),
            idle_requested: AtomicBool::new(false),
            waker: RwLock::new(None),
        }
    }

    /// Returns whether a frame has been requested since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.swap(false, Ordering::SeqCst)
    }

    /// Returns whether an idle slot has been requested since the last call.
    pub fn take_idle_request(&self) -> bool {
        self.idle_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked whenever frame or idle work is scheduled.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("frame_requested", &self.frame_requested.load(Ordering::SeqCst))
            .field("idle_requested", &self.idle_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn schedule_frame(&self) {
        self.frame_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn schedule_idle(&self) {
        self.idle_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Convenience container around a shared [`StdScheduler`].
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(StdScheduler::default()),
        }
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Creates a renderer whose frame and idle requests go to this runtime.
    pub fn renderer<D: HostDocument + 'static>(
        &self,
        document: D,
        root: impl Fn() -> Vec<Node> + 'static,
    ) -> Renderer<D> {
        Renderer::with_scheduler(document, root, self.scheduler())
    }

    pub fn take_frame_request(&self) -> bool {
        self.scheduler.take_frame_request()
    }

    pub fn take_idle_request(&self) -> bool {
        self.scheduler.take_idle_request()
    }

    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    pub fn clear_waker(&self) {
        self.scheduler.clear_waker();
    }

    /// Runs requested frames and idle slots on `renderer` until nothing is
    /// pending. Returns the number of passes run.
    pub fn drain<D: HostDocument + 'static>(&self, renderer: &Renderer<D>) -> Result<usize, RenderError> {
        let mut passes = 0;
        while passes < MAX_DRAIN_PASSES {
            if self.take_frame_request() {
                renderer.run_frame()?;
            } else if self.take_idle_request() {
                renderer.run_idle()?;
            } else {
                return Ok(passes);
            }
            passes += 1;
        }
        log::warn!("renderer still requested work after {MAX_DRAIN_PASSES} passes");
        Ok(passes)
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}
