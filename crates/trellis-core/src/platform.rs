//! Platform abstraction traits for the reconciliation runtime.
//!
//! The engine never owns a clock or an event loop. It asks the embedder for
//! an animation frame or an idle slot through [`RuntimeScheduler`] and
//! expects [`Renderer::run_frame`](crate::Renderer::run_frame) and
//! [`Renderer::run_idle`](crate::Renderer::run_idle) to be called back.

/// Requests frame and idle work from the host platform.
///
/// Implementations must be safe to share across threads even though the
/// engine itself only runs on one.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host schedule a new animation frame.
    fn schedule_frame(&self);

    /// Request an idle slot. Hosts without an idle notion can treat this
    /// like a frame request.
    fn schedule_idle(&self) {
        self.schedule_frame();
    }
}

/// Scheduler that ignores requests; the embedder polls
/// [`Renderer::needs_frame`](crate::Renderer::needs_frame) instead.
#[derive(Debug, Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_frame(&self) {}
}
