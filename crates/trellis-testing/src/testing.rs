use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::{
    ExitCompletion, HostDocument, HostEvent, HostNodeId, HostOp, MemoryDocument, MountOptions, Node,
    PropValue, Properties, Registry, RenderError, Renderer, TransitionStrategy,
};

/// Upper bound on frame/idle rounds before `pump_until_idle` gives up.
const MAX_PUMP_ROUNDS: usize = 64;

/// Transition strategy that records every enter and exit it is asked for.
///
/// Exits complete immediately unless [`hold_exits`](Self::hold_exits) is
/// set, in which case the completion tokens are kept until
/// [`finish_exits`](Self::finish_exits).
#[derive(Default)]
pub struct RecordingTransitions {
    entered: RefCell<Vec<(HostNodeId, String)>>,
    exited: RefCell<Vec<(HostNodeId, String)>>,
    pending: RefCell<Vec<ExitCompletion>>,
    hold: Cell<bool>,
}

impl RecordingTransitions {
    pub fn hold_exits(&self, hold: bool) {
        self.hold.set(hold);
    }

    pub fn entered(&self) -> Vec<(HostNodeId, String)> {
        self.entered.borrow().clone()
    }

    pub fn exited(&self) -> Vec<(HostNodeId, String)> {
        self.exited.borrow().clone()
    }

    pub fn pending_exits(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Completes every held exit.
    pub fn finish_exits(&self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for done in pending {
            done.complete();
        }
    }
}

impl TransitionStrategy for RecordingTransitions {
    fn enter(&self, host: HostNodeId, _properties: &Properties, animation: &str) {
        self.entered.borrow_mut().push((host, animation.to_string()));
    }

    fn exit(&self, host: HostNodeId, _properties: &Properties, animation: &str, done: ExitCompletion) {
        self.exited.borrow_mut().push((host, animation.to_string()));
        if self.hold.get() {
            self.pending.borrow_mut().push(done);
        } else {
            done.complete();
        }
    }
}

/// Headless harness for exercising renderers in tests.
///
/// `RenderTestRule` owns a renderer over a [`MemoryDocument`] and exposes
/// helpers for driving frames, dispatching events and inspecting the
/// produced host tree without a real platform.
pub struct RenderTestRule {
    renderer: Option<Renderer<MemoryDocument>>,
    transitions: Rc<RecordingTransitions>,
    registry: Option<Rc<dyn Registry>>,
    mount_point: Option<HostNodeId>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self {
            renderer: None,
            transitions: Rc::new(RecordingTransitions::default()),
            registry: None,
            mount_point: None,
        }
    }

    /// Registry handed to the renderer on mount.
    pub fn with_registry(mut self, registry: Rc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Mounts `content` synchronously into an empty document.
    pub fn set_content(&mut self, content: impl Fn() -> Vec<Node> + 'static) -> Result<(), RenderError> {
        self.set_content_with(MemoryDocument::new(), MountOptions::default().sync(true), content)
    }

    /// Mounts `content` in batched mode; nothing re-renders until a frame
    /// is advanced.
    pub fn set_content_batched(
        &mut self,
        content: impl Fn() -> Vec<Node> + 'static,
    ) -> Result<(), RenderError> {
        self.set_content_with(MemoryDocument::new(), MountOptions::default(), content)
    }

    /// Mounts `content` into `document` with explicit options. The rule's
    /// recording transitions always replace `options.transition`; its
    /// registry is used only when the options carry none.
    pub fn set_content_with(
        &mut self,
        document: MemoryDocument,
        mut options: MountOptions,
        content: impl Fn() -> Vec<Node> + 'static,
    ) -> Result<(), RenderError> {
        options.transition = self.transitions.clone() as Rc<dyn TransitionStrategy>;
        if options.registry.is_none() {
            options.registry = self.registry.clone();
        }
        self.mount_point = options.mount_point;
        let renderer = Renderer::new(document, content);
        renderer.mount(options)?;
        self.renderer = Some(renderer);
        Ok(())
    }

    pub fn has_content(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn renderer(&self) -> Option<&Renderer<MemoryDocument>> {
        self.renderer.as_ref()
    }

    pub fn transitions(&self) -> &RecordingTransitions {
        &self.transitions
    }

    /// Re-runs the root producer and settles all resulting work.
    pub fn recompose(&mut self) -> Result<(), RenderError> {
        if let Some(renderer) = &self.renderer {
            renderer.invalidate();
        }
        self.pump_until_idle()
    }

    /// Runs exactly one animation frame.
    pub fn advance_frame(&mut self) -> Result<(), RenderError> {
        match &self.renderer {
            Some(renderer) => renderer.run_frame(),
            None => Ok(()),
        }
    }

    /// Drives frames and idle slots until the renderer asks for neither.
    pub fn pump_until_idle(&mut self) -> Result<(), RenderError> {
        let Some(renderer) = &self.renderer else {
            return Ok(());
        };
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut progressed = false;
            if renderer.needs_frame() {
                renderer.run_frame()?;
                progressed = true;
            }
            if renderer.needs_idle() {
                renderer.run_idle()?;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        Ok(())
    }

    /// Invokes every listener registered for `event.name` on its target.
    /// Input events carrying a value write it to the node first, the way a
    /// user edit would.
    pub fn dispatch(&mut self, event: HostEvent) -> Result<(), RenderError> {
        let Some(renderer) = &self.renderer else {
            return Ok(());
        };
        if let Some(value) = &event.value {
            renderer.with_document_mut(|doc| {
                doc.set_property(event.target, "value", PropValue::str(value));
            });
        }
        let listeners = renderer.with_document(|doc| doc.listeners(event.target, &event.name));
        for listener in listeners {
            listener(&event);
        }
        self.pump_until_idle()
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&MemoryDocument) -> R) -> Option<R> {
        self.renderer.as_ref().map(|renderer| renderer.with_document(f))
    }

    pub fn with_document_mut<R>(&self, f: impl FnOnce(&mut MemoryDocument) -> R) -> Option<R> {
        self.renderer
            .as_ref()
            .map(|renderer| renderer.with_document_mut(f))
    }

    /// Markup below the mount point.
    pub fn markup(&self) -> String {
        let mount_point = self.mount_point;
        self.with_document(|doc| doc.inner_markup(mount_point.unwrap_or_else(|| doc.root())))
            .unwrap_or_default()
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.with_document(|doc| doc.ops().to_vec())
            .unwrap_or_default()
    }

    pub fn structural_ops(&self) -> Vec<HostOp> {
        self.ops()
            .into_iter()
            .filter(HostOp::is_structural)
            .collect()
    }

    pub fn clear_ops(&self) {
        self.with_document_mut(MemoryDocument::clear_ops);
    }

    /// Host elements with `tag` in document order.
    pub fn find_all(&self, tag: &str) -> Vec<HostNodeId> {
        self.with_document(|doc| {
            let mut found = Vec::new();
            let mut stack = vec![doc.root()];
            while let Some(node) = stack.pop() {
                if doc.tag_name(node).as_deref() == Some(tag) {
                    found.push(node);
                }
                stack.extend(doc.children(node).into_iter().rev());
            }
            found
        })
        .unwrap_or_default()
    }

    pub fn find(&self, tag: &str) -> Option<HostNodeId> {
        self.find_all(tag).into_iter().next()
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RenderTestRule`.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::element;

    #[test]
    fn render_test_rule_reports_content_and_markup() {
        run_test_render(|rule| {
            assert!(!rule.has_content());
            assert_eq!(rule.markup(), "");

            rule.set_content(|| vec![element("p").child("hello").into()])
                .expect("mount");
            assert!(rule.has_content());
            assert_eq!(rule.markup(), "<p>hello</p>");
            assert_eq!(rule.find_all("p").len(), 1);
        });
    }

    #[test]
    fn held_exits_complete_on_demand() {
        let transitions = RecordingTransitions::default();
        transitions.hold_exits(true);
        assert_eq!(transitions.pending_exits(), 0);
        transitions.finish_exits();
        assert!(transitions.exited().is_empty());
    }
}
