use crate::host::HostNodeId;
use crate::properties::Properties;
use crate::runtime::RuntimeHandle;

/// Enter/exit hooks for elements that declare animations.
pub trait TransitionStrategy {
    fn enter(&self, host: HostNodeId, properties: &Properties, animation: &str);

    /// Must eventually call [`ExitCompletion::complete`]; the host node stays
    /// in place until then.
    fn exit(&self, host: HostNodeId, properties: &Properties, animation: &str, done: ExitCompletion);
}

/// One-shot token that removes an exiting host node.
pub struct ExitCompletion {
    host: HostNodeId,
    runtime: RuntimeHandle,
}

impl ExitCompletion {
    pub(crate) fn new(host: HostNodeId, runtime: RuntimeHandle) -> Self {
        Self { host, runtime }
    }

    pub fn host(&self) -> HostNodeId {
        self.host
    }

    pub fn complete(self) {
        self.runtime.complete_exit(self.host);
    }
}

impl std::fmt::Debug for ExitCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitCompletion")
            .field("host", &self.host)
            .finish()
    }
}

/// Runs no animation and completes exits immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransitions;

impl TransitionStrategy for NoopTransitions {
    fn enter(&self, _host: HostNodeId, _properties: &Properties, _animation: &str) {}

    fn exit(&self, _host: HostNodeId, _properties: &Properties, _animation: &str, done: ExitCompletion) {
        done.complete();
    }
}
