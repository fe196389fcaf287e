//! Incremental reconciliation of declarative node trees against a mutable
//! host tree.
//!
//! Components render [`Node`] descriptions; the [`Renderer`] diffs each new
//! description against the previous one and applies the minimal set of
//! mutations to a [`HostDocument`].

pub mod animation;
pub mod collections;
pub mod component;
pub mod host;
pub mod memory;
pub mod node;
pub mod platform;
pub mod properties;
pub mod registry;
pub mod renderer;
pub mod runtime;

mod applier;
mod builder;
mod diff;
mod engine;
mod lifecycle;
mod scheduler;
mod wrapper;

pub use animation::{ExitCompletion, NoopTransitions, TransitionStrategy};
pub use component::{
    ComponentId, Constructor, CustomDiff, Invalidator, Middleware, MiddlewareContext, NodeLookup,
    RenderContext, ResolvedMiddleware, Widget, WidgetContext,
};
pub use engine::Diagnostic;
pub use host::{
    HostDocument, HostError, HostEvent, HostNodeId, Listener, NodeOperation, RenderError,
    SVG_NAMESPACE, XLINK_NAMESPACE,
};
pub use memory::{HostOp, MemoryDocument};
pub use node::{
    component, element, lazy_component, registry_component, ComponentNode, ComponentRef, DiffMode,
    ElementNode, Key, Node,
};
pub use platform::{DefaultScheduler, RuntimeScheduler};
pub use properties::{props, properties_changed, Callback, PropValue, Properties};
pub use registry::{MapRegistry, Registry, RegistryItem, RegistrySubscription};
pub use renderer::{create_renderer, MountOptions, Renderer};
pub use runtime::{Invalidation, Runtime, RuntimeHandle};
