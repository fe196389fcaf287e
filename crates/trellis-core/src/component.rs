//! Component constructors, per-instance metadata and the two lifecycle
//! variants the engine drives.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::collections::{map::HashMap, map::HashSet, new_map, new_set};
use crate::host::HostNodeId;
use crate::node::{Key, Node};
use crate::properties::{properties_changed, Properties};
use crate::registry::RegistrySubscription;
use crate::runtime::{Invalidation, RuntimeHandle};

/// Stable identity of one logical component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type RenderFn = dyn Fn(&RenderContext<'_>) -> Vec<Node>;

/// Inputs handed to a functional component's render.
pub struct RenderContext<'a> {
    pub id: ComponentId,
    pub properties: &'a Properties,
    pub children: &'a [Node],
    pub middleware: &'a ResolvedMiddleware,
}

pub struct FunctionalDef {
    name: Rc<str>,
    middleware: IndexMap<String, Middleware>,
    render: Box<RenderFn>,
}

pub struct StatefulDef {
    name: Rc<str>,
    factory: Box<dyn Fn() -> Box<dyn Widget>>,
}

/// Component constructor. Two constructors are the same only when they share
/// the same definition allocation.
#[derive(Clone)]
pub enum Constructor {
    Functional(Rc<FunctionalDef>),
    Stateful(Rc<StatefulDef>),
}

impl Constructor {
    pub fn functional(
        name: &str,
        render: impl Fn(&RenderContext<'_>) -> Vec<Node> + 'static,
    ) -> Self {
        Self::functional_with_middleware(name, Vec::<(&str, Middleware)>::new(), render)
    }

    pub fn functional_with_middleware<'n, I>(
        name: &str,
        middleware: I,
        render: impl Fn(&RenderContext<'_>) -> Vec<Node> + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = (&'n str, Middleware)>,
    {
        Constructor::Functional(Rc::new(FunctionalDef {
            name: Rc::from(name),
            middleware: middleware
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            render: Box::new(render),
        }))
    }

    pub fn stateful<W: Widget + 'static>(name: &str, factory: impl Fn() -> W + 'static) -> Self {
        Constructor::Stateful(Rc::new(StatefulDef {
            name: Rc::from(name),
            factory: Box::new(move || Box::new(factory())),
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            Constructor::Functional(def) => &def.name,
            Constructor::Stateful(def) => &def.name,
        }
    }

    pub fn ptr_eq(&self, other: &Constructor) -> bool {
        match (self, other) {
            (Constructor::Functional(a), Constructor::Functional(b)) => Rc::ptr_eq(a, b),
            (Constructor::Stateful(a), Constructor::Stateful(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn identity(&self) -> usize {
        match self {
            Constructor::Functional(def) => Rc::as_ptr(def) as usize,
            Constructor::Stateful(def) => Rc::as_ptr(def) as usize,
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self, Constructor::Stateful(_))
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({})", self.name())
    }
}

/// Stateful component instance.
///
/// Properties and children are pushed in before every render; the instance
/// only re-renders when they changed or it invalidated itself.
pub trait Widget {
    fn set_properties(&mut self, properties: Properties);
    fn set_children(&mut self, children: Vec<Node>) {
        let _ = children;
    }
    fn render(&mut self, ctx: &WidgetContext) -> Vec<Node>;
    fn on_attach(&mut self) {}
    fn on_detach(&mut self) {}
}

/// Capabilities available to a stateful component while rendering.
pub struct WidgetContext {
    id: ComponentId,
    invalidator: Invalidator,
    store: Rc<ComponentStore>,
}

impl WidgetContext {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn invalidator(&self) -> Invalidator {
        self.invalidator.clone()
    }

    /// Host node rendered by this component under `key`.
    pub fn node(&self, key: &Key) -> Option<HostNodeId> {
        self.store.node_by_key(self.id, key)
    }
}

type MiddlewareCallback = dyn Fn(&MiddlewareContext) -> Rc<dyn Any>;

/// Capability injected into functional components. Resolved once per
/// instance, with its dependencies resolved first.
#[derive(Clone)]
pub struct Middleware {
    callback: Rc<MiddlewareCallback>,
    dependencies: IndexMap<String, Middleware>,
}

impl Middleware {
    pub fn new<T: Any>(callback: impl Fn(&MiddlewareContext) -> T + 'static) -> Self {
        Self {
            callback: Rc::new(move |ctx: &MiddlewareContext| Rc::new(callback(ctx)) as Rc<dyn Any>),
            dependencies: IndexMap::new(),
        }
    }

    pub fn with_dependency(mut self, name: &str, middleware: Middleware) -> Self {
        self.dependencies.insert(name.to_string(), middleware);
        self
    }
}

/// Values produced by a component's middleware, by name.
#[derive(Clone, Default)]
pub struct ResolvedMiddleware {
    values: IndexMap<String, Rc<dyn Any>>,
}

impl ResolvedMiddleware {
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        self.values.get(name)?.clone().downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Custom property diff; returns `true` when the component must re-render.
pub type CustomDiff = Rc<dyn Fn(&Properties, &Properties) -> bool>;

pub struct MiddlewareContext {
    id: String,
    component: ComponentId,
    invalidator: Invalidator,
    store: Rc<ComponentStore>,
    middleware: ResolvedMiddleware,
}

impl MiddlewareContext {
    /// Unique sub-identifier of this middleware instance.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn invalidator(&self) -> Invalidator {
        self.invalidator.clone()
    }

    /// Live snapshot of the owning component's current properties.
    pub fn properties(&self) -> Option<Properties> {
        self.store
            .meta(self.component)
            .map(|meta| meta.properties.borrow().clone())
    }

    pub fn middleware(&self) -> &ResolvedMiddleware {
        &self.middleware
    }

    pub fn register_custom_diff(&self, diff: impl Fn(&Properties, &Properties) -> bool + 'static) {
        self.store.register_custom_diff(self.component, Rc::new(diff));
    }

    /// Weak accessor for host nodes rendered by the component under a key.
    pub fn nodes(&self) -> NodeLookup {
        NodeLookup {
            component: self.component,
            store: Rc::downgrade(&self.store),
        }
    }
}

/// Looks up host nodes rendered under a key by one component.
#[derive(Clone)]
pub struct NodeLookup {
    component: ComponentId,
    store: Weak<ComponentStore>,
}

impl NodeLookup {
    /// Returns the host node, or registers interest so the component is
    /// invalidated once the node appears.
    pub fn get(&self, key: impl Into<Key>) -> Option<HostNodeId> {
        let store = self.store.upgrade()?;
        store.node_by_key(self.component, &key.into())
    }
}

/// Marks a component stale and schedules its re-render.
#[derive(Clone)]
pub struct Invalidator {
    meta: Weak<ComponentMeta>,
    runtime: RuntimeHandle,
}

impl Invalidator {
    pub fn invalidate(&self) {
        let Some(meta) = self.meta.upgrade() else {
            return;
        };
        if !meta.live.get() {
            return;
        }
        meta.dirty.set(true);
        let invalidation = Invalidation {
            id: meta.id,
            depth: meta.depth.get(),
            order: meta.order.get(),
        };
        if meta.rendering.get() {
            if meta.stateful {
                return;
            }
            self.runtime.defer_invalidation(invalidation);
        } else {
            self.runtime.invalidate(invalidation);
        }
    }
}

pub(crate) struct ComponentMeta {
    pub(crate) id: ComponentId,
    pub(crate) stateful: bool,
    pub(crate) depth: Cell<usize>,
    pub(crate) order: Cell<usize>,
    pub(crate) dirty: Cell<bool>,
    pub(crate) rendering: Cell<bool>,
    pub(crate) live: Cell<bool>,
    pub(crate) properties: RefCell<Properties>,
}

/// Per-renderer tables keyed by component id.
pub(crate) struct ComponentStore {
    runtime: RuntimeHandle,
    metas: RefCell<HashMap<ComponentId, Rc<ComponentMeta>>>,
    node_cache: RefCell<HashMap<ComponentId, HashMap<Key, HostNodeId>>>,
    interest: RefCell<HashSet<(ComponentId, Key)>>,
    custom_diffs: RefCell<HashMap<ComponentId, Vec<CustomDiff>>>,
    next_id: Cell<u64>,
    next_middleware_id: Cell<u64>,
}

impl ComponentStore {
    pub(crate) fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            metas: RefCell::new(new_map()),
            node_cache: RefCell::new(new_map()),
            interest: RefCell::new(new_set()),
            custom_diffs: RefCell::new(new_map()),
            next_id: Cell::new(1),
            next_middleware_id: Cell::new(0),
        }
    }

    pub(crate) fn allocate(
        &self,
        stateful: bool,
        depth: usize,
        order: usize,
        properties: &Properties,
    ) -> Rc<ComponentMeta> {
        let id = ComponentId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let meta = Rc::new(ComponentMeta {
            id,
            stateful,
            depth: Cell::new(depth),
            order: Cell::new(order),
            dirty: Cell::new(false),
            rendering: Cell::new(false),
            live: Cell::new(true),
            properties: RefCell::new(properties.clone()),
        });
        self.metas.borrow_mut().insert(id, meta.clone());
        meta
    }

    pub(crate) fn meta(&self, id: ComponentId) -> Option<Rc<ComponentMeta>> {
        self.metas.borrow().get(&id).cloned()
    }

    pub(crate) fn invalidator(&self, meta: &Rc<ComponentMeta>) -> Invalidator {
        Invalidator {
            meta: Rc::downgrade(meta),
            runtime: self.runtime.clone(),
        }
    }

    fn next_middleware_id(&self, component: ComponentId) -> String {
        let n = self.next_middleware_id.get();
        self.next_middleware_id.set(n + 1);
        format!("{component}-{n}")
    }

    pub(crate) fn register_custom_diff(&self, id: ComponentId, diff: CustomDiff) {
        self.custom_diffs
            .borrow_mut()
            .entry(id)
            .or_default()
            .push(diff);
    }

    fn custom_diffs(&self, id: ComponentId) -> Vec<CustomDiff> {
        self.custom_diffs
            .borrow()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn node_by_key(&self, id: ComponentId, key: &Key) -> Option<HostNodeId> {
        let found = self
            .node_cache
            .borrow()
            .get(&id)
            .and_then(|nodes| nodes.get(key).copied());
        if found.is_none() {
            self.interest.borrow_mut().insert((id, key.clone()));
        }
        found
    }

    /// Records the host node currently rendered under `key`. Invalidates the
    /// owner if it asked for the node before it existed.
    pub(crate) fn add_node(&self, id: ComponentId, key: &Key, host: HostNodeId) {
        let Some(meta) = self.meta(id) else {
            return;
        };
        {
            let mut cache = self.node_cache.borrow_mut();
            let nodes = cache.entry(id).or_insert_with(new_map);
            if nodes.get(key) == Some(&host) {
                return;
            }
            nodes.insert(key.clone(), host);
        }
        let wanted = self.interest.borrow_mut().remove(&(id, key.clone()));
        if wanted {
            self.invalidator(&meta).invalidate();
        }
    }

    /// Makes the component's invalidator inert without dropping its entries.
    pub(crate) fn deactivate(&self, id: ComponentId) {
        if let Some(meta) = self.metas.borrow().get(&id) {
            meta.live.set(false);
        }
    }

    pub(crate) fn is_live(&self, id: ComponentId) -> bool {
        self.metas
            .borrow()
            .get(&id)
            .map(|meta| meta.live.get())
            .unwrap_or(false)
    }

    /// Drops every table entry owned by `id`.
    pub(crate) fn purge(&self, id: ComponentId) {
        if let Some(meta) = self.metas.borrow_mut().remove(&id) {
            meta.live.set(false);
        }
        self.node_cache.borrow_mut().remove(&id);
        self.custom_diffs.borrow_mut().remove(&id);
        self.interest.borrow_mut().retain(|(owner, _)| *owner != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.metas.borrow().len()
    }
}

/// Capability interface shared by both component variants.
pub(crate) trait ComponentLifecycle {
    fn meta(&self) -> &Rc<ComponentMeta>;
    /// First render.
    fn create(&mut self, properties: &Properties, children: &[Node]) -> Vec<Node>;
    /// Re-render when properties changed or the component is dirty;
    /// `None` means the previous output stands.
    fn update(
        &mut self,
        previous: &Properties,
        properties: &Properties,
        children: &[Node],
    ) -> Option<Vec<Node>>;
    fn attach(&mut self, attached: bool);
    fn detach(&mut self);
    /// Releases middleware and registry resources.
    fn teardown(&mut self);
}

pub(crate) struct FunctionalComponent {
    def: Rc<FunctionalDef>,
    meta: Rc<ComponentMeta>,
    store: Rc<ComponentStore>,
    middleware: ResolvedMiddleware,
}

impl FunctionalComponent {
    pub(crate) fn new(def: Rc<FunctionalDef>, meta: Rc<ComponentMeta>, store: Rc<ComponentStore>) -> Self {
        let middleware = resolve_middleware(&def.middleware, &meta, &store);
        Self {
            def,
            meta,
            store,
            middleware,
        }
    }

    fn render(&mut self, properties: &Properties, children: &[Node]) -> Vec<Node> {
        self.meta.rendering.set(true);
        let ctx = RenderContext {
            id: self.meta.id,
            properties,
            children,
            middleware: &self.middleware,
        };
        let rendered = (self.def.render)(&ctx);
        self.meta.rendering.set(false);
        rendered
    }
}

fn resolve_middleware(
    middleware: &IndexMap<String, Middleware>,
    meta: &Rc<ComponentMeta>,
    store: &Rc<ComponentStore>,
) -> ResolvedMiddleware {
    let mut resolved = ResolvedMiddleware::default();
    let id = store.next_middleware_id(meta.id);
    for (name, mw) in middleware {
        let ctx = MiddlewareContext {
            id: id.clone(),
            component: meta.id,
            invalidator: store.invalidator(meta),
            store: store.clone(),
            middleware: resolve_middleware(&mw.dependencies, meta, store),
        };
        resolved
            .values
            .insert(name.clone(), (mw.callback)(&ctx));
    }
    resolved
}

impl ComponentLifecycle for FunctionalComponent {
    fn meta(&self) -> &Rc<ComponentMeta> {
        &self.meta
    }

    fn create(&mut self, properties: &Properties, children: &[Node]) -> Vec<Node> {
        self.render(properties, children)
    }

    fn update(
        &mut self,
        previous: &Properties,
        properties: &Properties,
        children: &[Node],
    ) -> Option<Vec<Node>> {
        *self.meta.properties.borrow_mut() = properties.clone();
        let custom = self.store.custom_diffs(self.meta.id);
        let changed = if custom.iter().any(|diff| diff(previous, properties)) {
            true
        } else {
            properties_changed(previous, properties)
        };
        if changed {
            self.meta.dirty.set(true);
        }
        if !self.meta.dirty.get() {
            return None;
        }
        self.meta.dirty.set(false);
        Some(self.render(properties, children))
    }

    fn attach(&mut self, _attached: bool) {}

    fn detach(&mut self) {}

    fn teardown(&mut self) {
        self.middleware = ResolvedMiddleware::default();
        self.store.purge(self.meta.id);
    }
}

pub(crate) struct StatefulComponent {
    def: Rc<StatefulDef>,
    meta: Rc<ComponentMeta>,
    store: Rc<ComponentStore>,
    widget: Option<Box<dyn Widget>>,
    had_children: bool,
}

impl StatefulComponent {
    pub(crate) fn new(def: Rc<StatefulDef>, meta: Rc<ComponentMeta>, store: Rc<ComponentStore>) -> Self {
        Self {
            def,
            meta,
            store,
            widget: None,
            had_children: false,
        }
    }

    fn context(&self) -> WidgetContext {
        WidgetContext {
            id: self.meta.id,
            invalidator: self.store.invalidator(&self.meta),
            store: self.store.clone(),
        }
    }
}

impl ComponentLifecycle for StatefulComponent {
    fn meta(&self) -> &Rc<ComponentMeta> {
        &self.meta
    }

    fn create(&mut self, properties: &Properties, children: &[Node]) -> Vec<Node> {
        let ctx = self.context();
        let mut widget = (self.def.factory)();
        self.meta.rendering.set(true);
        widget.set_properties(properties.clone());
        widget.set_children(children.to_vec());
        let rendered = widget.render(&ctx);
        self.meta.rendering.set(false);
        self.meta.dirty.set(false);
        self.had_children = !children.is_empty();
        self.widget = Some(widget);
        rendered
    }

    fn update(
        &mut self,
        previous: &Properties,
        properties: &Properties,
        children: &[Node],
    ) -> Option<Vec<Node>> {
        let ctx = self.context();
        let widget = self.widget.as_mut()?;
        *self.meta.properties.borrow_mut() = properties.clone();
        if properties_changed(previous, properties) || self.had_children || !children.is_empty() {
            self.meta.dirty.set(true);
        }
        self.had_children = !children.is_empty();
        self.meta.rendering.set(true);
        widget.set_properties(properties.clone());
        widget.set_children(children.to_vec());
        let rendered = if self.meta.dirty.get() {
            self.meta.dirty.set(false);
            Some(widget.render(&ctx))
        } else {
            None
        };
        self.meta.rendering.set(false);
        rendered
    }

    fn attach(&mut self, attached: bool) {
        if attached {
            if let Some(widget) = self.widget.as_mut() {
                widget.on_attach();
            }
        }
    }

    fn detach(&mut self) {
        if let Some(mut widget) = self.widget.take() {
            widget.on_detach();
        }
    }

    fn teardown(&mut self) {
        self.store.purge(self.meta.id);
    }
}

/// Creates the lifecycle record for a resolved constructor.
pub(crate) fn instantiate(
    constructor: &Constructor,
    store: &Rc<ComponentStore>,
    depth: usize,
    order: usize,
    properties: &Properties,
) -> Box<dyn ComponentLifecycle> {
    let meta = store.allocate(constructor.is_stateful(), depth, order, properties);
    match constructor {
        Constructor::Functional(def) => {
            Box::new(FunctionalComponent::new(def.clone(), meta, store.clone()))
        }
        Constructor::Stateful(def) => {
            Box::new(StatefulComponent::new(def.clone(), meta, store.clone()))
        }
    }
}

/// Lifecycle record plus the registry subscriptions the component owns.
pub(crate) struct ComponentRecord {
    pub(crate) lifecycle: Box<dyn ComponentLifecycle>,
    pub(crate) subscriptions: Vec<RegistrySubscription>,
}

impl ComponentRecord {
    pub(crate) fn new(lifecycle: Box<dyn ComponentLifecycle>) -> Self {
        Self {
            lifecycle,
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> ComponentId {
        self.lifecycle.meta().id
    }

    pub(crate) fn teardown(&mut self) {
        self.subscriptions.clear();
        self.lifecycle.teardown();
    }
}

#[cfg(test)]
#[path = "tests/component_tests.rs"]
mod tests;
