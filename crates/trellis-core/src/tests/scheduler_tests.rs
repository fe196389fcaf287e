use super::*;
use crate::component::{ComponentStore, Constructor, Invalidator, Middleware};
use crate::memory::MemoryDocument;
use crate::node::{component, element, Node};
use crate::renderer::MountOptions;
use crate::runtime::Runtime;
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<&'static str>>>;
type Slot = Rc<RefCell<Option<Invalidator>>>;

fn engine() -> Engine<MemoryDocument> {
    let runtime = Runtime::default();
    let store = Rc::new(ComponentStore::new(runtime.handle()));
    Engine::new(MemoryDocument::new(), runtime, store)
}

/// Functional component that logs its renders and exposes its invalidator.
fn logged(name: &'static str, log: &Log, slot: &Slot, children: Vec<Node>) -> Constructor {
    let (log, slot) = (log.clone(), slot.clone());
    Constructor::functional_with_middleware(
        name,
        [("invalidator", Middleware::new(|ctx| ctx.invalidator()))],
        move |ctx| {
            log.borrow_mut().push(name);
            if let Some(invalidator) = ctx.middleware.get::<Invalidator>("invalidator") {
                *slot.borrow_mut() = Some((*invalidator).clone());
            }
            vec![element("section").children(children.clone()).into()]
        },
    )
}

fn invalidate(slot: &Slot) {
    if let Some(invalidator) = slot.borrow().as_ref() {
        invalidator.invalidate();
    }
}

#[test]
fn deepest_component_renders_first_and_parent_reuses_it() {
    let log: Log = Rc::default();
    let (parent_slot, child_slot): (Slot, Slot) = (Rc::default(), Rc::default());
    let child = logged("child", &log, &child_slot, Vec::new());
    let parent = logged("parent", &log, &parent_slot, vec![component(&child).into()]);
    let root = parent.clone();

    let mut engine = engine();
    engine
        .mount(MountOptions::default().sync(true), Rc::new(move || vec![component(&root).into()]))
        .expect("mount");
    assert_eq!(*log.borrow(), vec!["parent", "child"]);
    log.borrow_mut().clear();

    invalidate(&parent_slot);
    invalidate(&child_slot);
    engine.flush().expect("flush");

    assert_eq!(*log.borrow(), vec!["child", "parent"]);
}

#[test]
fn batched_invalidations_wait_for_a_frame() {
    let log: Log = Rc::default();
    let slot: Slot = Rc::default();
    let widget = logged("widget", &log, &slot, Vec::new());
    let root = widget.clone();

    let mut engine = engine();
    engine
        .mount(MountOptions::default(), Rc::new(move || vec![component(&root).into()]))
        .expect("mount");
    log.borrow_mut().clear();

    invalidate(&slot);
    invalidate(&slot);
    assert!(log.borrow().is_empty());
    assert!(engine.runtime.needs_frame());

    engine.run_frame().expect("frame");
    assert_eq!(*log.borrow(), vec!["widget"]);
    assert!(!engine.runtime.needs_frame());
}

#[test]
fn removed_component_ignores_invalidation() {
    let log: Log = Rc::default();
    let slot: Slot = Rc::default();
    let widget = logged("widget", &log, &slot, Vec::new());
    let show = Rc::new(RefCell::new(true));
    let (root, visible) = (widget.clone(), show.clone());

    let mut engine = engine();
    engine
        .mount(
            MountOptions::default().sync(true),
            Rc::new(move || {
                if *visible.borrow() {
                    vec![component(&root).into()]
                } else {
                    Vec::new()
                }
            }),
        )
        .expect("mount");

    *show.borrow_mut() = false;
    let root_id = engine.root.as_ref().map(|root| root.id).expect("root");
    let meta = engine.store.meta(root_id).expect("meta");
    engine.store.invalidator(&meta).invalidate();
    engine.flush().expect("flush");
    log.borrow_mut().clear();

    invalidate(&slot);
    engine.flush().expect("flush");
    assert!(log.borrow().is_empty());
    assert_eq!(engine.components.len(), 1);
    assert_eq!(engine.document.inner_markup(engine.document.root()), "");
}

#[test]
fn components_under_a_removed_element_stop_rendering_before_teardown() {
    let renders = Rc::new(std::cell::Cell::new(0usize));
    let slot: Slot = Rc::default();
    let growing = {
        let (renders, slot) = (renders.clone(), slot.clone());
        Constructor::functional_with_middleware(
            "growing",
            [("invalidator", Middleware::new(|ctx| ctx.invalidator()))],
            move |ctx| {
                renders.set(renders.get() + 1);
                if let Some(invalidator) = ctx.middleware.get::<Invalidator>("invalidator") {
                    *slot.borrow_mut() = Some((*invalidator).clone());
                }
                (0..renders.get()).map(|_| Node::from(element("span"))).collect()
            },
        )
    };
    let show = Rc::new(RefCell::new(true));
    let (inner, visible) = (growing.clone(), show.clone());

    let mut engine = engine();
    engine
        .mount(
            MountOptions::default(),
            Rc::new(move || {
                if *visible.borrow() {
                    vec![element("div").child(component(&inner)).into()]
                } else {
                    Vec::new()
                }
            }),
        )
        .expect("mount");
    engine.run_frame().expect("first frame");
    assert_eq!(engine.components.len(), 2);

    *show.borrow_mut() = false;
    let root_id = engine.root.as_ref().map(|root| root.id).expect("root");
    let meta = engine.store.meta(root_id).expect("meta");
    engine.store.invalidator(&meta).invalidate();
    engine.run_frame().expect("removal frame");
    assert_eq!(engine.document.inner_markup(engine.document.root()), "");

    invalidate(&slot);
    engine.run_frame().expect("frame after stale invalidation");
    engine.run_frame().expect("settling frame");

    assert_eq!(renders.get(), 1);
    assert_eq!(engine.components.len(), 1);
    assert_eq!(engine.store.len(), 1);
}
