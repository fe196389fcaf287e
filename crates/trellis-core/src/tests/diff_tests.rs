use super::*;
use crate::component::{ComponentStore, Constructor};
use crate::memory::{HostOp, MemoryDocument};
use crate::node::{component, element, registry_component, Node};
use crate::renderer::MountOptions;
use crate::runtime::Runtime;
use crate::wrapper::Wrapper;
use std::cell::RefCell;

type Shared<T> = Rc<RefCell<T>>;

fn engine() -> Engine<MemoryDocument> {
    let runtime = Runtime::default();
    let store = Rc::new(ComponentStore::new(runtime.handle()));
    Engine::new(MemoryDocument::new(), runtime, store)
}

fn mount(root: impl Fn() -> Vec<Node> + 'static) -> Engine<MemoryDocument> {
    let mut engine = engine();
    engine
        .mount(MountOptions::default().sync(true), Rc::new(root))
        .expect("mount");
    engine
}

fn rerender(engine: &mut Engine<MemoryDocument>) {
    let id = engine.root.as_ref().map(|root| root.id).expect("mounted");
    let meta = engine.store.meta(id).expect("root meta");
    engine.store.invalidator(&meta).invalidate();
    engine.flush().expect("flush");
}

fn list(items: &Shared<Vec<(Option<i64>, &'static str)>>) -> impl Fn() -> Vec<Node> + 'static {
    let items = items.clone();
    move || {
        let children: Vec<Node> = items
            .borrow()
            .iter()
            .map(|(key, text)| {
                let li = element("li").child(*text);
                match key {
                    Some(key) => li.key(*key).into(),
                    None => li.into(),
                }
            })
            .collect();
        vec![element("ul").children(children).into()]
    }
}

fn markup(engine: &Engine<MemoryDocument>) -> String {
    engine.document.inner_markup(engine.document.root())
}

#[test]
fn same_matches_on_tag_and_key() {
    let mut engine = engine();
    let a = engine.tree.insert(Wrapper::new(element("li").key(1).into(), 1, 0));
    let b = engine.tree.insert(Wrapper::new(element("li").key(1).into(), 1, 0));
    let c = engine.tree.insert(Wrapper::new(element("li").key(2).into(), 1, 1));
    let d = engine.tree.insert(Wrapper::new(element("p").key(1).into(), 1, 1));

    assert!(engine.same(a, b));
    assert!(!engine.same(a, c));
    assert!(!engine.same(a, d));
}

#[test]
fn same_rejects_different_prebound_hosts() {
    let mut engine = engine();
    let a = engine
        .tree
        .insert(Wrapper::new(element("div").host_node(4).into(), 1, 0));
    let b = engine
        .tree
        .insert(Wrapper::new(element("div").host_node(5).into(), 1, 0));
    let c = engine.tree.insert(Wrapper::new(element("div").into(), 1, 0));

    assert!(!engine.same(a, b));
    assert!(engine.same(a, c));
}

#[test]
fn same_compares_constructor_identity() {
    let mut engine = engine();
    let first = Constructor::functional("Item", |_| Vec::new());
    let twin = Constructor::functional("Item", |_| Vec::new());
    let a = engine.tree.insert(Wrapper::new(component(&first).into(), 1, 0));
    let b = engine
        .tree
        .insert(Wrapper::new(component(&first.clone()).into(), 1, 0));
    let c = engine.tree.insert(Wrapper::new(component(&twin).into(), 1, 0));
    let d = engine
        .tree
        .insert(Wrapper::new(registry_component("Item").into(), 1, 0));

    assert!(engine.same(a, b));
    assert!(!engine.same(a, c));
    assert!(!engine.same(a, d));
    assert!(!engine.same(d, d));
}

#[test]
fn append_inserts_after_existing_sibling() {
    let items = Rc::new(RefCell::new(vec![(Some(1), "a")]));
    let mut engine = mount(list(&items));
    assert_eq!(markup(&engine), "<ul><li>a</li></ul>");

    engine.document.clear_ops();
    items.borrow_mut().push((Some(2), "b"));
    rerender(&mut engine);

    assert_eq!(markup(&engine), "<ul><li>a</li><li>b</li></ul>");
    let structural: Vec<HostOp> = engine
        .document
        .ops()
        .iter()
        .filter(|op| op.is_structural())
        .cloned()
        .collect();
    assert_eq!(structural.len(), 4, "{structural:?}");
    assert!(!structural
        .iter()
        .any(|op| matches!(op, HostOp::Remove { .. })));
}

#[test]
fn keyed_reorder_converges() {
    let items = Rc::new(RefCell::new(vec![(Some(1), "a"), (Some(2), "b"), (Some(3), "c")]));
    let mut engine = mount(list(&items));

    *items.borrow_mut() = vec![(Some(3), "c"), (Some(1), "a"), (Some(2), "b")];
    rerender(&mut engine);
    assert_eq!(markup(&engine), "<ul><li>c</li><li>a</li><li>b</li></ul>");

    *items.borrow_mut() = vec![(Some(2), "b"), (Some(1), "a")];
    rerender(&mut engine);
    assert_eq!(markup(&engine), "<ul><li>b</li><li>a</li></ul>");
    assert!(engine.diagnostics.is_empty());
}

#[test]
fn removing_one_of_two_unkeyed_twins_reports_once() {
    let items = Rc::new(RefCell::new(vec![(None, "x"), (None, "x")]));
    let mut engine = mount(list(&items));
    assert!(engine.diagnostics.is_empty());

    items.borrow_mut().pop();
    rerender(&mut engine);

    assert_eq!(markup(&engine), "<ul><li>x</li></ul>");
    let diagnostics = std::mem::take(&mut engine.diagnostics);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].owner, "Root");
    assert_eq!(diagnostics[0].node, "li");
}

#[test]
fn text_siblings_are_never_ambiguous() {
    let texts = Rc::new(RefCell::new(vec!["a", "b"]));
    let source = texts.clone();
    let mut engine = mount(move || source.borrow().iter().map(|t| Node::text(t)).collect());

    texts.borrow_mut().pop();
    rerender(&mut engine);

    assert_eq!(markup(&engine), "a");
    assert!(engine.diagnostics.is_empty());
}

#[test]
fn short_circuited_component_keeps_its_child_list() {
    let child = Constructor::functional("Child", |ctx| {
        let label = ctx
            .properties
            .get("label")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        vec![element("span").child(label).into()]
    });
    let producer_child = child.clone();
    let mut engine = mount(move || {
        vec![element("div")
            .child(component(&producer_child).prop("label", "x"))
            .into()]
    });

    let root_id = engine.root.as_ref().map(|root| root.id).expect("root");
    let child_id = *engine
        .live
        .keys()
        .find(|id| **id != root_id)
        .expect("child component");
    let before = engine.tree[engine.live[&child_id]].children.clone().expect("children");

    engine.document.clear_ops();
    rerender(&mut engine);

    let after = engine.tree[engine.live[&child_id]].children.clone().expect("children");
    assert!(Rc::ptr_eq(&before, &after));
    assert!(engine.document.ops().is_empty(), "{:?}", engine.document.ops());
    assert_eq!(markup(&engine), "<div><span>x</span></div>");
}

#[test]
fn changed_text_replaces_the_host_text_node() {
    let text = Rc::new(RefCell::new("one"));
    let source = text.clone();
    let mut engine = mount(move || vec![element("p").child(*source.borrow()).into()]);

    engine.document.clear_ops();
    *text.borrow_mut() = "two";
    rerender(&mut engine);

    assert_eq!(markup(&engine), "<p>two</p>");
    assert!(engine
        .document
        .ops()
        .iter()
        .any(|op| matches!(op, HostOp::Replace { .. })));
}

#[test]
fn wrappers_are_released_after_each_pass() {
    let items = Rc::new(RefCell::new(vec![(Some(1), "a"), (Some(2), "b")]));
    let mut engine = mount(list(&items));
    let settled = engine.tree.len();

    rerender(&mut engine);
    rerender(&mut engine);
    assert_eq!(engine.tree.len(), settled);

    items.borrow_mut().clear();
    rerender(&mut engine);
    assert!(engine.tree.len() < settled);
}

#[test]
fn removed_elements_release_their_listeners() {
    let show = Rc::new(RefCell::new(true));
    let visible = show.clone();
    let mut engine = mount(move || {
        let buttons: Vec<Node> = if *visible.borrow() {
            vec![
                element("button").key(1).on("click", |_| {}).into(),
                element("button").key(2).on("click", |_| {}).into(),
                element("button")
                    .key(3)
                    .exit_animation("fade-out")
                    .on("click", |_| {})
                    .into(),
            ]
        } else {
            Vec::new()
        };
        vec![element("div").children(buttons).into()]
    });
    assert_eq!(engine.listeners.len(), 3);

    *show.borrow_mut() = false;
    rerender(&mut engine);

    assert_eq!(markup(&engine), "<div></div>");
    assert!(engine.listeners.is_empty());
    assert!(engine.input_values.borrow().is_empty());
}
