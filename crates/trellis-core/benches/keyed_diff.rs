use std::cell::RefCell;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};
use trellis_core::{element, MemoryDocument, MountOptions, Node, Renderer};

const ROWS: i64 = 200;

fn rows(order: &Rc<RefCell<Vec<i64>>>) -> impl Fn() -> Vec<Node> + 'static {
    let order = order.clone();
    move || {
        let items: Vec<Node> = order
            .borrow()
            .iter()
            .map(|key| element("li").key(*key).child(key.to_string()).into())
            .collect();
        vec![element("ul").children(items).into()]
    }
}

fn mounted(order: &Rc<RefCell<Vec<i64>>>) -> Renderer<MemoryDocument> {
    let renderer = Renderer::new(MemoryDocument::new(), rows(order));
    renderer
        .mount(MountOptions::default().sync(true))
        .expect("initial render");
    renderer
}

fn rerender_unchanged_list(c: &mut Criterion) {
    let order = Rc::new(RefCell::new((0..ROWS).collect::<Vec<_>>()));
    let renderer = mounted(&order);

    c.bench_function("rerender_unchanged_keyed_list", |b| {
        b.iter(|| {
            renderer.invalidate();
            renderer.with_document_mut(MemoryDocument::clear_ops);
        });
    });
}

fn rotate_keyed_list(c: &mut Criterion) {
    let order = Rc::new(RefCell::new((0..ROWS).collect::<Vec<_>>()));
    let renderer = mounted(&order);

    c.bench_function("rotate_keyed_list", |b| {
        b.iter(|| {
            order.borrow_mut().rotate_left(1);
            renderer.invalidate();
            renderer.with_document_mut(MemoryDocument::clear_ops);
        });
    });
}

criterion_group!(benches, rerender_unchanged_list, rotate_keyed_list);
criterion_main!(benches);
