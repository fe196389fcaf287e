use std::rc::Rc;

use trellis_core::{
    component, element, registry_component, Constructor, HostDocument, HostOp, MapRegistry,
    MemoryDocument, MountOptions, Registry, RegistryItem, RenderError, Renderer,
};
use trellis_testing::{run_test_render, RenderTestRule};

/// `<div class="pre"><span>hi</span></div>` under the body.
fn prerendered() -> MemoryDocument {
    let mut doc = MemoryDocument::new();
    let body = doc.root();
    let div = doc.preset_element(body, "div");
    doc.preset_attribute(div, "class", "pre");
    let span = doc.preset_element(div, "span");
    doc.preset_text(span, "hi");
    doc
}

#[test]
fn merge_adopts_matching_markup_without_creating_nodes() {
    run_test_render(|rule| {
        rule.set_content_with(prerendered(), MountOptions::default().sync(true), || {
            vec![element("div")
                .child(element("span").child("hi"))
                .into()]
        })
        .expect("mount");

        assert_eq!(rule.markup(), r#"<div class="pre"><span>hi</span></div>"#);
        assert!(rule.structural_ops().is_empty(), "{:?}", rule.structural_ops());
    });
}

#[test]
fn merged_classes_are_added_to_existing_ones() {
    run_test_render(|rule| {
        rule.set_content_with(prerendered(), MountOptions::default().sync(true), || {
            vec![element("div")
                .prop("classes", vec!["card", "pre"])
                .child(element("span").child("hi"))
                .into()]
        })
        .expect("mount");

        assert_eq!(rule.markup(), r#"<div class="pre card"><span>hi</span></div>"#);
    });
}

#[test]
fn merge_reaches_through_components() {
    run_test_render(|rule| {
        let card = Constructor::functional("Card", |_| {
            vec![element("div")
                .child(element("span").child("hi"))
                .into()]
        });
        rule.set_content_with(prerendered(), MountOptions::default().sync(true), move || {
            vec![component(&card).into()]
        })
        .expect("mount");

        assert_eq!(rule.markup(), r#"<div class="pre"><span>hi</span></div>"#);
        assert!(rule.structural_ops().is_empty(), "{:?}", rule.structural_ops());
    });
}

#[test]
fn unmatched_markup_is_removed_after_merging() {
    run_test_render(|rule| {
        let mut doc = prerendered();
        let body = doc.root();
        doc.preset_element(body, "aside");

        rule.set_content_with(doc, MountOptions::default().sync(true), || {
            vec![element("div").into()]
        })
        .expect("mount");

        assert_eq!(rule.markup(), r#"<div class="pre"></div>"#);
        let removed = rule
            .structural_ops()
            .into_iter()
            .filter(|op| matches!(op, HostOp::Remove { .. }))
            .count();
        assert_eq!(removed, 2);
    });
}

#[test]
fn new_nodes_land_before_unmatched_markup_during_merge() {
    run_test_render(|rule| {
        rule.set_content_with(prerendered(), MountOptions::default().sync(true), || {
            vec![element("header").into(), element("div").into()]
        })
        .expect("mount");

        assert_eq!(rule.markup(), r#"<header></header><div class="pre"></div>"#);
    });
}

#[test]
fn merging_can_be_switched_off() {
    run_test_render(|rule| {
        rule.set_content_with(
            prerendered(),
            MountOptions::default().sync(true).merge(false),
            || vec![element("p").child("fresh").into()],
        )
        .expect("mount");

        assert_eq!(
            rule.markup(),
            r#"<div class="pre"><span>hi</span></div><p>fresh</p>"#
        );
    });
}

#[test]
fn content_mounts_under_an_explicit_mount_point() {
    run_test_render(|rule| {
        let mut doc = MemoryDocument::new();
        let body = doc.root();
        let main = doc.preset_element(body, "main");

        rule.set_content_with(doc, MountOptions::default().sync(true).mount_point(main), || {
            vec![element("h1").child("title").into()]
        })
        .expect("mount");

        assert_eq!(rule.markup(), "<h1>title</h1>");
        let h1 = rule.find("h1").expect("h1");
        assert_eq!(rule.with_document(|doc| doc.parent(h1)).flatten(), Some(main));
    });
}

#[test]
fn mounting_twice_or_into_nothing_fails() {
    let renderer = Renderer::new(MemoryDocument::new(), Vec::new);
    assert_eq!(
        renderer.mount(MountOptions::default().mount_point(99)),
        Err(RenderError::MountPointMissing { node: 99 })
    );
    assert!(!renderer.is_mounted());

    let renderer = Renderer::new(MemoryDocument::new(), Vec::new);
    renderer.mount(MountOptions::default().sync(true)).expect("mount");
    assert!(renderer.is_mounted());
    assert_eq!(
        renderer.mount(MountOptions::default()),
        Err(RenderError::AlreadyMounted)
    );
}

#[test]
fn merge_waits_for_a_pending_label_before_discarding_markup() {
    let registry = MapRegistry::new();
    registry.define("Late", RegistryItem::lazy(|| None));
    let mut rule = RenderTestRule::new().with_registry(Rc::new(registry.clone()));
    rule.set_content_with(prerendered(), MountOptions::default().sync(true), || {
        vec![registry_component("Late").into()]
    })
    .expect("mount");

    assert_eq!(rule.markup(), r#"<div class="pre"><span>hi</span></div>"#);
    assert_eq!(registry.subscriber_count(), 1);
    let original = rule.find("div").expect("prerendered div");
    rule.clear_ops();

    registry.complete(
        "Late",
        Constructor::functional("Late", |_| {
            vec![element("div")
                .child(element("span").child("hi"))
                .into()]
        }),
    );
    rule.pump_until_idle().expect("pump");

    assert_eq!(rule.markup(), r#"<div class="pre"><span>hi</span></div>"#);
    assert_eq!(rule.find("div"), Some(original));
    assert!(rule.structural_ops().is_empty(), "{:?}", rule.structural_ops());
}
