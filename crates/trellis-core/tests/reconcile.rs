use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::{
    element, props, Callback, DiffMode, HostEvent, HostOp, HostDocument, Node, PropValue,
    XLINK_NAMESPACE,
};
use trellis_testing::{run_test_render, RenderTestRule};

type Shared<T> = Rc<RefCell<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

fn keyed_list(items: &Shared<Vec<(i64, &'static str)>>) -> impl Fn() -> Vec<Node> + 'static {
    let items = items.clone();
    move || {
        let children: Vec<Node> = items
            .borrow()
            .iter()
            .map(|(key, text)| element("li").key(*key).child(*text).into())
            .collect();
        vec![element("ul").children(children).into()]
    }
}

#[test]
fn rerendering_an_unchanged_tree_touches_nothing() {
    run_test_render(|rule| {
        let click = Callback::new(|_| {});
        rule.set_content(move || {
            vec![element("div")
                .prop("id", "main")
                .prop("classes", vec!["a", "b"])
                .prop("onclick", click.clone())
                .child(element("span").child("hi"))
                .into()]
        })
        .expect("mount");
        assert_eq!(rule.markup(), r#"<div id="main" class="a b"><span>hi</span></div>"#);

        rule.clear_ops();
        rule.recompose().expect("recompose");

        assert!(rule.ops().is_empty(), "{:?}", rule.ops());
        assert_eq!(rule.markup(), r#"<div id="main" class="a b"><span>hi</span></div>"#);
    });
}

#[test]
fn inserting_into_the_middle_keeps_surrounding_nodes() {
    run_test_render(|rule| {
        let items = shared(vec![(1, "a"), (3, "c")]);
        rule.set_content(keyed_list(&items)).expect("mount");
        let before = rule.find_all("li");

        rule.clear_ops();
        *items.borrow_mut() = vec![(1, "a"), (2, "b"), (3, "c")];
        rule.recompose().expect("recompose");

        assert_eq!(rule.markup(), "<ul><li>a</li><li>b</li><li>c</li></ul>");
        let after = rule.find_all("li");
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[1]);
        assert!(!rule
            .structural_ops()
            .iter()
            .any(|op| matches!(op, HostOp::Remove { .. })));
    });
}

#[test]
fn keyed_lists_follow_reorders_and_removals() {
    run_test_render(|rule| {
        let items = shared(vec![(1, "a"), (2, "b"), (3, "c")]);
        rule.set_content(keyed_list(&items)).expect("mount");

        *items.borrow_mut() = vec![(3, "c"), (1, "a"), (2, "b")];
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), "<ul><li>c</li><li>a</li><li>b</li></ul>");

        *items.borrow_mut() = vec![(2, "b"), (1, "a")];
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), "<ul><li>b</li><li>a</li></ul>");

        *items.borrow_mut() = Vec::new();
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), "<ul></ul>");
    });
}

#[test]
fn removing_an_unkeyed_twin_is_reported() {
    if !cfg!(debug_assertions) {
        return;
    }
    run_test_render(|rule| {
        let count = Rc::new(Cell::new(2));
        let source = count.clone();
        rule.set_content(move || {
            let items: Vec<Node> = (0..source.get())
                .map(|_| element("li").child("same").into())
                .collect();
            vec![element("ul").children(items).into()]
        })
        .expect("mount");

        count.set(1);
        rule.recompose().expect("recompose");

        let diagnostics = rule.renderer().expect("renderer").take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].node, "li");
        assert!(diagnostics[0].to_string().contains("li"));
    });
}

#[test]
fn replaced_handlers_do_not_stack_listeners() {
    run_test_render(|rule| {
        let clicks = Rc::new(Cell::new(0));
        let handler_clicks = clicks.clone();
        rule.set_content(move || {
            let clicks = handler_clicks.clone();
            vec![element("button")
                .on("click", move |_| clicks.set(clicks.get() + 1))
                .child("go")
                .into()]
        })
        .expect("mount");

        rule.recompose().expect("recompose");
        rule.recompose().expect("recompose");

        let button = rule.find("button").expect("button");
        let bound = rule
            .with_document(|doc| doc.listeners(button, "click").len())
            .expect("document");
        assert_eq!(bound, 1);

        rule.dispatch(HostEvent::new("click", button)).expect("dispatch");
        assert_eq!(clicks.get(), 1);
    });
}

#[test]
fn explicit_attributes_remove_what_disappears() {
    run_test_render(|rule| {
        let step = Rc::new(Cell::new(0));
        let source = step.clone();
        rule.set_content(move || {
            let link = match source.get() {
                0 => element("a").attr("href", "/home").attr("title", "Home"),
                1 => element("a").attr("href", "/home"),
                _ => element("a").attr_absent("href"),
            };
            vec![link.child("home").into()]
        })
        .expect("mount");
        assert_eq!(rule.markup(), r#"<a href="/home" title="Home">home</a>"#);

        step.set(1);
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), r#"<a href="/home">home</a>"#);

        step.set(2);
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), "<a>home</a>");
    });
}

#[test]
fn explicit_events_are_bound_once_and_unbound_when_dropped() {
    run_test_render(|rule| {
        let bound = Rc::new(Cell::new(true));
        let source = bound.clone();
        let callback = Callback::new(|_| {});
        rule.set_content(move || {
            let button = element("button").attr("type", "button");
            let button = if source.get() {
                button.event("click", callback.clone())
            } else {
                button
            };
            vec![button.into()]
        })
        .expect("mount");
        let button = rule.find("button").expect("button");
        let listeners = |rule: &RenderTestRule| {
            rule.with_document(|doc| doc.listeners(button, "click").len())
                .unwrap_or_default()
        };
        assert_eq!(listeners(rule), 1);

        rule.recompose().expect("recompose");
        assert_eq!(listeners(rule), 1);

        bound.set(false);
        rule.recompose().expect("recompose");
        assert_eq!(listeners(rule), 0);
    });
}

#[test]
fn empty_role_removes_the_attribute() {
    run_test_render(|rule| {
        let role = Rc::new(RefCell::new("button"));
        let source = role.clone();
        rule.set_content(move || vec![element("div").attr("role", *source.borrow()).into()])
            .expect("mount");
        assert_eq!(rule.markup(), r#"<div role="button"></div>"#);

        *role.borrow_mut() = "";
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), "<div></div>");
    });
}

#[test]
fn svg_children_inherit_the_namespace_and_link_through_xlink() {
    run_test_render(|rule| {
        rule.set_content(|| {
            vec![element("svg")
                .child(element("use").attr("href", "#icon"))
                .into()]
        })
        .expect("mount");

        let svg = rule.find("svg").expect("svg");
        let icon = rule.find("use").expect("use");
        rule.with_document(|doc| {
            assert_eq!(doc.namespace(svg), Some(trellis_core::SVG_NAMESPACE));
            assert_eq!(doc.namespace(icon), Some(trellis_core::SVG_NAMESPACE));
            assert_eq!(doc.attribute_namespace(icon, "href"), Some(XLINK_NAMESPACE));
        })
        .expect("document");
    });
}

#[test]
fn classes_and_styles_track_their_values() {
    run_test_render(|rule| {
        let on = Rc::new(Cell::new(true));
        let source = on.clone();
        rule.set_content(move || {
            let (classes, color): (Vec<&str>, &str) = if source.get() {
                (vec!["card", "", "active"], "red")
            } else {
                (Vec::new(), "")
            };
            vec![element("div")
                .prop("classes", classes)
                .prop("styles", PropValue::Map(props([("color", color)])))
                .into()]
        })
        .expect("mount");
        let div = rule.find("div").expect("div");
        assert_eq!(rule.markup(), r#"<div class="card active"></div>"#);
        assert_eq!(
            rule.with_document(|doc| doc.style(div, "color").map(str::to_string))
                .flatten()
                .as_deref(),
            Some("red")
        );

        on.set(false);
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), "<div></div>");
        assert_eq!(
            rule.with_document(|doc| doc.style(div, "color").map(str::to_string))
                .flatten(),
            None
        );
    });
}

#[test]
fn falsy_values_clear_string_properties() {
    run_test_render(|rule| {
        let title = Rc::new(Cell::new(true));
        let source = title.clone();
        rule.set_content(move || {
            let value: PropValue = if source.get() {
                "tip".into()
            } else {
                PropValue::Null
            };
            vec![element("p").prop("title", value).into()]
        })
        .expect("mount");
        assert_eq!(rule.markup(), r#"<p title="tip"></p>"#);

        title.set(false);
        rule.recompose().expect("recompose");
        assert_eq!(rule.markup(), r#"<p title=""></p>"#);
    });
}

#[test]
fn changed_text_is_replaced_in_place() {
    run_test_render(|rule| {
        let label = Rc::new(RefCell::new("one"));
        let source = label.clone();
        rule.set_content(move || vec![element("p").child(*source.borrow()).into()])
            .expect("mount");

        rule.clear_ops();
        *label.borrow_mut() = "two";
        rule.recompose().expect("recompose");

        assert_eq!(rule.markup(), "<p>two</p>");
        let structural = rule.structural_ops();
        assert_eq!(structural.len(), 2, "{structural:?}");
        assert!(matches!(structural[0], HostOp::CreateText { .. }));
        assert!(matches!(structural[1], HostOp::Replace { .. }));
    });
}

#[test]
fn no_diff_mode_rewrites_every_property() {
    run_test_render(|rule| {
        rule.set_content(|| {
            vec![
                element("input").prop("size", 3).diff_mode(DiffMode::None).into(),
                element("textarea").prop("rows", 3).into(),
            ]
        })
        .expect("mount");
        let input = rule.find("input").expect("input");
        let textarea = rule.find("textarea").expect("textarea");

        rule.clear_ops();
        rule.recompose().expect("recompose");

        let writes: Vec<HostOp> = rule
            .ops()
            .into_iter()
            .filter(|op| matches!(op, HostOp::SetProperty { .. }))
            .collect();
        assert_eq!(
            writes,
            vec![HostOp::SetProperty {
                node: input,
                name: "size".into()
            }]
        );
        assert!(!writes
            .iter()
            .any(|op| matches!(op, HostOp::SetProperty { node, .. } if *node == textarea)));
    });
}

#[test]
fn dom_diff_mode_restores_values_changed_behind_its_back() {
    run_test_render(|rule| {
        rule.set_content(|| {
            vec![element("div")
                .prop("title", "kept")
                .diff_mode(DiffMode::Dom)
                .into()]
        })
        .expect("mount");
        let div = rule.find("div").expect("div");

        rule.with_document_mut(|doc| doc.set_attribute(div, "title", "edited"));
        rule.recompose().expect("recompose");

        assert_eq!(rule.markup(), r#"<div title="kept"></div>"#);
    });
}

#[test]
fn rerendered_root_inserts_new_siblings_in_place() {
    run_test_render(|rule| {
        let show_nav = Rc::new(Cell::new(false));
        let flag = show_nav.clone();
        rule.set_content(move || {
            let mut nodes: Vec<Node> = vec![element("h1").into()];
            if flag.get() {
                nodes.push(element("nav").into());
            }
            nodes.push(element("footer").into());
            nodes
        })
        .expect("mount");
        assert_eq!(rule.markup(), "<h1></h1><footer></footer>");

        show_nav.set(true);
        rule.recompose().expect("recompose");

        assert_eq!(rule.markup(), "<h1></h1><nav></nav><footer></footer>");
    });
}
