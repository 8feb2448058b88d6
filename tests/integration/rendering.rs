use std::rc::Rc;

use fiberloom::host::{HostOp, MemoryHost};
use fiberloom::reconciler::{Component, Context, Element, Node, Reconciler, Value};
use fiberloom::scheduler::{Scheduler, VirtualClock};

struct App {
    scheduler: Scheduler,
    host: Rc<MemoryHost>,
    reconciler: Reconciler,
}

impl App {
    fn new() -> Self {
        let scheduler = Scheduler::new(VirtualClock::new());
        let host = Rc::new(MemoryHost::new());
        let reconciler = Reconciler::new(scheduler.clone(), host.clone());
        Self {
            scheduler,
            host,
            reconciler,
        }
    }
}

#[test]
fn test_todo_list_round_trip() {
    let app = App::new();
    let root = app.reconciler.create_container(app.host.container());

    let todo_list = Component::new("TodoList", |hooks, _| {
        let (items, set) = hooks.use_state(vec!["write".to_string()]);
        let add = set.clone();
        Element::host("section")
            .child(
                Element::host("button")
                    .on("click", move |payload| {
                        let item = payload.as_str().unwrap_or("item").to_string();
                        add.set_with(move |items: &Vec<String>| {
                            let mut next = items.clone();
                            next.push(item);
                            next
                        });
                    })
                    .child("add"),
            )
            .child(
                Element::host("ul").children(
                    items
                        .iter()
                        .map(|item| Element::host("li").key(item).child(item.as_str()).into()),
                ),
            )
            .into()
    });

    app.reconciler.update_container(todo_list.element(), &root).unwrap();
    app.scheduler.run_until_idle().unwrap();
    assert_eq!(
        app.host.to_markup(),
        "<section><button>add</button><ul><li>write</li></ul></section>"
    );

    let button = app.host.query("button").unwrap();
    app.host.take_ops();
    app.reconciler
        .dispatch_event(&root, button, "click", &Value::from("test"))
        .unwrap();
    app.scheduler.run_until_idle().unwrap();

    assert_eq!(
        app.host.to_markup(),
        "<section><button>add</button><ul><li>write</li><li>test</li></ul></section>"
    );
    let ops = app.host.take_ops();
    let ul = app.host.query("ul").unwrap();
    assert!(ops
        .iter()
        .any(|op| matches!(op, HostOp::AppendChild { parent, .. } if *parent == ul)));
    assert!(!ops.iter().any(|op| matches!(op, HostOp::RemoveChild { .. })));
}

#[test]
fn test_context_reaches_nested_components() {
    let app = App::new();
    let root = app.reconciler.create_container(app.host.container());
    let locale = Context::new("locale", "en");
    let greeting = {
        let locale = locale.clone();
        Component::new("Greeting", move |hooks, _| {
            let value = hooks.use_context(&locale);
            let text = match value.as_str() {
                Some("fr") => "bonjour",
                _ => "hello",
            };
            Element::host("h1").child(text).into()
        })
    };

    let tree = |lang: &str| -> Node {
        locale
            .provider(lang)
            .child(Element::host("main").child(greeting.element()))
            .into()
    };

    app.reconciler.update_container(tree("en"), &root).unwrap();
    app.scheduler.run_until_idle().unwrap();
    assert_eq!(app.host.to_markup(), "<main><h1>hello</h1></main>");

    app.reconciler.update_container(tree("fr"), &root).unwrap();
    app.scheduler.run_until_idle().unwrap();
    assert_eq!(app.host.to_markup(), "<main><h1>bonjour</h1></main>");
}

#[test]
fn test_json_snapshot_of_committed_tree() {
    let app = App::new();
    let root = app.reconciler.create_container(app.host.container());
    app.reconciler
        .update_container(Element::host("p").prop("class", "note").child("hi"), &root)
        .unwrap();
    app.scheduler.run_until_idle().unwrap();

    let json = app.host.to_json();
    let text = json.to_string();
    assert!(text.contains("\"p\""));
    assert!(text.contains("note"));
    assert!(text.contains("hi"));
    assert_eq!(root.commit_count(), 1);
}
