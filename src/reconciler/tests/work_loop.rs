//! 工作循环测试：挂载、更新、时间切片与多根

use std::cell::Cell;

use super::*;
use crate::host::HostConfig;
use crate::reconciler::{Component, Lanes, Props};

fn counter() -> Component {
    Component::new("Counter", |hooks, _| {
        let (n, set) = hooks.use_state(0i64);
        let next = *n + 1;
        Element::host("div")
            .on("click", move |_| {
                set.dispatch(next);
            })
            .child(Node::text(n))
            .into()
    })
}

fn slow(clock: &VirtualClock, label: &'static str) -> Component {
    let clock = clock.clone();
    Component::new(label, move |_, _| {
        clock.advance(10);
        Node::text(label)
    })
}

#[cfg(test)]
mod mount_tests {
    use super::*;

    #[test]
    fn test_mount_builds_offscreen_then_attaches_once() {
        let h = Harness::new();
        h.render(Element::host("div").prop("id", "app").child(Element::host("span").child("hi")));
        assert_eq!(h.markup(), "<div id=\"app\"><span>hi</span></div>");

        let (div, span) = (h.query("div"), h.query("span"));
        let container = h.host.container();
        assert_eq!(
            h.take_ops(),
            vec![
                HostOp::CreateInstance { node: span, ty: "span".into() },
                HostOp::SetTextContent { node: span, text: "hi".into() },
                HostOp::CreateInstance { node: div, ty: "div".into() },
                HostOp::SetProperty { node: div, name: "id".into(), value: "app".into() },
                HostOp::AppendChild { parent: div, child: span },
                HostOp::AppendChild { parent: container, child: div },
            ]
        );
        assert_eq!(h.root.last_commit().placements, 1);
        assert_eq!(h.root.commit_count(), 1);
    }

    #[test]
    fn test_unmount_everything() {
        let h = Harness::new();
        h.render(Element::host("div").child(Element::host("span")));
        h.take_ops();
        h.render(Node::Empty);
        assert_eq!(h.markup(), "");
        let ops = h.take_ops();
        assert_eq!(count_ops(&ops, |op| matches!(op, HostOp::RemoveChild { .. })), 1);
        assert_eq!(h.root.last_commit().deletions, 1);
    }

    #[test]
    fn test_nothing_scheduled_after_flush() {
        let h = Harness::new();
        h.render(Element::host("p"));
        assert!(!h.root.has_scheduled_work());
        assert!(!h.scheduler.has_pending_work());
        assert!(h.root.pending_lanes().is_empty());
    }
}

#[cfg(test)]
mod update_tests {
    use super::*;

    #[test]
    fn test_click_updates_counter_in_place() {
        let h = Harness::new();
        h.render(counter().element());
        assert_eq!(h.markup(), "<div>0</div>");
        let div = h.query("div");
        h.take_ops();

        assert_eq!(h.click(div), 1);
        assert_eq!(h.markup(), "<div>1</div>");
        assert_eq!(h.take_ops(), vec![HostOp::SetTextContent { node: div, text: "1".into() }]);
        let stats = h.root.last_commit();
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.placements, 0);
        assert!(stats.lanes.contains(Lanes::SYNC));
    }

    #[test]
    fn test_updates_in_one_event_are_batched() {
        let h = Harness::new();
        let slot = Rc::new(RefCell::new(None));
        let sink = slot.clone();
        h.render(
            Component::new("Batched", move |hooks, _| {
                let (n, set) = hooks.use_state(0i64);
                *sink.borrow_mut() = Some(set);
                Node::text(n)
            })
            .element(),
        );
        let set = slot.borrow().clone().unwrap();
        set.set_with(|n| n + 1);
        set.set_with(|n| n + 1);
        set.set_with(|n| n + 1);
        h.flush();
        assert_eq!(h.markup(), "3");
        assert_eq!(h.root.commit_count(), 2);
    }

    #[test]
    fn test_render_phase_update_rerenders() {
        let h = Harness::new();
        h.render(
            Component::new("Climb", |hooks, _| {
                let (n, set) = hooks.use_state(0i64);
                if *n < 3 {
                    set.dispatch(*n + 1);
                }
                Element::host("i").child(Node::text(n)).into()
            })
            .element(),
        );
        assert_eq!(h.markup(), "<i>3</i>");
        assert!(h.root.pending_lanes().is_empty());
    }

    #[test]
    fn test_update_container_during_render_is_rejected() {
        let h = Harness::new();
        let outcome: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));
        let (sink, reconciler, weak) = (outcome.clone(), h.reconciler.clone(), h.root.downgrade());
        h.render(
            Component::new("Nested", move |_, _| {
                if let Some(root) = Root::from_weak(&weak) {
                    let result = reconciler.update_container(Node::Empty, &root);
                    sink.set(Some(matches!(result, Err(ReconcilerError::RenderInProgress))));
                }
                Node::text("ok")
            })
            .element(),
        );
        assert_eq!(outcome.get(), Some(true));
        assert_eq!(h.markup(), "ok");
    }
}

#[cfg(test)]
mod slicing_tests {
    use super::*;

    #[test]
    fn test_default_render_yields_and_resumes() {
        let h = Harness::new();
        let children: Vec<Node> = ["a", "b", "c"]
            .into_iter()
            .map(|label| slow(&h.clock, label).element().into())
            .collect();
        h.reconciler.update_container(Node::list(children), &h.root).unwrap();

        assert!(h.scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(h.markup(), "");
        assert_eq!(h.root.commit_count(), 0);
        assert!(h.root.has_scheduled_work());

        h.flush();
        assert_eq!(h.markup(), "abc");
        assert_eq!(h.root.commit_count(), 1);
    }

    #[test]
    fn test_sync_render_does_not_yield() {
        let h = Harness::new();
        let children: Vec<Node> = ["a", "b", "c"]
            .into_iter()
            .map(|label| slow(&h.clock, label).element().into())
            .collect();
        h.reconciler
            .with_update_priority(Lanes::SYNC, || h.reconciler.update_container(Node::list(children), &h.root))
            .unwrap();
        h.scheduler.perform_work_until_deadline().unwrap();
        assert_eq!(h.markup(), "abc");
        assert_eq!(h.root.commit_count(), 1);
    }

    #[test]
    fn test_transition_render_is_time_sliced() {
        let h = Harness::new();
        h.reconciler
            .start_transition(|| h.reconciler.update_container(slow(&h.clock, "t").element(), &h.root))
            .unwrap();
        assert!(h.root.pending_lanes().is_transition());
        h.flush();
        assert_eq!(h.markup(), "t");
    }
}

#[cfg(test)]
mod root_tests {
    use super::*;

    #[test]
    fn test_roots_render_independently() {
        let h = Harness::new();
        let section = h.host.create_instance("section", &Props::new()).unwrap();
        let second = h.reconciler.create_container(section);

        h.render(Element::host("p").child("one"));
        h.reconciler
            .update_container(Element::host("p").child("two"), &second)
            .unwrap();
        h.flush();

        assert_eq!(h.markup(), "<p>one</p>");
        assert_eq!(h.host.markup_of(section), "<section><p>two</p></section>");
        assert_eq!(h.root.commit_count(), 1);
        assert_eq!(second.commit_count(), 1);
        assert!(!h.root.same(&second));
    }

    #[test]
    fn test_fiber_count_stays_bounded() {
        let h = Harness::new();
        h.render(counter().element());
        let div = h.query("div");
        h.click(div);
        let after_one = h.root.with_tree(|tree| tree.len());
        for _ in 0..20 {
            h.click(div);
        }
        assert_eq!(h.markup(), "<div>21</div>");
        assert_eq!(h.root.with_tree(|tree| tree.len()), after_one);
    }

    #[test]
    fn test_deleted_fibers_are_released() {
        let h = Harness::new();
        h.render(keyed_list(&["a", "b"]));
        h.render(keyed_list(&["c", "d"]));
        let first = h.root.with_tree(|tree| tree.len());
        h.render(keyed_list(&["a", "b"]));
        h.render(keyed_list(&["c", "d"]));
        assert_eq!(h.root.with_tree(|tree| tree.len()), first);
        assert_eq!(h.markup(), "<ul><li>c</li><li>d</li></ul>");
    }
}
