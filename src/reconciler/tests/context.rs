//! Context 测试
//!
//! 验证嵌套 Provider、跨 memo 的变更传播和中断渲染时的栈恢复

use super::*;
use crate::reconciler::{Component, Context, Dispatch, Lanes, Node, Value};

fn span_of(value: &Value) -> Node {
    Element::host("span").child(Node::text(value)).into()
}

#[cfg(test)]
mod nesting_tests {
    use super::*;

    #[test]
    fn test_inner_provider_wins_then_outer_restored() {
        let h = Harness::new();
        let theme = Context::new("theme", 0);
        h.render(
            theme
                .provider(1)
                .child(theme.provider(2).child(theme.consumer(span_of)))
                .child(theme.consumer(span_of)),
        );
        assert_eq!(h.markup(), "<span>2</span><span>1</span>");
        assert!(theme.current().is_same(&Value::from(0)));
    }

    #[test]
    fn test_consumer_outside_provider_reads_default() {
        let h = Harness::new();
        let theme = Context::new("theme", "light");
        h.render(theme.consumer(span_of));
        assert_eq!(h.markup(), "<span>light</span>");
    }

    #[test]
    fn test_use_context_reads_nearest_provider() {
        let h = Harness::new();
        let theme = Context::new("theme", 0);
        let reader = {
            let theme = theme.clone();
            Component::new("Reader", move |hooks, _| span_of(&hooks.use_context(&theme)))
        };
        h.render(
            Element::fragment()
                .child(theme.provider(7).child(reader.element()))
                .child(reader.element()),
        );
        assert_eq!(h.markup(), "<span>7</span><span>0</span>");
    }
}

#[cfg(test)]
mod propagation_tests {
    use super::*;

    #[test]
    fn test_value_change_reaches_consumer_below_memo() {
        let h = Harness::new();
        let theme = Context::new("theme", 0);
        let leaf_renders = Rc::new(RefCell::new(0));
        let leaf = {
            let theme = theme.clone();
            let renders = leaf_renders.clone();
            Component::new("Leaf", move |hooks, _| {
                *renders.borrow_mut() += 1;
                span_of(&hooks.use_context(&theme))
            })
        };
        let middle = Component::new("Middle", move |_, _| leaf.element().into()).memo();
        let setter: Rc<RefCell<Option<Dispatch<i64>>>> = Rc::new(RefCell::new(None));
        let app = {
            let setter = setter.clone();
            Component::new("App", move |hooks, _| {
                let (value, set) = hooks.use_state(1i64);
                *setter.borrow_mut() = Some(set);
                theme.provider(*value).child(middle.element()).into()
            })
        };

        h.render(app.element());
        assert_eq!(h.markup(), "<span>1</span>");
        assert_eq!(*leaf_renders.borrow(), 1);

        let set = setter.borrow().clone().unwrap();
        assert!(set.dispatch(2));
        h.flush();
        assert_eq!(h.markup(), "<span>2</span>");
        assert_eq!(*leaf_renders.borrow(), 2);
    }

    #[test]
    fn test_unchanged_value_skips_memoized_subtree() {
        let h = Harness::new();
        let theme = Context::new("theme", 0);
        let leaf_renders = Rc::new(RefCell::new(0));
        let leaf = {
            let theme = theme.clone();
            let renders = leaf_renders.clone();
            Component::new("Leaf", move |hooks, _| {
                *renders.borrow_mut() += 1;
                span_of(&hooks.use_context(&theme))
            })
        };
        let middle = Component::new("Middle", move |_, _| leaf.element().into()).memo();
        let setter: Rc<RefCell<Option<Dispatch<i64>>>> = Rc::new(RefCell::new(None));
        let app = {
            let setter = setter.clone();
            Component::new("App", move |hooks, _| {
                let (_tick, set) = hooks.use_state(0i64);
                *setter.borrow_mut() = Some(set);
                theme.provider(5).child(middle.element()).into()
            })
        };

        h.render(app.element());
        let set = setter.borrow().clone().unwrap();
        set.dispatch(1);
        h.flush();
        assert_eq!(h.markup(), "<span>5</span>");
        assert_eq!(*leaf_renders.borrow(), 1);
    }
}

#[cfg(test)]
mod unwind_tests {
    use super::*;

    #[test]
    fn test_interrupted_render_restores_context_values() {
        let h = Harness::new();
        let theme = Context::new("theme", 0);
        let slow = {
            let clock = h.clock.clone();
            Component::new("Slow", move |_, _| {
                clock.advance(10);
                Node::text("slow")
            })
        };

        h.reconciler
            .update_container(theme.provider(5).child(slow.element()), &h.root)
            .unwrap();
        assert!(h.scheduler.perform_work_until_deadline().unwrap());
        assert!(theme.current().is_same(&Value::from(5)));
        assert_eq!(h.markup(), "");

        h.reconciler
            .with_update_priority(Lanes::SYNC, || {
                h.reconciler
                    .update_container(Element::host("p").child("sync"), &h.root)
            })
            .unwrap();
        h.flush();

        assert!(theme.current().is_same(&Value::from(0)));
        assert_eq!(h.markup(), "<p>sync</p>");
        assert!(h.root.pending_lanes().is_empty());
    }
}
