//! Hooks 测试
//!
//! 验证状态保持、依赖比较、effect 顺序以及 hook 顺序检查

use super::*;
use crate::reconciler::{are_hook_inputs_equal, Cleanup, Component, Dispatch, Lanes, Node, Value};

type Slot<T> = Rc<RefCell<Option<T>>>;

fn slot<T>() -> Slot<T> {
    Rc::new(RefCell::new(None))
}

fn take<T: Clone>(slot: &Slot<T>) -> T {
    slot.borrow().clone().expect("slot not filled by render")
}

#[cfg(test)]
mod deps_tests {
    use super::*;

    #[test]
    fn test_inputs_equal_elementwise() {
        let a = [Value::from(1), Value::from("x")];
        let b = [Value::from(1), Value::from("x")];
        assert!(are_hook_inputs_equal(Some(&a[..]), Some(&b[..])));
        assert!(!are_hook_inputs_equal(Some(&a[..]), Some(&a[..1])));
        assert!(!are_hook_inputs_equal(None, None));
    }

    #[test]
    fn test_nan_and_signed_zero() {
        let nan = [Value::from(f64::NAN)];
        assert!(are_hook_inputs_equal(Some(&nan[..]), Some(&nan[..])));
        let zero = [Value::from(0.0)];
        let neg = [Value::from(-0.0)];
        assert!(!are_hook_inputs_equal(Some(&zero[..]), Some(&neg[..])));
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;

    #[test]
    fn test_state_survives_rerender_and_reducer_applies_in_order() {
        let h = Harness::new();
        let dispatch: Slot<Dispatch<i64>> = slot();
        let counter = {
            let dispatch = dispatch.clone();
            Component::new("Counter", move |hooks, _| {
                let (count, add) = hooks.use_reducer(|state: &i64, delta: i64| state + delta, 10);
                *dispatch.borrow_mut() = Some(add);
                Element::host("i").child(Node::text(count)).into()
            })
        };
        h.render(counter.element());
        assert_eq!(h.markup(), "<i>10</i>");

        let add = take(&dispatch);
        add.dispatch(1);
        add.dispatch(5);
        h.flush();
        assert_eq!(h.markup(), "<i>16</i>");
        assert_eq!(h.root.commit_count(), 2);
    }

    #[test]
    fn test_set_with_sees_previous_value() {
        let h = Harness::new();
        let dispatch: Slot<Dispatch<String>> = slot();
        let name = {
            let dispatch = dispatch.clone();
            Component::new("Name", move |hooks, _| {
                let (name, set) = hooks.use_state(String::from("a"));
                *dispatch.borrow_mut() = Some(set);
                Element::host("b").child(name.as_str()).into()
            })
        };
        h.render(name.element());
        let set = take(&dispatch);
        set.set_with(|prev| format!("{prev}b"));
        set.set_with(|prev| format!("{prev}c"));
        h.flush();
        assert_eq!(h.markup(), "<b>abc</b>");
    }

    #[test]
    fn test_state_kept_when_unrelated_prop_changes() {
        let h = Harness::new();
        let dispatch: Slot<Dispatch<i64>> = slot();
        let badge = {
            let dispatch = dispatch.clone();
            Component::new("Badge", move |hooks, props| {
                let (count, add) = hooks.use_reducer(|state: &i64, delta: i64| state + delta, 50);
                *dispatch.borrow_mut() = Some(add);
                let label = props.get("label").and_then(Value::as_str).unwrap_or("").to_string();
                Element::host("i").child(Node::text(format!("{label}{count}"))).into()
            })
        };
        h.render(badge.element().prop("label", "a"));
        take(&dispatch).dispatch(1);
        h.flush();
        assert_eq!(h.markup(), "<i>a51</i>");

        h.render(badge.element().prop("label", "b"));
        assert_eq!(h.markup(), "<i>b51</i>");
    }

    #[test]
    fn test_reducer_init_seeds_state_on_mount() {
        let h = Harness::new();
        let inits = Rc::new(RefCell::new(0));
        let dispatch: Slot<Dispatch<i64>> = slot();
        let scaled = {
            let inits = inits.clone();
            let dispatch = dispatch.clone();
            Component::new("Scaled", move |hooks, _| {
                let inits = inits.clone();
                let (value, add) = hooks.use_reducer_with_init(
                    |state: &i64, delta: i64| state + delta,
                    5i64,
                    move |arg| {
                        *inits.borrow_mut() += 1;
                        arg * 10
                    },
                );
                *dispatch.borrow_mut() = Some(add);
                Node::text(value)
            })
        };
        h.render(scaled.element());
        assert_eq!(h.markup(), "50");

        take(&dispatch).dispatch(2);
        h.flush();
        assert_eq!(h.markup(), "52");
        assert_eq!(*inits.borrow(), 1);
    }

    #[test]
    fn test_dispatch_after_unmount_is_noop() {
        let h = Harness::new();
        let dispatch: Slot<Dispatch<i64>> = slot();
        let counter = {
            let dispatch = dispatch.clone();
            Component::new("Counter", move |hooks, _| {
                let (count, set) = hooks.use_state(0i64);
                *dispatch.borrow_mut() = Some(set);
                Node::text(count)
            })
        };
        h.render(counter.element());
        let set = take(&dispatch);
        assert!(set.dispatch(1));
        h.flush();
        assert_eq!(h.markup(), "1");

        h.render(Node::Empty);
        assert_eq!(h.markup(), "");
        assert!(!set.dispatch(2));
        assert!(!h.root.has_scheduled_work());
        assert!(!h.scheduler.has_pending_work());
    }
}

#[cfg(test)]
mod memo_ref_tests {
    use super::*;

    #[test]
    fn test_memo_recomputes_only_when_deps_change() {
        let h = Harness::new();
        let computed = Rc::new(RefCell::new(0));
        let refs: Log = new_log();
        let rerender: Slot<Dispatch<i64>> = slot();
        let view = {
            let computed = computed.clone();
            let refs = refs.clone();
            let rerender = rerender.clone();
            Component::new("View", move |hooks, props| {
                let (_tick, set) = hooks.use_state(0i64);
                *rerender.borrow_mut() = Some(set);
                let n = props.get("n").and_then(Value::as_int).unwrap_or(0);
                let computed = computed.clone();
                let doubled = hooks.use_memo(
                    move || {
                        *computed.borrow_mut() += 1;
                        n * 2
                    },
                    &[Value::from(n)],
                );
                let cell = hooks.use_ref(0usize);
                refs.borrow_mut().push(format!("{:p}", Rc::as_ptr(&cell)));
                Node::text(doubled)
            })
        };

        h.render(view.element().prop("n", 2));
        take(&rerender).dispatch(1);
        h.flush();
        assert_eq!(h.markup(), "4");
        assert_eq!(*computed.borrow(), 1);

        h.render(view.element().prop("n", 3));
        assert_eq!(h.markup(), "6");
        assert_eq!(*computed.borrow(), 2);

        let refs = entries(&refs);
        assert_eq!(refs.len(), 3);
        assert!(refs.iter().all(|p| *p == refs[0]));
    }

    #[test]
    fn test_callback_stable_until_deps_change() {
        let h = Harness::new();
        let seen = new_log();
        let rerender: Slot<Dispatch<i64>> = slot();
        let view = {
            let seen = seen.clone();
            let rerender = rerender.clone();
            Component::new("Handler", move |hooks, props| {
                let (_tick, set) = hooks.use_state(0i64);
                *rerender.borrow_mut() = Some(set);
                let n = props.get("n").and_then(Value::as_int).unwrap_or(0);
                let callback = hooks.use_callback(move |x: i64| x + n, &[Value::from(n)]);
                seen.borrow_mut()
                    .push(format!("{:p} {}", Rc::as_ptr(&callback), callback(10)));
                Node::Empty
            })
        };

        h.render(view.element().prop("n", 1));
        take(&rerender).dispatch(1);
        h.flush();
        h.render(view.element().prop("n", 2));

        let seen = entries(&seen);
        assert_eq!(seen.len(), 3);
        let split: Vec<(&str, &str)> = seen.iter().filter_map(|e| e.split_once(' ')).collect();
        assert_eq!(split[0], split[1]);
        assert_eq!(split[1].1, "11");
        assert_ne!(split[2].0, split[1].0);
        assert_eq!(split[2].1, "12");
    }

    #[test]
    fn test_changed_hook_order_is_an_error() {
        let h = Harness::new();
        let shifty = Component::new("Shifty", |hooks, props| {
            if props.get("mode").and_then(Value::as_int) == Some(1) {
                hooks.use_state(0i64);
            } else {
                hooks.use_ref(0i64);
            }
            Node::Empty
        });
        h.render(shifty.element().prop("mode", 1));
        h.reconciler
            .update_container(shifty.element().prop("mode", 2), &h.root)
            .unwrap();
        match h.flush_err() {
            ReconcilerError::HookOrderMismatch { index, found } => {
                assert_eq!(index, 0);
                assert_eq!(found, "state");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!h.reconciler.is_rendering());
    }
}

#[cfg(test)]
mod effect_tests {
    use super::*;

    fn logged(
        log: &Log,
        create: String,
        destroy: String,
    ) -> impl FnOnce() -> Option<Cleanup> + 'static {
        let log = log.clone();
        move || {
            log.borrow_mut().push(create);
            let log = log.clone();
            Some(Box::new(move || log.borrow_mut().push(destroy)) as Cleanup)
        }
    }

    fn effect_component(log: &Log) -> (Component, Slot<Dispatch<i64>>) {
        let dispatch: Slot<Dispatch<i64>> = slot();
        let component = {
            let log = log.clone();
            let dispatch = dispatch.clone();
            Component::new("Effects", move |hooks, _| {
                let (n, set) = hooks.use_state(0i64);
                *dispatch.borrow_mut() = Some(set);
                hooks.use_effect(
                    logged(&log, format!("create {n}"), format!("destroy {n}")),
                    Some(&[Value::from(*n)]),
                );
                Node::text(n)
            })
        };
        (component, dispatch)
    }

    #[test]
    fn test_effect_runs_on_deps_change_only() {
        let h = Harness::new();
        let log = new_log();
        let (component, dispatch) = effect_component(&log);

        h.render(component.element());
        assert_eq!(entries(&log), vec!["create 0"]);

        let set = take(&dispatch);
        set.dispatch(1);
        h.flush();
        assert_eq!(entries(&log), vec!["create 0", "destroy 0", "create 1"]);

        set.dispatch(1);
        h.flush();
        assert_eq!(entries(&log).len(), 3);

        h.render(Node::Empty);
        assert_eq!(entries(&log).last().map(String::as_str), Some("destroy 1"));
    }

    #[test]
    fn test_passive_effects_wait_for_their_task() {
        let h = Harness::new();
        let log = new_log();
        let component = {
            let log = log.clone();
            let clock = h.clock.clone();
            Component::new("Slow", move |hooks, _| {
                clock.advance(10);
                hooks.use_effect(logged(&log, "create".into(), "destroy".into()), Some(&[]));
                Node::Empty
            })
        };

        h.reconciler
            .with_update_priority(Lanes::SYNC, || h.reconciler.update_container(component.element(), &h.root))
            .unwrap();
        assert!(h.scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(h.root.commit_count(), 1);
        assert!(entries(&log).is_empty());
        assert!(h.root.has_pending_passive_effects());

        h.flush();
        assert_eq!(entries(&log), vec!["create"]);
        assert!(!h.root.has_pending_passive_effects());
    }

    #[test]
    fn test_layout_effects_run_before_passive() {
        let h = Harness::new();
        let log = new_log();
        let component = {
            let log = log.clone();
            Component::new("Both", move |hooks, _| {
                hooks.use_effect(logged(&log, "passive".into(), "passive cleanup".into()), None);
                hooks.use_layout_effect(logged(&log, "layout".into(), "layout cleanup".into()), None);
                Node::Empty
            })
        };
        h.render(component.element());
        assert_eq!(entries(&log), vec!["layout", "passive"]);

        h.render(Node::Empty);
        assert_eq!(
            entries(&log),
            vec!["layout", "passive", "layout cleanup", "passive cleanup"]
        );
    }

    #[test]
    fn test_layout_effect_sees_committed_host_tree() {
        let h = Harness::new();
        let seen = Rc::new(RefCell::new(String::new()));
        let component = {
            let host = h.host.clone();
            let seen = seen.clone();
            Component::new("Measure", move |hooks, _| {
                let host = host.clone();
                let seen = seen.clone();
                hooks.use_layout_effect(
                    move || {
                        *seen.borrow_mut() = host.to_markup();
                        None
                    },
                    Some(&[]),
                );
                Element::host("div").child("measured").into()
            })
        };
        h.render(component.element());
        assert_eq!(*seen.borrow(), "<div>measured</div>");
    }
}

#[cfg(test)]
mod deferred_tests {
    use super::*;

    #[test]
    fn test_deferred_value_lags_urgent_update() {
        let h = Harness::new();
        let seen = new_log();
        let dispatch: Slot<Dispatch<String>> = slot();
        let search = {
            let seen = seen.clone();
            let dispatch = dispatch.clone();
            Component::new("Search", move |hooks, _| {
                let (query, set) = hooks.use_state(String::from("a"));
                *dispatch.borrow_mut() = Some(set);
                let deferred = hooks.use_deferred_value(query.as_str());
                seen.borrow_mut().push(deferred.to_string());
                Node::text(deferred)
            })
        };
        h.render(search.element());
        assert_eq!(entries(&seen), vec!["a"]);

        let set = take(&dispatch);
        h.reconciler.with_update_priority(Lanes::SYNC, || set.dispatch("b".to_string()));
        h.flush();
        assert_eq!(entries(&seen), vec!["a", "a", "b"]);
        assert_eq!(h.markup(), "b");
    }
}
