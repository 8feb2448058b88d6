//! The "begin" half of a unit of work.
//!
//! Renders one fiber and reconciles its children, or bails out when its
//! inputs are unchanged. Component code runs with no tree borrow held, so it
//! may dispatch updates freely.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::child::{mount_child_fibers, reconcile_child_fibers};
use super::class::{ClassQueue, ClassType};
use super::context::{read_context, Context};
use super::element::{Component, ElementType, MemoComponent, Node, Props, Value};
use super::fiber::{FiberId, FiberProps, FiberTree, StateNode, UpdateQueue, WorkTag};
use super::flags::Flags;
use super::hooks::Hooks;
use super::lane::{Lanes, NO_LANES};
use super::work_loop::WorkCx;
use super::ReconcilerError;

/// Value carried by provider props.
pub(crate) fn provider_value(props: &Props) -> Value {
    props.get("value").cloned().unwrap_or_default()
}

fn element_props_of(
    tree: &FiberTree,
    fiber: FiberId,
) -> Rc<Props> {
    tree[fiber].pending_props.element().cloned().unwrap_or_default()
}

/// Begin work on `wip`. Returns the child to work on next.
pub(crate) fn begin_work(
    cx: &WorkCx<'_>,
    wip: FiberId,
) -> Result<Option<FiberId>, ReconcilerError> {
    {
        let mut tree = cx.root.tree_mut();
        let fiber = &tree[wip];
        if let Some(current) = fiber.alternate {
            let props_unchanged = tree[current].memoized_props.same(&fiber.pending_props);
            if props_unchanged && !fiber.lanes.intersects(cx.render_lanes) {
                return Ok(attempt_early_bailout(cx, &mut tree, wip));
            }
        }
        tree[wip].lanes = NO_LANES;
    }

    let (tag, element_type) = {
        let tree = cx.root.tree();
        (tree[wip].tag, tree[wip].element_type.clone())
    };
    match (tag, element_type) {
        (WorkTag::HostRoot, _) => Ok(update_host_root(cx, wip)),
        (WorkTag::HostComponent, _) => Ok(update_host_component(cx, wip)),
        (WorkTag::HostText, _) => Ok(None),
        (WorkTag::Fragment, _) => Ok(update_fragment(cx, wip)),
        (WorkTag::FunctionComponent, Some(ElementType::Function(component))) => {
            let props = element_props_of(&cx.root.tree(), wip);
            update_function_component(cx, wip, &component, &props)
        }
        (WorkTag::Memo, Some(ElementType::Memo(memo))) => update_memo_component(cx, wip, &memo),
        (WorkTag::ClassComponent, Some(ElementType::Class(class))) => update_class_component(cx, wip, &class),
        (WorkTag::ContextProvider, Some(ElementType::Provider(context))) => {
            Ok(update_context_provider(cx, wip, &context))
        }
        (WorkTag::ContextConsumer, Some(ElementType::Consumer(context))) => {
            Ok(update_context_consumer(cx, wip, &context))
        }
        (tag, _) => Err(ReconcilerError::MissingElementType { tag }),
    }
}

fn attempt_early_bailout(
    cx: &WorkCx<'_>,
    tree: &mut FiberTree,
    wip: FiberId,
) -> Option<FiberId> {
    if let Some(ElementType::Provider(context)) = &tree[wip].element_type {
        let value = tree[wip]
            .memoized_props
            .element()
            .map(|props| provider_value(props))
            .unwrap_or_default();
        cx.reconciler.contexts().borrow_mut().push_provider(context, value);
    }
    bailout_on_already_finished_work(tree, wip, cx.render_lanes)
}

/// Skip `wip`. Its children are cloned only if they have pending work.
fn bailout_on_already_finished_work(
    tree: &mut FiberTree,
    wip: FiberId,
    render_lanes: Lanes,
) -> Option<FiberId> {
    if !tree[wip].child_lanes.intersects(render_lanes) {
        trace!("bailing out of {} and its subtree", tree[wip].name());
        return None;
    }
    clone_child_fibers(tree, wip);
    tree[wip].child
}

fn clone_child_fibers(
    tree: &mut FiberTree,
    wip: FiberId,
) {
    let Some(mut current_child) = tree[wip].child else {
        return;
    };
    let props = tree[current_child].pending_props.clone();
    let mut new_child = tree.create_work_in_progress(current_child, props);
    tree[wip].child = Some(new_child);
    tree[new_child].return_fiber = Some(wip);
    while let Some(next) = tree[current_child].sibling {
        current_child = next;
        let props = tree[current_child].pending_props.clone();
        let sibling = tree.create_work_in_progress(current_child, props);
        tree[new_child].sibling = Some(sibling);
        tree[sibling].return_fiber = Some(wip);
        new_child = sibling;
    }
    tree[new_child].sibling = None;
}

fn reconcile_children(
    cx: &WorkCx<'_>,
    wip: FiberId,
    next_children: &Node,
) -> Option<FiberId> {
    let mut tree = cx.root.tree_mut();
    let child = match tree[wip].alternate {
        Some(current) => {
            let current_child = tree[current].child;
            reconcile_child_fibers(&mut tree, wip, current_child, next_children, cx.render_lanes)
        }
        None => mount_child_fibers(&mut tree, wip, next_children, cx.render_lanes),
    };
    tree[wip].child = child;
    child
}

fn update_host_root(
    cx: &WorkCx<'_>,
    wip: FiberId,
) -> Option<FiberId> {
    let element = cx.root.element();
    reconcile_children(cx, wip, &element)
}

fn update_host_component(
    cx: &WorkCx<'_>,
    wip: FiberId,
) -> Option<FiberId> {
    let host = cx.reconciler.host();
    let (ty, props, previous) = {
        let tree = cx.root.tree();
        let fiber = &tree[wip];
        let previous = fiber
            .alternate
            .and_then(|current| tree[current].memoized_props.element().cloned());
        (
            fiber.host_type().unwrap_or_default().to_string(),
            element_props_of(&tree, wip),
            previous,
        )
    };

    let is_direct_text_child = host.should_set_text_content(&ty, &props);
    let next_children = if is_direct_text_child {
        // Rendered as the node's own text content, not as a child fiber.
        Node::Empty
    } else {
        if previous.is_some_and(|prev| host.should_set_text_content(&ty, &prev)) {
            cx.root.tree_mut()[wip].flags |= Flags::CONTENT_RESET;
        }
        props.children().clone()
    };
    reconcile_children(cx, wip, &next_children)
}

fn update_fragment(
    cx: &WorkCx<'_>,
    wip: FiberId,
) -> Option<FiberId> {
    let children = match &cx.root.tree()[wip].pending_props {
        FiberProps::Children(node) => node.clone(),
        _ => Node::Empty,
    };
    reconcile_children(cx, wip, &children)
}

fn update_function_component(
    cx: &WorkCx<'_>,
    wip: FiberId,
    component: &Component,
    props: &Props,
) -> Result<Option<FiberId>, ReconcilerError> {
    let previous = {
        let tree = cx.root.tree();
        tree[wip]
            .alternate
            .map(|current| tree[current].memoized_state.clone())
    };
    let root = cx.root.downgrade();
    let mut hooks = Hooks::new(
        wip,
        &root,
        cx.reconciler.transitions(),
        cx.render_lanes,
        previous,
    );
    let children = component.render(&mut hooks, props);
    let rendered = hooks.finish()?;
    {
        let mut tree = cx.root.tree_mut();
        let fiber = &mut tree[wip];
        fiber.memoized_state = rendered.hooks;
        fiber.update_queue = UpdateQueue::Effects(rendered.effects);
        fiber.flags |= rendered.flags;
        fiber.lanes |= rendered.lanes;
        fiber.dependencies = rendered.dependencies;
    }
    Ok(reconcile_children(cx, wip, &children))
}

fn update_memo_component(
    cx: &WorkCx<'_>,
    wip: FiberId,
    memo: &MemoComponent,
) -> Result<Option<FiberId>, ReconcilerError> {
    let (props, previous) = {
        let tree = cx.root.tree();
        let previous = tree[wip].alternate.and_then(|current| {
            let fiber = &tree[current];
            if fiber.lanes.intersects(cx.render_lanes) {
                None
            } else {
                fiber.memoized_props.element().cloned()
            }
        });
        (element_props_of(&tree, wip), previous)
    };
    if let Some(previous) = previous {
        if memo.props_equal(&previous, &props) {
            let mut tree = cx.root.tree_mut();
            return Ok(bailout_on_already_finished_work(&mut tree, wip, cx.render_lanes));
        }
    }
    update_function_component(cx, wip, memo.component(), &props)
}

fn update_class_component(
    cx: &WorkCx<'_>,
    wip: FiberId,
    class: &ClassType,
) -> Result<Option<FiberId>, ReconcilerError> {
    let (props, instance, queue) = {
        let tree = cx.root.tree();
        let fiber = &tree[wip];
        let instance = match &fiber.state_node {
            StateNode::Class(instance) => Some(instance.clone()),
            _ => None,
        };
        let queue = match &fiber.update_queue {
            UpdateQueue::Class(queue) => Some(queue.clone()),
            _ => None,
        };
        (element_props_of(&tree, wip), instance, queue)
    };

    let (instance, queue) = match instance {
        Some(instance) => (instance, queue),
        None => {
            let queue = Rc::new(ClassQueue::new(wip, cx.root.downgrade()));
            let instance = Rc::new(RefCell::new(class.construct(&props, &queue)));
            let mut tree = cx.root.tree_mut();
            tree[wip].state_node = StateNode::Class(instance.clone());
            tree[wip].update_queue = UpdateQueue::Class(queue.clone());
            (instance, Some(queue))
        }
    };

    if let Some(queue) = queue {
        queue.process(&mut instance.borrow_mut());
    }
    if let Some(context) = class.context_type() {
        instance.borrow_mut().set_context(read_context(context));
        let mut tree = cx.root.tree_mut();
        tree[wip].dependencies.clear();
        tree[wip].dependencies.push(context.clone());
    }
    let children = instance.borrow().render(&props);
    Ok(reconcile_children(cx, wip, &children))
}

fn update_context_provider(
    cx: &WorkCx<'_>,
    wip: FiberId,
    context: &Context,
) -> Option<FiberId> {
    let (props, previous) = {
        let tree = cx.root.tree();
        let previous = tree[wip]
            .alternate
            .and_then(|current| tree[current].memoized_props.element().cloned());
        (element_props_of(&tree, wip), previous)
    };
    let value = provider_value(&props);
    cx.reconciler
        .contexts()
        .borrow_mut()
        .push_provider(context, value.clone());

    if let Some(previous) = previous {
        let mut tree = cx.root.tree_mut();
        if provider_value(&previous).is_same(&value) {
            if previous.children().same(props.children()) {
                return bailout_on_already_finished_work(&mut tree, wip, cx.render_lanes);
            }
        } else {
            propagate_context_change(&mut tree, wip, context, cx.render_lanes);
        }
    }
    reconcile_children(cx, wip, props.children())
}

fn update_context_consumer(
    cx: &WorkCx<'_>,
    wip: FiberId,
    context: &Context,
) -> Option<FiberId> {
    let props = {
        let mut tree = cx.root.tree_mut();
        tree[wip].dependencies.clear();
        tree[wip].dependencies.push(context.clone());
        element_props_of(&tree, wip)
    };
    let value = read_context(context);
    let children = props
        .render_prop()
        .map(|render| render(&value))
        .unwrap_or_default();
    reconcile_children(cx, wip, &children)
}

/// Mark every consumer of `context` below `wip` for re-render.
fn propagate_context_change(
    tree: &mut FiberTree,
    wip: FiberId,
    context: &Context,
    render_lanes: Lanes,
) {
    let mut fiber = tree[wip].child;
    if let Some(first) = fiber {
        tree[first].return_fiber = Some(wip);
    }
    while let Some(id) = fiber {
        if tree[id].dependencies.iter().any(|dep| dep.same(context)) {
            tree[id].lanes |= render_lanes;
            if let Some(alt) = tree[id].alternate {
                if let Some(alternate) = tree.get_mut(alt) {
                    alternate.lanes |= render_lanes;
                }
            }
            let parent = tree[id].return_fiber;
            schedule_context_work_on_parent_path(tree, parent, render_lanes, wip);
        }

        let nested_provider = matches!(
            &tree[id].element_type,
            Some(ElementType::Provider(other)) if other.same(context)
        );
        let child = if nested_provider { None } else { tree[id].child };
        let next = match child {
            Some(child) => {
                tree[child].return_fiber = Some(id);
                Some(child)
            }
            None => next_sibling_within(tree, id, wip),
        };
        fiber = next;
    }
}

/// Next fiber in a pre-order walk that stays below `root`.
fn next_sibling_within(
    tree: &mut FiberTree,
    from: FiberId,
    root: FiberId,
) -> Option<FiberId> {
    let mut node = from;
    loop {
        if node == root {
            return None;
        }
        if let Some(sibling) = tree[node].sibling {
            tree[sibling].return_fiber = tree[node].return_fiber;
            return Some(sibling);
        }
        node = tree[node].return_fiber?;
    }
}

fn schedule_context_work_on_parent_path(
    tree: &mut FiberTree,
    parent: Option<FiberId>,
    render_lanes: Lanes,
    propagation_root: FiberId,
) {
    let mut node = parent;
    while let Some(id) = node {
        let Some(fiber) = tree.get_mut(id) else {
            break;
        };
        fiber.child_lanes |= render_lanes;
        let alternate = fiber.alternate;
        node = fiber.return_fiber;
        if let Some(alt) = alternate.and_then(|alt| tree.get_mut(alt)) {
            alt.child_lanes |= render_lanes;
        }
        if id == propagation_root {
            break;
        }
    }
}
