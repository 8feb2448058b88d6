//! The "complete" half of a unit of work.
//!
//! Creates host instances for new host fibers, diffs props of updated ones,
//! closes providers and bubbles flags and lanes to the parent.

use std::rc::Rc;

use super::element::{ElementType, Props, Value};
use super::fiber::{FiberId, FiberTree, StateNode, UpdateQueue, WorkTag};
use super::flags::Flags;
use super::lane::NO_LANES;
use super::work_loop::WorkCx;
use super::ReconcilerError;
use crate::host::{HostConfig, HostNode, HostResult, PropUpdate};

/// Outcome of comparing two prop sets of one host element.
#[derive(Debug, Default)]
pub(crate) struct PropDiff {
    pub updates: Vec<PropUpdate>,
    pub listeners_changed: bool,
}

impl PropDiff {
    #[inline]
    pub fn has_changes(&self) -> bool {
        self.listeners_changed || !self.updates.is_empty()
    }
}

#[inline]
fn is_host_attr(value: &Value) -> bool {
    !value.is_null() && value.as_listener().is_none()
}

/// Property changes needed to turn `prev` into `next`.
///
/// Listener changes are reported but never turned into host operations.
pub(crate) fn diff_properties(
    host: &dyn HostConfig,
    ty: &str,
    prev: &Props,
    next: &Props,
) -> PropDiff {
    let mut diff = PropDiff::default();
    for (name, value) in prev.attrs() {
        if next.get(name).is_some() {
            continue;
        }
        if value.as_listener().is_some() {
            diff.listeners_changed = true;
        } else if is_host_attr(value) {
            diff.updates.push(PropUpdate::Remove(name.clone()));
        }
    }
    for (name, value) in next.attrs() {
        let previous = prev.get(name);
        if previous.is_some_and(|p| p.is_same(value)) {
            continue;
        }
        if value.as_listener().is_some() || previous.is_some_and(|p| p.as_listener().is_some()) {
            diff.listeners_changed = true;
        }
        if is_host_attr(value) {
            diff.updates.push(PropUpdate::Set(name.clone(), value.clone()));
        } else if previous.is_some_and(is_host_attr) {
            diff.updates.push(PropUpdate::Remove(name.clone()));
        }
    }

    let text_of = |props: &Props| {
        if host.should_set_text_content(ty, props) {
            props.children().as_text().cloned()
        } else {
            None
        }
    };
    if let Some(next_text) = text_of(next) {
        if text_of(prev).as_deref() != Some(&*next_text) {
            diff.updates.push(PropUpdate::TextContent(next_text));
        }
    }
    diff
}

/// Complete `wip` after all of its children completed.
pub(crate) fn complete_work(
    cx: &WorkCx<'_>,
    wip: FiberId,
) -> Result<(), ReconcilerError> {
    let host = cx.reconciler.host();
    let mut tree = cx.root.tree_mut();
    let fiber = &tree[wip];
    let current = fiber.alternate;
    let existing = fiber.state_node.host();

    match fiber.tag {
        WorkTag::HostComponent => {
            let ty = fiber.host_type().unwrap_or_default().to_string();
            let props = fiber.pending_props.element().cloned().unwrap_or_default();
            match (current, existing) {
                (Some(current), Some(_)) => {
                    let previous = tree[current].memoized_props.element().cloned().unwrap_or_default();
                    if !Rc::ptr_eq(&previous, &props) {
                        let diff = diff_properties(host, &ty, &previous, &props);
                        if diff.has_changes() {
                            let fiber = &mut tree[wip];
                            fiber.update_queue = UpdateQueue::Host(diff.updates);
                            fiber.flags |= Flags::UPDATE;
                        }
                    }
                }
                _ => {
                    let node = host.create_instance(&ty, &props)?;
                    for (name, value) in props.attrs() {
                        if is_host_attr(value) {
                            host.set_property(node, name, value)?;
                        }
                    }
                    if host.should_set_text_content(&ty, &props) {
                        if let Some(text) = props.children().as_text() {
                            host.set_text_content(node, text)?;
                        }
                    }
                    append_all_children(host, &tree, node, wip)?;
                    tree[wip].state_node = StateNode::Host(node);
                    cx.root.precache_instance(node, wip, Some(props));
                }
            }
        }
        WorkTag::HostText => {
            let text = fiber.pending_props.text().cloned().unwrap_or_else(|| Rc::from(""));
            match (current, existing) {
                (Some(current), Some(_)) => {
                    let changed = tree[current].memoized_props.text().map_or(true, |old| **old != *text);
                    if changed {
                        tree[wip].flags |= Flags::UPDATE;
                    }
                }
                _ => {
                    let node = host.create_text_instance(&text)?;
                    tree[wip].state_node = StateNode::Host(node);
                    cx.root.precache_instance(node, wip, None);
                }
            }
        }
        WorkTag::ContextProvider => {
            if let Some(ElementType::Provider(context)) = &fiber.element_type {
                cx.reconciler.contexts().borrow_mut().pop_provider(context);
            }
        }
        WorkTag::HostRoot
        | WorkTag::FunctionComponent
        | WorkTag::ClassComponent
        | WorkTag::Fragment
        | WorkTag::ContextConsumer
        | WorkTag::Memo => {}
    }

    bubble_properties(&mut tree, wip);
    Ok(())
}

/// Attach the top-level host nodes below `wip` to `parent`.
fn append_all_children(
    host: &dyn HostConfig,
    tree: &FiberTree,
    parent: HostNode,
    wip: FiberId,
) -> HostResult<()> {
    let mut node = tree[wip].child;
    while let Some(id) = node {
        let fiber = &tree[id];
        if fiber.tag.is_host() {
            if let Some(child) = fiber.state_node.host() {
                host.append_child(parent, child)?;
            }
        } else if let Some(child) = fiber.child {
            node = Some(child);
            continue;
        }

        let mut cursor = id;
        loop {
            if cursor == wip {
                return Ok(());
            }
            if let Some(sibling) = tree[cursor].sibling {
                node = Some(sibling);
                break;
            }
            match tree[cursor].return_fiber {
                Some(parent_fiber) if parent_fiber != wip => cursor = parent_fiber,
                _ => return Ok(()),
            }
        }
    }
    Ok(())
}

/// Fold children's flags into `subtree_flags` and their lanes into
/// `child_lanes`.
fn bubble_properties(
    tree: &mut FiberTree,
    wip: FiberId,
) {
    let mut subtree_flags = Flags::empty();
    let mut child_lanes = NO_LANES;
    let mut child = tree[wip].child;
    while let Some(id) = child {
        let fiber = &mut tree[id];
        child_lanes |= fiber.lanes | fiber.child_lanes;
        subtree_flags |= fiber.subtree_flags | fiber.flags;
        fiber.return_fiber = Some(wip);
        child = fiber.sibling;
    }
    let fiber = &mut tree[wip];
    fiber.subtree_flags |= subtree_flags;
    fiber.child_lanes = child_lanes;
}
