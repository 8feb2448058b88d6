//! Child reconciliation.
//!
//! Diffs the new children of a fiber against the committed child list and
//! produces the work-in-progress child list, marking `PLACEMENT` for inserts
//! and moves and recording deletions on the parent. The move heuristic is a
//! single left-to-right pass: a reused child whose old index is below the
//! highest old index already kept in place is moved, everything else stays.

use std::rc::Rc;

use hashbrown::HashMap;

use super::element::{Element, ElementType, Key, Node};
use super::fiber::{element_props, FiberId, FiberProps, FiberTree, WorkTag};
use super::flags::Flags;
use super::lane::Lanes;

/// Key of an unclaimed old child in the map phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(Key),
    Index(usize),
}

/// Reconcile against an existing child list, tracking side effects.
pub(crate) fn reconcile_child_fibers(
    tree: &mut FiberTree,
    return_fiber: FiberId,
    current_first_child: Option<FiberId>,
    new_child: &Node,
    lanes: Lanes,
) -> Option<FiberId> {
    ChildReconciler {
        tree,
        should_track_side_effects: true,
        lanes,
    }
    .reconcile(return_fiber, current_first_child, new_child)
}

/// Build children of a fiber that has never been committed. No flags are
/// set; the host subtree is attached as a whole by its placed ancestor.
pub(crate) fn mount_child_fibers(
    tree: &mut FiberTree,
    return_fiber: FiberId,
    new_child: &Node,
    lanes: Lanes,
) -> Option<FiberId> {
    ChildReconciler {
        tree,
        should_track_side_effects: false,
        lanes,
    }
    .reconcile(return_fiber, None, new_child)
}

struct ChildReconciler<'t> {
    tree: &'t mut FiberTree,
    should_track_side_effects: bool,
    lanes: Lanes,
}

impl ChildReconciler<'_> {
    fn reconcile(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_child: &Node,
    ) -> Option<FiberId> {
        // An unkeyed top-level fragment is treated as its children.
        let unwrapped;
        let new_child = match new_child {
            Node::Element(el) if matches!(el.ty, ElementType::Fragment) && el.key.is_none() => {
                unwrapped = el.props.children().clone();
                &unwrapped
            }
            other => other,
        };

        match new_child {
            Node::Element(element) => {
                let fiber = self.reconcile_single_element(return_fiber, current_first_child, element);
                Some(self.place_single_child(fiber))
            }
            Node::Text(text) if !text.is_empty() => {
                let fiber = self.reconcile_single_text_node(return_fiber, current_first_child, text.clone());
                Some(self.place_single_child(fiber))
            }
            Node::List(children) => self.reconcile_children_array(return_fiber, current_first_child, children),
            _ => {
                self.delete_remaining_children(return_fiber, current_first_child);
                None
            }
        }
    }

    fn delete_child(
        &mut self,
        return_fiber: FiberId,
        child: FiberId,
    ) {
        if !self.should_track_side_effects {
            return;
        }
        let parent = &mut self.tree[return_fiber];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
    ) {
        if !self.should_track_side_effects {
            return;
        }
        let mut child = current_first_child;
        while let Some(id) = child {
            self.delete_child(return_fiber, id);
            child = self.tree[id].sibling;
        }
    }

    fn map_remaining_children(
        &self,
        current_first_child: Option<FiberId>,
    ) -> HashMap<ChildKey, FiberId> {
        let mut existing = HashMap::new();
        let mut child = current_first_child;
        while let Some(id) = child {
            let fiber = &self.tree[id];
            let key = match &fiber.key {
                Some(key) => ChildKey::Key(key.clone()),
                None => ChildKey::Index(fiber.index),
            };
            existing.insert(key, id);
            child = fiber.sibling;
        }
        existing
    }

    fn use_fiber(
        &mut self,
        fiber: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let clone = self.tree.create_work_in_progress(fiber, pending_props);
        let node = &mut self.tree[clone];
        node.index = 0;
        node.sibling = None;
        clone
    }

    fn place_child(
        &mut self,
        new_fiber: FiberId,
        last_placed_index: usize,
        new_index: usize,
    ) -> usize {
        self.tree[new_fiber].index = new_index;
        if !self.should_track_side_effects {
            return last_placed_index;
        }
        match self.tree[new_fiber].alternate {
            Some(current) => {
                let old_index = self.tree[current].index;
                if old_index < last_placed_index {
                    self.tree[new_fiber].flags |= Flags::PLACEMENT;
                    last_placed_index
                } else {
                    old_index
                }
            }
            None => {
                self.tree[new_fiber].flags |= Flags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn place_single_child(
        &mut self,
        new_fiber: FiberId,
    ) -> FiberId {
        if self.should_track_side_effects && self.tree[new_fiber].alternate.is_none() {
            self.tree[new_fiber].flags |= Flags::PLACEMENT;
        }
        new_fiber
    }

    fn attach(
        &mut self,
        fiber: FiberId,
        return_fiber: FiberId,
    ) -> FiberId {
        self.tree[fiber].return_fiber = Some(return_fiber);
        fiber
    }

    fn update_text_node(
        &mut self,
        return_fiber: FiberId,
        current: Option<FiberId>,
        text: Rc<str>,
    ) -> FiberId {
        let fiber = match current {
            Some(current) if self.tree[current].tag == WorkTag::HostText => {
                self.use_fiber(current, FiberProps::Text(text))
            }
            _ => self.tree.create_fiber_from_text(text, self.lanes),
        };
        self.attach(fiber, return_fiber)
    }

    fn update_element(
        &mut self,
        return_fiber: FiberId,
        current: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        if matches!(element.ty, ElementType::Fragment) {
            return self.update_fragment(
                return_fiber,
                current,
                element.props.children().clone(),
                element.key.clone(),
            );
        }
        let fiber = match current {
            Some(current) if self.same_type(current, element) => self.use_fiber(current, element_props(element)),
            _ => self.tree.create_fiber_from_element(element, self.lanes),
        };
        self.attach(fiber, return_fiber)
    }

    fn update_fragment(
        &mut self,
        return_fiber: FiberId,
        current: Option<FiberId>,
        children: Node,
        key: Option<Key>,
    ) -> FiberId {
        let fiber = match current {
            Some(current) if self.tree[current].tag == WorkTag::Fragment => {
                self.use_fiber(current, FiberProps::Children(children))
            }
            _ => self.tree.create_fiber_from_fragment(children, key, self.lanes),
        };
        self.attach(fiber, return_fiber)
    }

    fn same_type(
        &self,
        current: FiberId,
        element: &Element,
    ) -> bool {
        let fiber = &self.tree[current];
        match (&element.ty, &fiber.element_type) {
            (ElementType::Fragment, _) => fiber.tag == WorkTag::Fragment,
            (ty, Some(existing)) => ty.same(existing),
            (_, None) => false,
        }
    }

    fn create_child(
        &mut self,
        return_fiber: FiberId,
        new_child: &Node,
    ) -> Option<FiberId> {
        let fiber = match new_child {
            Node::Text(text) if !text.is_empty() => self.tree.create_fiber_from_text(text.clone(), self.lanes),
            Node::Element(element) if matches!(element.ty, ElementType::Fragment) => self
                .tree
                .create_fiber_from_fragment(element.props.children().clone(), element.key.clone(), self.lanes),
            Node::Element(element) => self.tree.create_fiber_from_element(element, self.lanes),
            Node::List(_) => self.tree.create_fiber_from_fragment(new_child.clone(), None, self.lanes),
            _ => return None,
        };
        Some(self.attach(fiber, return_fiber))
    }

    /// Reuse or replace `old_fiber` if `new_child` belongs in its slot.
    /// `None` means the keys differ.
    fn update_slot(
        &mut self,
        return_fiber: FiberId,
        old_fiber: Option<FiberId>,
        new_child: &Node,
    ) -> Option<FiberId> {
        let key = old_fiber.and_then(|id| self.tree[id].key.clone());
        match new_child {
            Node::Text(text) if !text.is_empty() => {
                if key.is_some() {
                    return None;
                }
                Some(self.update_text_node(return_fiber, old_fiber, text.clone()))
            }
            Node::Element(element) => {
                if element.key != key {
                    return None;
                }
                Some(self.update_element(return_fiber, old_fiber, element))
            }
            Node::List(_) => {
                if key.is_some() {
                    return None;
                }
                Some(self.update_fragment(return_fiber, old_fiber, new_child.clone(), None))
            }
            _ => None,
        }
    }

    fn update_from_map(
        &mut self,
        existing: &HashMap<ChildKey, FiberId>,
        return_fiber: FiberId,
        new_index: usize,
        new_child: &Node,
    ) -> Option<FiberId> {
        match new_child {
            Node::Text(text) if !text.is_empty() => {
                let matched = existing.get(&ChildKey::Index(new_index)).copied();
                Some(self.update_text_node(return_fiber, matched, text.clone()))
            }
            Node::Element(element) => {
                let key = match &element.key {
                    Some(key) => ChildKey::Key(key.clone()),
                    None => ChildKey::Index(new_index),
                };
                let matched = existing.get(&key).copied();
                Some(self.update_element(return_fiber, matched, element))
            }
            Node::List(_) => {
                let matched = existing.get(&ChildKey::Index(new_index)).copied();
                Some(self.update_fragment(return_fiber, matched, new_child.clone(), None))
            }
            _ => None,
        }
    }

    fn reconcile_children_array(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_children: &[Node],
    ) -> Option<FiberId> {
        let mut first_child: Option<FiberId> = None;
        let mut previous_new_fiber: Option<FiberId> = None;

        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Forward scan while slots line up.
        while let Some(old) = old_fiber {
            if new_index >= new_children.len() {
                break;
            }
            let (slot, next_old_fiber) = if self.tree[old].index > new_index {
                (None, Some(old))
            } else {
                (Some(old), self.tree[old].sibling)
            };
            let Some(new_fiber) = self.update_slot(return_fiber, slot, &new_children[new_index]) else {
                old_fiber = slot.or(next_old_fiber);
                break;
            };
            if let Some(slot) = slot {
                if self.tree[new_fiber].alternate.is_none() {
                    self.delete_child(return_fiber, slot);
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, new_index);
            self.link(&mut first_child, &mut previous_new_fiber, new_fiber);
            old_fiber = next_old_fiber;
            new_index += 1;
        }

        if new_index == new_children.len() {
            self.delete_remaining_children(return_fiber, old_fiber);
            return first_child;
        }

        if old_fiber.is_none() {
            for (index, child) in new_children.iter().enumerate().skip(new_index) {
                let Some(new_fiber) = self.create_child(return_fiber, child) else {
                    continue;
                };
                last_placed_index = self.place_child(new_fiber, last_placed_index, index);
                self.link(&mut first_child, &mut previous_new_fiber, new_fiber);
            }
            return first_child;
        }

        // Both sides have leftovers: match the rest by key or index.
        let mut existing = self.map_remaining_children(old_fiber);
        for (index, child) in new_children.iter().enumerate().skip(new_index) {
            let Some(new_fiber) = self.update_from_map(&existing, return_fiber, index, child) else {
                continue;
            };
            if self.should_track_side_effects && self.tree[new_fiber].alternate.is_some() {
                let key = match &self.tree[new_fiber].key {
                    Some(key) => ChildKey::Key(key.clone()),
                    None => ChildKey::Index(index),
                };
                existing.remove(&key);
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, index);
            self.link(&mut first_child, &mut previous_new_fiber, new_fiber);
        }

        if self.should_track_side_effects {
            let mut leftovers: Vec<FiberId> = existing.into_values().collect();
            leftovers.sort_by_key(|id| self.tree[*id].index);
            for old in leftovers {
                self.delete_child(return_fiber, old);
            }
        }
        first_child
    }

    fn link(
        &mut self,
        first_child: &mut Option<FiberId>,
        previous: &mut Option<FiberId>,
        fiber: FiberId,
    ) {
        match *previous {
            Some(prev) => self.tree[prev].sibling = Some(fiber),
            None => *first_child = Some(fiber),
        }
        *previous = Some(fiber);
    }

    fn reconcile_single_element(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let mut child = current_first_child;
        while let Some(id) = child {
            if self.tree[id].key == element.key {
                if self.same_type(id, element) {
                    let sibling = self.tree[id].sibling;
                    self.delete_remaining_children(return_fiber, sibling);
                    let existing = self.use_fiber(id, element_props(element));
                    return self.attach(existing, return_fiber);
                }
                self.delete_remaining_children(return_fiber, Some(id));
                break;
            }
            self.delete_child(return_fiber, id);
            child = self.tree[id].sibling;
        }

        let fiber = if matches!(element.ty, ElementType::Fragment) {
            self.tree
                .create_fiber_from_fragment(element.props.children().clone(), element.key.clone(), self.lanes)
        } else {
            self.tree.create_fiber_from_element(element, self.lanes)
        };
        self.attach(fiber, return_fiber)
    }

    fn reconcile_single_text_node(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        text: Rc<str>,
    ) -> FiberId {
        if let Some(current) = current_first_child {
            if self.tree[current].tag == WorkTag::HostText {
                let sibling = self.tree[current].sibling;
                self.delete_remaining_children(return_fiber, sibling);
                let existing = self.use_fiber(current, FiberProps::Text(text));
                return self.attach(existing, return_fiber);
            }
        }
        self.delete_remaining_children(return_fiber, current_first_child);
        let fiber = self.tree.create_fiber_from_text(text, self.lanes);
        self.attach(fiber, return_fiber)
    }
}
