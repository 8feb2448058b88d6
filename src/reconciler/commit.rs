//! Commit: apply a finished tree to the host.
//!
//! The mutation walk visits only fibers whose own or subtree flags are set,
//! children before parents. Once the walk is done the finished tree becomes
//! current, layout effects run, and passive effects are handed to a
//! normal-priority flush task.

use std::rc::Rc;

use tracing::debug;

use super::fiber::{FiberId, FiberTree, UpdateQueue, WorkTag};
use super::flags::Flags;
use super::hooks::{Cleanup, Effect};
use super::lane::Lanes;
use super::root::{CommitStats, PendingPassive, Root};
use super::{Reconciler, ReconcilerError};
use crate::host::{apply_prop_update, HostConfig, HostNode};
use crate::scheduler::{Continuation, PriorityLevel};

struct Committer<'a> {
    host: &'a dyn HostConfig,
    root: &'a Root,
    tree: &'a mut FiberTree,
    stats: CommitStats,
    layout_unmounts: Vec<Cleanup>,
    layout_effects: Vec<Rc<Effect>>,
    passive: PendingPassive,
    freed: Vec<FiberId>,
}

impl Committer<'_> {
    fn commit_mutation_effects(
        &mut self,
        id: FiberId,
    ) -> Result<(), ReconcilerError> {
        let fiber = &self.tree[id];
        let flags = fiber.flags;
        if (flags | fiber.subtree_flags).is_empty() {
            return Ok(());
        }

        if flags.contains(Flags::CONTENT_RESET) {
            if let Some(node) = fiber.state_node.host() {
                self.host.set_text_content(node, "")?;
            }
        }
        if !fiber.subtree_flags.is_empty() {
            for child in self.tree.children(id) {
                self.commit_mutation_effects(child)?;
            }
        }
        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(id)?;
            self.stats.placements += 1;
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = std::mem::take(&mut self.tree[id].deletions);
            for deleted in deletions {
                self.commit_deletion(id, deleted)?;
                self.stats.deletions += 1;
            }
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(id)?;
        }
        if flags.contains(Flags::PASSIVE) {
            if let UpdateQueue::Effects(effects) = &self.tree[id].update_queue {
                self.passive
                    .effects
                    .extend(effects.iter().filter(|e| e.has_effect() && e.is_passive()).cloned());
            }
        }

        let fiber = &mut self.tree[id];
        fiber.flags = Flags::empty();
        fiber.subtree_flags = Flags::empty();
        Ok(())
    }

    fn host_node_of(
        &self,
        parent: FiberId,
    ) -> Result<HostNode, ReconcilerError> {
        let fiber = &self.tree[parent];
        match fiber.tag {
            WorkTag::HostRoot => Ok(self.root.container()),
            _ => fiber
                .state_node
                .host()
                .ok_or_else(|| ReconcilerError::MissingHostParent(fiber.name())),
        }
    }

    fn commit_placement(
        &mut self,
        id: FiberId,
    ) -> Result<(), ReconcilerError> {
        let parent = self
            .tree
            .host_parent_fiber(id)
            .ok_or_else(|| ReconcilerError::MissingHostParent(self.tree[id].name()))?;
        let parent_node = self.host_node_of(parent)?;
        let before = self.host_sibling(id);
        self.insert_or_append(id, before, parent_node)
    }

    /// First host node after `id` in document order that is already in
    /// place, skipping fibers that are themselves being placed.
    fn host_sibling(
        &self,
        id: FiberId,
    ) -> Option<HostNode> {
        let tree = &*self.tree;
        let mut node = id;
        'siblings: loop {
            while tree[node].sibling.is_none() {
                match tree[node].return_fiber {
                    Some(parent) if !tree[parent].tag.is_host_parent() => node = parent,
                    _ => return None,
                }
            }
            node = tree[node].sibling?;
            while !tree[node].tag.is_host() {
                if tree[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match tree[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            if !tree[node].flags.contains(Flags::PLACEMENT) {
                return tree[node].state_node.host();
            }
        }
    }

    fn insert_or_append(
        &self,
        id: FiberId,
        before: Option<HostNode>,
        parent: HostNode,
    ) -> Result<(), ReconcilerError> {
        let fiber = &self.tree[id];
        if fiber.tag.is_host() {
            if let Some(node) = fiber.state_node.host() {
                match before {
                    Some(before) => self.host.insert_before(parent, node, before)?,
                    None => self.host.append_child(parent, node)?,
                }
            }
            return Ok(());
        }
        let mut child = fiber.child;
        while let Some(c) = child {
            self.insert_or_append(c, before, parent)?;
            child = self.tree[c].sibling;
        }
        Ok(())
    }

    fn commit_deletion(
        &mut self,
        parent: FiberId,
        deleted: FiberId,
    ) -> Result<(), ReconcilerError> {
        let host_parent = if self.tree[parent].tag.is_host_parent() {
            parent
        } else {
            self.tree
                .host_parent_fiber(parent)
                .ok_or_else(|| ReconcilerError::MissingHostParent(self.tree[parent].name()))?
        };
        let parent_node = self.host_node_of(host_parent)?;
        self.unmount_subtree(deleted, Some(parent_node))
    }

    /// Detach host nodes and collect effect cleanups below `id`.
    ///
    /// Only the topmost host nodes are removed from `remove_from`; their
    /// descendants go with them.
    fn unmount_subtree(
        &mut self,
        id: FiberId,
        remove_from: Option<HostNode>,
    ) -> Result<(), ReconcilerError> {
        let fiber = &self.tree[id];
        let mut child_parent = remove_from;
        match fiber.tag {
            WorkTag::HostComponent | WorkTag::HostText => {
                if let Some(node) = fiber.state_node.host() {
                    if let Some(parent) = remove_from {
                        self.host.remove_child(parent, node)?;
                    }
                    self.root.forget_instance(node);
                }
                child_parent = None;
            }
            WorkTag::FunctionComponent | WorkTag::Memo => {
                if let UpdateQueue::Effects(effects) = &fiber.update_queue {
                    for effect in effects {
                        let Some(destroy) = effect.take_destroy() else {
                            continue;
                        };
                        if effect.is_layout() {
                            self.layout_unmounts.push(destroy);
                        } else {
                            self.passive.unmounts.push(destroy);
                        }
                    }
                }
            }
            WorkTag::ClassComponent => {
                let alternate = fiber.alternate;
                self.tree[id].update_queue = UpdateQueue::None;
                if let Some(alt) = alternate.filter(|alt| self.tree.contains(*alt)) {
                    self.tree[alt].update_queue = UpdateQueue::None;
                }
            }
            _ => {}
        }

        for child in self.tree.children(id) {
            self.unmount_subtree(child, child_parent)?;
        }

        self.freed.push(id);
        if let Some(alt) = self.tree[id].alternate {
            self.freed.push(alt);
        }
        Ok(())
    }

    fn commit_update(
        &mut self,
        id: FiberId,
    ) -> Result<(), ReconcilerError> {
        let fiber = &mut self.tree[id];
        match fiber.tag {
            WorkTag::HostComponent => {
                let Some(node) = fiber.state_node.host() else {
                    return Ok(());
                };
                if let UpdateQueue::Host(updates) = std::mem::take(&mut fiber.update_queue) {
                    for update in &updates {
                        apply_prop_update(self.host, node, update)?;
                    }
                }
                let props = fiber.memoized_props.element().cloned();
                self.root.precache_instance(node, id, props);
                self.stats.updates += 1;
            }
            WorkTag::HostText => {
                let Some(node) = fiber.state_node.host() else {
                    return Ok(());
                };
                let text = fiber.memoized_props.text().cloned().unwrap_or_else(|| Rc::from(""));
                self.host.commit_text_update(node, &text)?;
                self.stats.updates += 1;
            }
            WorkTag::FunctionComponent | WorkTag::Memo => {
                if let UpdateQueue::Effects(effects) = &fiber.update_queue {
                    self.layout_effects
                        .extend(effects.iter().filter(|e| e.has_effect() && e.is_layout()).cloned());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Commit the finished tree rooted at `finished` for `lanes`.
pub(crate) fn commit_root(
    reconciler: &Reconciler,
    root: &Root,
    finished: FiberId,
    lanes: Lanes,
) -> Result<CommitStats, ReconcilerError> {
    let host = reconciler.host();
    let (mut stats, layout_unmounts, layout_effects, passive) = {
        let mut tree = root.tree_mut();
        let mut committer = Committer {
            host,
            root,
            tree: &mut *tree,
            stats: CommitStats {
                lanes,
                ..CommitStats::default()
            },
            layout_unmounts: Vec::new(),
            layout_effects: Vec::new(),
            passive: PendingPassive::default(),
            freed: Vec::new(),
        };
        committer.commit_mutation_effects(finished)?;
        let Committer {
            stats,
            layout_unmounts,
            layout_effects,
            passive,
            freed,
            ..
        } = committer;

        for id in freed {
            tree.remove(id);
        }
        tree.set_current(finished);
        let remaining = tree[finished].lanes | tree[finished].child_lanes | root.staged_lanes();
        root.mark_finished(remaining);
        (stats, layout_unmounts, layout_effects, passive)
    };

    for destroy in layout_unmounts {
        destroy();
    }
    for effect in &layout_effects {
        effect.destroy();
    }
    for effect in &layout_effects {
        effect.create();
    }
    stats.layout_effects = layout_effects.len();
    stats.passive_effects = passive.effects.len();

    if root.enqueue_passive(passive) {
        let weak = root.downgrade();
        reconciler
            .scheduler()
            .schedule_callback(PriorityLevel::Normal, move |_| {
                if let Some(root) = Root::from_weak(&weak) {
                    root.reconciler().flush_passive_effects(&root);
                }
                Ok(Continuation::Done)
            });
    }

    root.record_commit(stats);
    debug!(
        "commit #{} lanes={:#b} placements={} deletions={} updates={}",
        root.commit_count(),
        lanes.bits(),
        stats.placements,
        stats.deletions,
        stats.updates
    );
    Ok(stats)
}

/// Run queued passive effects: every cleanup first, then every create.
/// Returns `false` when nothing was queued.
pub(crate) fn flush_passive_effects(root: &Root) -> bool {
    let pending = root.take_passive();
    if pending.is_empty() {
        return false;
    }
    for destroy in pending.unmounts {
        destroy();
    }
    for effect in &pending.effects {
        effect.destroy();
    }
    for effect in &pending.effects {
        effect.create();
    }
    debug!("flushed {} passive effects", pending.effects.len());
    true
}
