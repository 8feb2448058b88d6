//! Root container.
//!
//! A [`Root`] ties one host container to its fiber tree, the element rendered
//! into it and the lanes of work still owed to it. Scheduler tasks and hook
//! dispatchers only hold a weak reference, so dropping the last `Root` handle
//! turns them into no-ops.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use serde::Serialize;

use super::element::{Node, Props};
use super::fiber::{FiberId, FiberTree};
use super::hooks::{Cleanup, Effect};
use super::lane::{Lane, Lanes, NO_LANE, NO_LANES, NO_TIMESTAMP, TOTAL_LANES};
use super::Reconciler;
use crate::host::HostNode;
use crate::scheduler::TaskHandle;

/// Counters of the most recent commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    /// Lanes that were committed.
    #[serde(serialize_with = "serialize_lanes")]
    pub lanes: Lanes,
    pub placements: usize,
    pub deletions: usize,
    pub updates: usize,
    pub layout_effects: usize,
    pub passive_effects: usize,
}

fn serialize_lanes<S: serde::Serializer>(
    lanes: &Lanes,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u32(lanes.bits())
}

/// Fiber and last committed props of a mounted host node.
#[derive(Clone)]
pub(crate) struct HostInstance {
    pub fiber: FiberId,
    pub props: Option<Rc<Props>>,
}

/// Passive effects waiting for their flush task.
#[derive(Default)]
pub(crate) struct PendingPassive {
    pub unmounts: Vec<Cleanup>,
    pub effects: Vec<Rc<Effect>>,
}

impl PendingPassive {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.unmounts.is_empty() && self.effects.is_empty()
    }

    pub fn append(
        &mut self,
        mut other: PendingPassive,
    ) {
        self.unmounts.append(&mut other.unmounts);
        self.effects.append(&mut other.effects);
    }
}

pub(crate) struct RootInner {
    reconciler: Reconciler,
    container: HostNode,
    tree: RefCell<FiberTree>,
    element: RefCell<Node>,
    pending_lanes: Cell<Lanes>,
    event_times: RefCell<[i64; TOTAL_LANES]>,
    /// Scheduler task that will render this root, if any.
    callback_node: RefCell<Option<TaskHandle>>,
    callback_priority: Cell<Lane>,
    /// Updates recorded while a render was running.
    staged: RefCell<Vec<(FiberId, Lane)>>,
    passive: RefCell<PendingPassive>,
    passive_scheduled: Cell<bool>,
    instances: RefCell<HashMap<HostNode, HostInstance>>,
    last_commit: Cell<CommitStats>,
    commit_count: Cell<u64>,
}

/// Handle to a root container. Clones share state.
#[derive(Clone)]
pub struct Root {
    inner: Rc<RootInner>,
}

impl Root {
    pub(crate) fn new(
        reconciler: Reconciler,
        container: HostNode,
    ) -> Self {
        Self {
            inner: Rc::new(RootInner {
                reconciler,
                container,
                tree: RefCell::new(FiberTree::new()),
                element: RefCell::new(Node::Empty),
                pending_lanes: Cell::new(NO_LANES),
                event_times: RefCell::new([NO_TIMESTAMP; TOTAL_LANES]),
                callback_node: RefCell::new(None),
                callback_priority: Cell::new(NO_LANE),
                staged: RefCell::new(Vec::new()),
                passive: RefCell::new(PendingPassive::default()),
                passive_scheduled: Cell::new(false),
                instances: RefCell::new(HashMap::new()),
                last_commit: Cell::new(CommitStats::default()),
                commit_count: Cell::new(0),
            }),
        }
    }

    pub(crate) fn from_weak(weak: &Weak<RootInner>) -> Option<Root> {
        weak.upgrade().map(|inner| Root { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<RootInner> {
        Rc::downgrade(&self.inner)
    }

    /// Reconciler that owns this root.
    #[inline]
    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    /// Host node the tree is rendered into.
    #[inline]
    pub fn container(&self) -> HostNode {
        self.inner.container
    }

    /// Committed host root fiber.
    pub fn current(&self) -> FiberId {
        self.inner.tree.borrow().current()
    }

    /// Lanes with uncommitted work.
    #[inline]
    pub fn pending_lanes(&self) -> Lanes {
        self.inner.pending_lanes.get()
    }

    /// Counters of the last commit.
    #[inline]
    pub fn last_commit(&self) -> CommitStats {
        self.inner.last_commit.get()
    }

    /// Number of commits so far.
    #[inline]
    pub fn commit_count(&self) -> u64 {
        self.inner.commit_count.get()
    }

    /// Whether a render task is scheduled for this root.
    pub fn has_scheduled_work(&self) -> bool {
        self.inner
            .callback_node
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_cancelled())
    }

    /// Whether a passive-effect flush is pending.
    pub fn has_pending_passive_effects(&self) -> bool {
        !self.inner.passive.borrow().is_empty()
    }

    /// Inspect the fiber tree. Must not be called from inside a render.
    pub fn with_tree<R>(
        &self,
        f: impl FnOnce(&FiberTree) -> R,
    ) -> R {
        f(&self.inner.tree.borrow())
    }

    /// Fiber that owns `node`.
    pub fn fiber_of(
        &self,
        node: HostNode,
    ) -> Option<FiberId> {
        self.inner.instances.borrow().get(&node).map(|i| i.fiber)
    }

    /// Timestamp of the oldest pending update in `lane`.
    pub fn event_time(
        &self,
        lane: Lane,
    ) -> i64 {
        if lane.is_empty() {
            return NO_TIMESTAMP;
        }
        self.inner.event_times.borrow()[lane.index()]
    }

    pub(crate) fn tree(&self) -> Ref<'_, FiberTree> {
        self.inner.tree.borrow()
    }

    pub(crate) fn tree_mut(&self) -> RefMut<'_, FiberTree> {
        self.inner.tree.borrow_mut()
    }

    pub(crate) fn element(&self) -> Node {
        self.inner.element.borrow().clone()
    }

    pub(crate) fn set_element(
        &self,
        element: Node,
    ) {
        *self.inner.element.borrow_mut() = element;
    }

    /// Add `lane` to the pending set.
    pub(crate) fn mark_updated(
        &self,
        lane: Lane,
        event_time: i64,
    ) {
        self.inner.pending_lanes.set(self.pending_lanes() | lane);
        let mut times = self.inner.event_times.borrow_mut();
        let slot = &mut times[lane.highest_priority_lane().index()];
        if *slot == NO_TIMESTAMP {
            *slot = event_time;
        }
    }

    /// Narrow the pending set to `remaining` after a commit.
    pub(crate) fn mark_finished(
        &self,
        remaining: Lanes,
    ) {
        let finished = self.pending_lanes() - remaining;
        self.inner.pending_lanes.set(remaining);
        let mut times = self.inner.event_times.borrow_mut();
        for (index, slot) in times.iter_mut().enumerate() {
            if finished.bits() & (1 << index) != 0 {
                *slot = NO_TIMESTAMP;
            }
        }
    }

    pub(crate) fn stage_update(
        &self,
        fiber: FiberId,
        lane: Lane,
    ) {
        self.inner.staged.borrow_mut().push((fiber, lane));
    }

    pub(crate) fn take_staged(&self) -> Vec<(FiberId, Lane)> {
        std::mem::take(&mut *self.inner.staged.borrow_mut())
    }

    pub(crate) fn staged_lanes(&self) -> Lanes {
        self.inner
            .staged
            .borrow()
            .iter()
            .fold(NO_LANES, |lanes, (_, lane)| lanes | *lane)
    }

    pub(crate) fn callback_node(&self) -> Option<TaskHandle> {
        self.inner.callback_node.borrow().clone()
    }

    pub(crate) fn callback_priority(&self) -> Lane {
        self.inner.callback_priority.get()
    }

    pub(crate) fn set_callback(
        &self,
        handle: Option<TaskHandle>,
        priority: Lane,
    ) {
        *self.inner.callback_node.borrow_mut() = handle;
        self.inner.callback_priority.set(priority);
    }

    pub(crate) fn precache_instance(
        &self,
        node: HostNode,
        fiber: FiberId,
        props: Option<Rc<Props>>,
    ) {
        self.inner
            .instances
            .borrow_mut()
            .insert(node, HostInstance { fiber, props });
    }

    pub(crate) fn instance(
        &self,
        node: HostNode,
    ) -> Option<HostInstance> {
        self.inner.instances.borrow().get(&node).cloned()
    }

    pub(crate) fn forget_instance(
        &self,
        node: HostNode,
    ) {
        self.inner.instances.borrow_mut().remove(&node);
    }

    /// Drop instance entries whose fiber no longer exists.
    pub(crate) fn prune_instances(&self) {
        let tree = self.inner.tree.borrow();
        self.inner
            .instances
            .borrow_mut()
            .retain(|_, instance| tree.contains(instance.fiber));
    }

    /// Queue passive effects. Returns `true` if no flush was scheduled yet.
    pub(crate) fn enqueue_passive(
        &self,
        effects: PendingPassive,
    ) -> bool {
        if effects.is_empty() {
            return false;
        }
        self.inner.passive.borrow_mut().append(effects);
        !self.inner.passive_scheduled.replace(true)
    }

    pub(crate) fn take_passive(&self) -> PendingPassive {
        self.inner.passive_scheduled.set(false);
        std::mem::take(&mut *self.inner.passive.borrow_mut())
    }

    pub(crate) fn record_commit(
        &self,
        stats: CommitStats,
    ) {
        self.inner.last_commit.set(stats);
        self.inner.commit_count.set(self.commit_count() + 1);
    }

    /// Whether both handles refer to the same root.
    #[inline]
    pub fn same(
        &self,
        other: &Root,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Root {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Root")
            .field("container", &self.inner.container)
            .field("pending_lanes", &self.pending_lanes())
            .field("commits", &self.commit_count())
            .finish()
    }
}
