//! Render loop.
//!
//! A render walks the work-in-progress tree depth first: `begin_work` on the
//! way down, `complete_work` on the way up. The walk is resumable; its
//! position lives in a [`RenderSession`] on the reconciler, so a time-sliced
//! render picks up where the previous slice stopped. A session for other
//! lanes, or for another root, is thrown away and restarted.

use std::rc::Weak;

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use super::begin::begin_work;
use super::commit::{commit_root, flush_passive_effects};
use super::complete::complete_work;
use super::element::Node;
use super::fiber::{FiberId, FiberProps};
use super::lane::{get_next_lanes, lanes_to_scheduler_priority, Lane, Lanes, NO_LANE, NO_LANES};
use super::root::{Root, RootInner};
use super::{Reconciler, ReconcilerError};
use crate::scheduler::{BoxError, Continuation};

bitflags! {
    /// What the reconciler is doing right now.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct ExecutionContext: u8 {
        const RENDER = 0b01;
        const COMMIT = 0b10;
    }
}

/// Borrowed state shared by begin and complete.
pub(crate) struct WorkCx<'a> {
    pub reconciler: &'a Reconciler,
    pub root: &'a Root,
    pub render_lanes: Lanes,
}

/// Position of an unfinished render.
pub(crate) struct RenderSession {
    root: Weak<RootInner>,
    lanes: Lanes,
    wip_root: FiberId,
    next_unit: Option<FiberId>,
    /// Context stack depth when the render started.
    context_depth: usize,
}

impl RenderSession {
    fn is_for(
        &self,
        root: &Root,
    ) -> bool {
        Weak::ptr_eq(&self.root, &root.downgrade())
    }
}

/// Restores the execution context when a phase ends, including by error.
struct ContextGuard<'a> {
    reconciler: &'a Reconciler,
    previous: ExecutionContext,
}

impl<'a> ContextGuard<'a> {
    fn enter(
        reconciler: &'a Reconciler,
        phase: ExecutionContext,
    ) -> Self {
        let previous = reconciler.inner.execution_context.get();
        reconciler.inner.execution_context.set(previous | phase);
        Self {
            reconciler,
            previous,
        }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.reconciler.inner.execution_context.set(self.previous);
    }
}

enum RenderStatus {
    Yielded,
    Completed(FiberId),
}

/// Scheduler callback that renders `root`.
fn root_task(weak: Weak<RootInner>) -> impl FnOnce(bool) -> Result<Continuation, BoxError> {
    move |did_timeout| {
        let Some(root) = Root::from_weak(&weak) else {
            return Ok(Continuation::Done);
        };
        let reconciler = root.reconciler().clone();
        perform_work_on_root(&reconciler, &root, did_timeout).map_err(BoxError::from)
    }
}

/// Render and, when finished, commit the next lanes of `root`.
///
/// Returns a continuation while the root's task is still the one running.
pub(crate) fn perform_work_on_root(
    reconciler: &Reconciler,
    root: &Root,
    did_timeout: bool,
) -> Result<Continuation, ReconcilerError> {
    let original = root.callback_node();
    if flush_passive_effects(root) && !same_task(&root.callback_node(), &original) {
        return Ok(Continuation::Done);
    }

    let lanes = get_next_lanes(root.pending_lanes(), wip_lanes_for(reconciler, root));
    if lanes.is_empty() {
        root.set_callback(None, NO_LANE);
        return Ok(Continuation::Done);
    }

    let time_slice = !lanes.includes_sync() && !did_timeout;
    let status = match render_root(reconciler, root, lanes, time_slice) {
        Ok(status) => status,
        Err(error) => {
            warn!("render of lanes {:#b} failed: {}", lanes.bits(), error);
            abandon_session(reconciler);
            root.set_callback(None, NO_LANE);
            return Err(error);
        }
    };

    if let RenderStatus::Completed(finished) = status {
        let _guard = ContextGuard::enter(reconciler, ExecutionContext::COMMIT);
        if let Err(error) = commit_root(reconciler, root, finished, lanes) {
            root.set_callback(None, NO_LANE);
            return Err(error);
        }
    }

    ensure_root_is_scheduled(reconciler, root);
    if original.is_some() && same_task(&root.callback_node(), &original) {
        let weak = root.downgrade();
        return Ok(Continuation::then(root_task(weak)));
    }
    Ok(Continuation::Done)
}

fn same_task(
    a: &Option<crate::scheduler::TaskHandle>,
    b: &Option<crate::scheduler::TaskHandle>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same(b),
        (None, None) => true,
        _ => false,
    }
}

fn wip_lanes_for(
    reconciler: &Reconciler,
    root: &Root,
) -> Lanes {
    match &*reconciler.inner.session.borrow() {
        Some(session) if session.is_for(root) => session.lanes,
        _ => NO_LANES,
    }
}

fn render_root(
    reconciler: &Reconciler,
    root: &Root,
    lanes: Lanes,
    time_slice: bool,
) -> Result<RenderStatus, ReconcilerError> {
    let resumable = matches!(
        &*reconciler.inner.session.borrow(),
        Some(session) if session.is_for(root) && session.lanes == lanes
    );
    if !resumable {
        prepare_fresh_stack(reconciler, root, lanes);
    }

    let _guard = ContextGuard::enter(reconciler, ExecutionContext::RENDER);
    let cx = WorkCx {
        reconciler,
        root,
        render_lanes: lanes,
    };
    loop {
        let next = reconciler
            .inner
            .session
            .borrow()
            .as_ref()
            .and_then(|session| session.next_unit);
        let Some(unit) = next else {
            break;
        };
        if time_slice && reconciler.scheduler().should_yield() {
            trace!("render of lanes {:#b} yielded", lanes.bits());
            return Ok(RenderStatus::Yielded);
        }
        let next = perform_unit_of_work(&cx, unit)?;
        if let Some(session) = reconciler.inner.session.borrow_mut().as_mut() {
            session.next_unit = next;
        }
    }

    let session = reconciler.inner.session.borrow_mut().take();
    let Some(session) = session else {
        return Err(ReconcilerError::MissingFiber);
    };
    let depth = reconciler.contexts().borrow().depth();
    debug_assert_eq!(depth, session.context_depth, "unbalanced providers");
    Ok(RenderStatus::Completed(session.wip_root))
}

/// Drop any unfinished render and start one for `lanes` from the root.
fn prepare_fresh_stack(
    reconciler: &Reconciler,
    root: &Root,
    lanes: Lanes,
) {
    abandon_session(reconciler);

    let wip_root = {
        let mut tree = root.tree_mut();
        for (fiber, lane) in root.take_staged() {
            if !tree.mark_update_lane_from_fiber_to_root(fiber, lane) {
                trace!("dropped update for released fiber {:?}", fiber);
            }
        }
        let current = tree.current();
        tree.create_work_in_progress(current, FiberProps::None)
    };
    let context_depth = reconciler.contexts().borrow().depth();
    *reconciler.inner.session.borrow_mut() = Some(RenderSession {
        root: root.downgrade(),
        lanes,
        wip_root,
        next_unit: Some(wip_root),
        context_depth,
    });
    trace!("fresh render stack for lanes {:#b}", lanes.bits());
}

/// Throw away the current session: restore context values and release
/// fibers only the abandoned tree referenced.
pub(crate) fn abandon_session(reconciler: &Reconciler) {
    let Some(session) = reconciler.inner.session.borrow_mut().take() else {
        return;
    };
    reconciler.contexts().borrow_mut().unwind_to(session.context_depth);
    if let Some(root) = Root::from_weak(&session.root) {
        let released = root.tree_mut().collect_garbage();
        root.prune_instances();
        debug!(
            "abandoned render of lanes {:#b}, released {} fibers",
            session.lanes.bits(),
            released
        );
    }
}

fn perform_unit_of_work(
    cx: &WorkCx<'_>,
    unit: FiberId,
) -> Result<Option<FiberId>, ReconcilerError> {
    let next = begin_work(cx, unit)?;
    {
        let mut tree = cx.root.tree_mut();
        let fiber = &mut tree[unit];
        fiber.memoized_props = fiber.pending_props.clone();
    }
    match next {
        Some(child) => Ok(Some(child)),
        None => complete_unit_of_work(cx, unit),
    }
}

fn complete_unit_of_work(
    cx: &WorkCx<'_>,
    unit: FiberId,
) -> Result<Option<FiberId>, ReconcilerError> {
    let mut completed = unit;
    loop {
        complete_work(cx, completed)?;
        let tree = cx.root.tree();
        let fiber = &tree[completed];
        if let Some(sibling) = fiber.sibling {
            return Ok(Some(sibling));
        }
        match fiber.return_fiber {
            Some(parent) => completed = parent,
            None => return Ok(None),
        }
    }
}

/// Make sure exactly one task at the right priority will render `root`.
pub(crate) fn ensure_root_is_scheduled(
    reconciler: &Reconciler,
    root: &Root,
) {
    let scheduler = reconciler.scheduler();
    let next_lanes = get_next_lanes(root.pending_lanes(), wip_lanes_for(reconciler, root));
    let existing = root.callback_node();

    if next_lanes.is_empty() {
        if let Some(handle) = existing {
            scheduler.cancel_callback(&handle);
        }
        root.set_callback(None, NO_LANE);
        return;
    }

    let priority = next_lanes.highest_priority_lane();
    if existing.is_some() && root.callback_priority() == priority {
        return;
    }
    if let Some(handle) = existing {
        scheduler.cancel_callback(&handle);
    }
    let handle = scheduler.schedule_callback(lanes_to_scheduler_priority(priority), root_task(root.downgrade()));
    trace!("scheduled {} for lane {:#b}", handle.id(), priority.bits());
    root.set_callback(Some(handle), priority);
}

/// Record an update of `lane` on `fiber` and schedule the root.
///
/// Updates raised during a render are staged and applied when the next
/// render starts.
pub(crate) fn schedule_update_on_fiber(
    reconciler: &Reconciler,
    root: &Root,
    fiber: FiberId,
    lane: Lane,
) {
    let event_time = reconciler.scheduler().now();
    if reconciler.inner.execution_context.get().contains(ExecutionContext::RENDER) {
        root.stage_update(fiber, lane);
    } else if !root.tree_mut().mark_update_lane_from_fiber_to_root(fiber, lane) {
        trace!("ignored update for released fiber {:?}", fiber);
        return;
    }
    root.mark_updated(lane, event_time);
    ensure_root_is_scheduled(reconciler, root);
}

/// Render `element` into `root`.
pub(crate) fn update_container(
    reconciler: &Reconciler,
    element: Node,
    root: &Root,
) -> Result<Lane, ReconcilerError> {
    if reconciler.is_rendering() {
        return Err(ReconcilerError::RenderInProgress);
    }
    let lane = reconciler.request_update_lane();
    root.set_element(element);
    let current = root.current();
    schedule_update_on_fiber(reconciler, root, current, lane);
    Ok(lane)
}
