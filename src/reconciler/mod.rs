//! Fiber reconciler.
//!
//! Turns element trees into host mutations. Work is split into units, one
//! per fiber, so a render can be sliced across scheduler tasks and thrown
//! away when more urgent work arrives. Only the commit touches the host.
//!
//! ```text
//!  update_container / dispatch / enqueue_update
//!        │  lane
//!        ▼
//!  schedule_update_on_fiber ──► ensure_root_is_scheduled ──► Scheduler task
//!                                                               │
//!        ┌──────────────────────────────────────────────────────┘
//!        ▼
//!  render: begin_work ↓ / complete_work ↑  ──►  commit_root ──► HostConfig
//! ```

pub mod class;
pub mod context;
pub mod element;
pub mod events;
pub mod fiber;
pub mod flags;
pub mod hooks;
pub mod lane;
pub mod root;

mod begin;
mod child;
mod commit;
mod complete;
mod work_loop;

pub use class::{ClassComponent, ClassInstance, ClassType, ClassUpdater};
pub use context::{read_context, Context};
pub use element::{Component, Element, ElementBuilder, ElementType, Key, Listener, MemoComponent, Node, Props, Value};
pub use events::{event_prop_name, event_priority, EventPriority};
pub use fiber::{Fiber, FiberId, FiberTree, WorkTag};
pub use flags::{Flags, HookFlags};
pub use hooks::{are_hook_inputs_equal, Cleanup, Dispatch, Hooks};
pub use lane::{Lane, Lanes};
pub use root::{CommitStats, Root};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::host::{HostConfig, HostError, HostNode};
use crate::scheduler::{PriorityLevel, Scheduler};
use context::ContextStack;
use lane::{TransitionLaneCursor, NO_LANE};
use work_loop::{ExecutionContext, RenderSession};

/// Reconciler errors.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A fiber that has to be placed or removed has no host ancestor.
    #[error("no host parent for {0}")]
    MissingHostParent(String),
    /// A fiber or host node is not known to the root.
    #[error("fiber not found")]
    MissingFiber,
    /// A component called its hooks in a different order than last render.
    #[error("hook #{index} changed between renders: {found}")]
    HookOrderMismatch { index: usize, found: &'static str },
    /// A listener prop holds a value that cannot be called.
    #[error("{prop} is not a listener: {value}")]
    ListenerNotCallable { prop: String, value: String },
    /// A root update was requested from inside a render.
    #[error("cannot update a root while rendering")]
    RenderInProgress,
    /// A fiber's tag does not match its element type.
    #[error("{tag:?} fiber has no matching element type")]
    MissingElementType { tag: WorkTag },
    #[error(transparent)]
    Host(#[from] HostError),
}

struct ReconcilerInner {
    scheduler: Scheduler,
    host: Rc<dyn HostConfig>,
    session: RefCell<Option<RenderSession>>,
    execution_context: Cell<ExecutionContext>,
    /// Lane forced on updates raised inside `with_update_priority`.
    update_priority: Cell<Lane>,
    transitions: TransitionLaneCursor,
    contexts: RefCell<ContextStack>,
}

/// Drives renders of any number of roots on one scheduler and host.
/// Clones share state.
#[derive(Clone)]
pub struct Reconciler {
    inner: Rc<ReconcilerInner>,
}

impl Reconciler {
    pub fn new(
        scheduler: Scheduler,
        host: Rc<dyn HostConfig>,
    ) -> Self {
        Self {
            inner: Rc::new(ReconcilerInner {
                scheduler,
                host,
                session: RefCell::new(None),
                execution_context: Cell::new(ExecutionContext::empty()),
                update_priority: Cell::new(NO_LANE),
                transitions: TransitionLaneCursor::new(),
                contexts: RefCell::new(ContextStack::new()),
            }),
        }
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    #[inline]
    pub fn host(&self) -> &dyn HostConfig {
        &*self.inner.host
    }

    /// Create a root that renders into `container`.
    pub fn create_container(
        &self,
        container: HostNode,
    ) -> Root {
        Root::new(self.clone(), container)
    }

    /// Schedule a render of `element` into `root`. Returns the update lane.
    pub fn update_container(
        &self,
        element: impl Into<Node>,
        root: &Root,
    ) -> Result<Lane, ReconcilerError> {
        work_loop::update_container(self, element.into(), root)
    }

    /// Record an update of `lane` on `fiber` and make sure `root` will
    /// render it.
    pub fn schedule_update_on_fiber(
        &self,
        root: &Root,
        fiber: FiberId,
        lane: Lane,
    ) {
        work_loop::schedule_update_on_fiber(self, root, fiber, lane);
    }

    /// Lane for an update raised right now.
    ///
    /// An explicit update priority wins, then the priority of the running
    /// scheduler task, then the host's current event.
    pub fn request_update_lane(&self) -> Lane {
        let forced = self.inner.update_priority.get();
        if !forced.is_empty() {
            return forced;
        }
        if self.inner.scheduler.is_performing_work() {
            return match self.inner.scheduler.current_priority_level() {
                PriorityLevel::Immediate => Lanes::SYNC,
                PriorityLevel::UserBlocking => Lanes::INPUT_CONTINUOUS,
                PriorityLevel::Idle => Lanes::IDLE,
                _ => Lanes::DEFAULT,
            };
        }
        self.inner.host.current_event_priority().lane()
    }

    /// Run `f` with updates forced into `lane`.
    pub fn with_update_priority<R>(
        &self,
        lane: Lane,
        f: impl FnOnce() -> R,
    ) -> R {
        let previous = self.inner.update_priority.replace(lane);
        let result = f();
        self.inner.update_priority.set(previous);
        result
    }

    /// Run `f` with its updates in the next transition lane.
    pub fn start_transition<R>(
        &self,
        f: impl FnOnce() -> R,
    ) -> R {
        let lane = self.inner.transitions.claim_next();
        self.with_update_priority(lane, f)
    }

    /// Deliver a named event at `target`. Returns how many listeners ran.
    pub fn dispatch_event(
        &self,
        root: &Root,
        target: HostNode,
        event: &str,
        payload: &Value,
    ) -> Result<usize, ReconcilerError> {
        events::dispatch_event(self, root, target, event, payload)
    }

    /// Run pending passive effects of `root` now.
    pub fn flush_passive_effects(
        &self,
        root: &Root,
    ) -> bool {
        commit::flush_passive_effects(root)
    }

    /// Whether a render phase is running.
    #[inline]
    pub fn is_rendering(&self) -> bool {
        self.inner.execution_context.get().contains(ExecutionContext::RENDER)
    }

    /// Whether a commit is running.
    #[inline]
    pub fn is_committing(&self) -> bool {
        self.inner.execution_context.get().contains(ExecutionContext::COMMIT)
    }

    pub(crate) fn contexts(&self) -> &RefCell<ContextStack> {
        &self.inner.contexts
    }

    pub(crate) fn transitions(&self) -> &TransitionLaneCursor {
        &self.inner.transitions
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("execution_context", &self.inner.execution_context.get())
            .field("update_priority", &self.inner.update_priority.get())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests;
