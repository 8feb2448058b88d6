//! Task definitions for the scheduler.
//!
//! A task is a callback plus the timing data the scheduler needs to order it.
//! Cancellation is logical: the callback is dropped and the task stays in its
//! heap until it surfaces at the top.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::heap::HeapNode;
use super::priority::PriorityLevel;

/// Error type a task callback may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Work a task performs. The argument is `true` when the task has expired.
pub type TaskCallback = Box<dyn FnOnce(bool) -> Result<Continuation, BoxError>>;

/// What a task callback returns.
pub enum Continuation {
    /// The task is finished.
    Done,
    /// More work remains; run this callback next, in the same task slot.
    Continue(TaskCallback),
}

impl Continuation {
    /// Wrap a closure as a continuation.
    pub fn then<F>(callback: F) -> Self
    where
        F: FnOnce(bool) -> Result<Continuation, BoxError> + 'static,
    {
        Continuation::Continue(Box::new(callback))
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Continuation::Done => f.write_str("Done"),
            Continuation::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl From<TaskId> for u64 {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Generator for monotonically increasing task ids.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next_id: Cell<u64>,
}

impl TaskIdGenerator {
    /// Create a generator whose first id is 1.
    #[inline]
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
        }
    }

    /// Hand out the next id.
    #[allow(clippy::should_implement_trait)]
    #[inline]
    pub fn next(&self) -> TaskId {
        let id = self.next_id.get().max(1);
        self.next_id.set(id + 1);
        TaskId(id)
    }
}

/// A scheduled unit of work.
pub struct Task {
    id: TaskId,
    callback: RefCell<Option<TaskCallback>>,
    priority_level: PriorityLevel,
    start_time: i64,
    expiration_time: i64,
    sort_index: Cell<i64>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        callback: TaskCallback,
        priority_level: PriorityLevel,
        start_time: i64,
        expiration_time: i64,
    ) -> Self {
        Self {
            id,
            callback: RefCell::new(Some(callback)),
            priority_level,
            start_time,
            expiration_time,
            sort_index: Cell::new(-1),
        }
    }

    /// Task id.
    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.id
    }

    /// Priority the task was scheduled with.
    #[inline]
    pub fn priority_level(&self) -> PriorityLevel {
        self.priority_level
    }

    /// Time at which the task becomes eligible to run.
    #[inline]
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Time after which the task counts as overdue.
    #[inline]
    pub fn expiration_time(&self) -> i64 {
        self.expiration_time
    }

    /// Whether the task still has a callback to run.
    #[inline]
    pub fn has_callback(&self) -> bool {
        self.callback.borrow().is_some()
    }

    #[inline]
    pub(crate) fn set_sort_index(
        &self,
        index: i64,
    ) {
        self.sort_index.set(index);
    }

    #[inline]
    pub(crate) fn take_callback(&self) -> Option<TaskCallback> {
        self.callback.borrow_mut().take()
    }

    #[inline]
    pub(crate) fn set_callback(
        &self,
        callback: TaskCallback,
    ) {
        *self.callback.borrow_mut() = Some(callback);
    }
}

impl HeapNode for Task {
    #[inline]
    fn sort_index(&self) -> i64 {
        self.sort_index.get()
    }

    #[inline]
    fn id(&self) -> u64 {
        self.id.0
    }
}

impl std::fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority_level", &self.priority_level)
            .field("start_time", &self.start_time)
            .field("expiration_time", &self.expiration_time)
            .field("sort_index", &self.sort_index.get())
            .field("cancelled", &!self.has_callback())
            .finish()
    }
}

/// Handle returned by `schedule_callback`, used to cancel the task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    task: Rc<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: Rc<Task>) -> Self {
        Self { task }
    }

    /// Id of the underlying task.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// Priority the task was scheduled with.
    #[inline]
    pub fn priority_level(&self) -> PriorityLevel {
        self.task.priority_level
    }

    /// Whether the task was cancelled or has already finished.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        !self.task.has_callback()
    }

    pub(crate) fn task(&self) -> &Rc<Task> {
        &self.task
    }

    /// Whether both handles refer to the same task.
    #[inline]
    pub fn same(
        &self,
        other: &TaskHandle,
    ) -> bool {
        Rc::ptr_eq(&self.task, &other.task)
    }
}
