//! Cooperative task scheduler.
//!
//! Tasks are kept in two min-heaps: the ready queue ordered by expiration time
//! and the timer queue ordered by start time. The host drives the scheduler by
//! calling [`Scheduler::perform_work_until_deadline`] once per yield cycle;
//! each call runs tasks until the frame interval is used up, then returns
//! `true` if another cycle is needed. Delayed tasks are promoted by a single
//! host timer.
//!
//! Everything here is single-threaded. Reentrancy is guarded by flags, not
//! locks, so callbacks may schedule and cancel tasks while the loop runs.

pub mod clock;
pub mod heap;
pub mod priority;
pub mod task;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use heap::{HeapNode, MinHeap};
pub use priority::PriorityLevel;
pub use task::{BoxError, Continuation, Task, TaskCallback, TaskHandle, TaskId, TaskIdGenerator};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Length of one time slice before yielding to the host.
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: i64,
    /// Timeout for user-blocking tasks.
    #[serde(default = "default_user_blocking_timeout")]
    pub user_blocking_timeout_ms: i64,
    /// Timeout for normal tasks.
    #[serde(default = "default_normal_timeout")]
    pub normal_timeout_ms: i64,
    /// Timeout for low-priority tasks.
    #[serde(default = "default_low_timeout")]
    pub low_timeout_ms: i64,
}

fn default_frame_interval() -> i64 {
    5
}

fn default_user_blocking_timeout() -> i64 {
    priority::USER_BLOCKING_PRIORITY_TIMEOUT
}

fn default_normal_timeout() -> i64 {
    priority::NORMAL_PRIORITY_TIMEOUT
}

fn default_low_timeout() -> i64 {
    priority::LOW_PRIORITY_TIMEOUT
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval(),
            user_blocking_timeout_ms: default_user_blocking_timeout(),
            normal_timeout_ms: default_normal_timeout(),
            low_timeout_ms: default_low_timeout(),
        }
    }
}

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task callback returned an error. The task is not retried.
    #[error("{task} failed: {source}")]
    TaskFailed {
        task: TaskId,
        #[source]
        source: BoxError,
    },
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Options for [`Scheduler::schedule_callback_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Milliseconds to wait before the task becomes eligible.
    pub delay: i64,
}

impl ScheduleOptions {
    /// Options with a start delay.
    #[inline]
    pub fn delayed(delay: i64) -> Self {
        Self { delay }
    }
}

struct SchedulerInner {
    clock: Rc<dyn Clock>,
    config: SchedulerConfig,
    task_queue: RefCell<MinHeap<Rc<Task>>>,
    timer_queue: RefCell<MinHeap<Rc<Task>>>,
    ids: TaskIdGenerator,
    current_task: RefCell<Option<Rc<Task>>>,
    current_priority_level: Cell<PriorityLevel>,
    /// The time-slice loop is running.
    is_performing_work: Cell<bool>,
    /// A host callback has been requested and not yet started.
    is_host_callback_scheduled: Cell<bool>,
    is_host_timeout_scheduled: Cell<bool>,
    /// At least one more host yield cycle is requested.
    is_message_loop_running: Cell<bool>,
    host_timeout_deadline: Cell<Option<i64>>,
    slice_start: Cell<i64>,
}

/// Restores loop state when a slice ends, including by error.
struct WorkGuard<'a> {
    inner: &'a SchedulerInner,
    previous_priority_level: PriorityLevel,
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        self.inner.current_task.replace(None);
        self.inner
            .current_priority_level
            .set(self.previous_priority_level);
        self.inner.is_performing_work.set(false);
    }
}

/// Priority task scheduler with time slicing. Clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// Scheduler with the default configuration.
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    /// Scheduler with a custom configuration.
    pub fn with_config(
        clock: impl Clock + 'static,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                clock: Rc::new(clock),
                config,
                task_queue: RefCell::new(MinHeap::new()),
                timer_queue: RefCell::new(MinHeap::new()),
                ids: TaskIdGenerator::new(),
                current_task: RefCell::new(None),
                current_priority_level: Cell::new(PriorityLevel::Normal),
                is_performing_work: Cell::new(false),
                is_host_callback_scheduled: Cell::new(false),
                is_host_timeout_scheduled: Cell::new(false),
                is_message_loop_running: Cell::new(false),
                host_timeout_deadline: Cell::new(None),
                slice_start: Cell::new(-1),
            }),
        }
    }

    /// Current time from the host clock.
    #[inline]
    pub fn now(&self) -> i64 {
        self.inner.clock.now()
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Schedule `callback` to run as soon as its priority allows.
    pub fn schedule_callback<F>(
        &self,
        priority_level: PriorityLevel,
        callback: F,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> Result<Continuation, BoxError> + 'static,
    {
        self.schedule_callback_with(priority_level, callback, ScheduleOptions::default())
    }

    /// Schedule `callback`, optionally delayed.
    pub fn schedule_callback_with<F>(
        &self,
        priority_level: PriorityLevel,
        callback: F,
        options: ScheduleOptions,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> Result<Continuation, BoxError> + 'static,
    {
        let inner = &*self.inner;
        let current_time = inner.clock.now();
        let start_time = if options.delay > 0 {
            current_time + options.delay
        } else {
            current_time
        };
        let expiration_time = start_time + priority_level.timeout(&inner.config);

        let task = Rc::new(Task::new(
            inner.ids.next(),
            Box::new(callback),
            priority_level,
            start_time,
            expiration_time,
        ));

        if start_time > current_time {
            task.set_sort_index(start_time);
            inner.timer_queue.borrow_mut().push(task.clone());
            let is_earliest = inner.task_queue.borrow().is_empty()
                && inner
                    .timer_queue
                    .borrow()
                    .peek()
                    .is_some_and(|first| Rc::ptr_eq(first, &task));
            if is_earliest {
                if inner.is_host_timeout_scheduled.get() {
                    self.cancel_host_timeout();
                } else {
                    inner.is_host_timeout_scheduled.set(true);
                }
                self.request_host_timeout(start_time - current_time);
            }
            trace!("{} delayed until {}", task.task_id(), start_time);
        } else {
            task.set_sort_index(expiration_time);
            inner.task_queue.borrow_mut().push(task.clone());
            if !inner.is_host_callback_scheduled.get() && !inner.is_performing_work.get() {
                inner.is_host_callback_scheduled.set(true);
                self.request_host_callback();
            }
            trace!("{} queued at {} priority", task.task_id(), priority_level);
        }

        TaskHandle::new(task)
    }

    /// Cancel a task. It stays queued and is skipped when it reaches the top.
    pub fn cancel_callback(
        &self,
        handle: &TaskHandle,
    ) {
        drop(handle.task().take_callback());
    }

    /// Priority of the task that is currently running.
    #[inline]
    pub fn current_priority_level(&self) -> PriorityLevel {
        self.inner.current_priority_level.get()
    }

    /// Run `f` with the current priority level temporarily replaced.
    pub fn run_with_priority<R>(
        &self,
        priority_level: PriorityLevel,
        f: impl FnOnce() -> R,
    ) -> R {
        let previous = self.inner.current_priority_level.replace(priority_level);
        let result = f();
        self.inner.current_priority_level.set(previous);
        result
    }

    /// Whether the current slice has used up its frame interval.
    #[inline]
    pub fn should_yield(&self) -> bool {
        let elapsed = self.inner.clock.now() - self.inner.slice_start.get();
        elapsed >= self.inner.config.frame_interval_ms
    }

    /// Whether the time-slice loop is running right now.
    #[inline]
    pub fn is_performing_work(&self) -> bool {
        self.inner.is_performing_work.get()
    }

    /// Whether the host owes the scheduler another yield cycle.
    #[inline]
    pub fn has_host_callback(&self) -> bool {
        self.inner.is_message_loop_running.get()
    }

    /// Deadline of the armed host timer, if any.
    #[inline]
    pub fn host_timeout_deadline(&self) -> Option<i64> {
        self.inner.host_timeout_deadline.get()
    }

    /// Number of entries in the ready queue, cancelled ones included.
    pub fn ready_len(&self) -> usize {
        self.inner.task_queue.borrow().len()
    }

    /// Number of entries in the timer queue, cancelled ones included.
    pub fn delayed_len(&self) -> usize {
        self.inner.timer_queue.borrow().len()
    }

    /// Whether either queue holds a task. Cancelled tasks count until they
    /// reach the top of their heap and are dropped.
    pub fn has_pending_work(&self) -> bool {
        let live = |heap: &MinHeap<Rc<Task>>| heap.peek().is_some();
        live(&self.inner.task_queue.borrow()) || live(&self.inner.timer_queue.borrow())
    }

    /// One host yield cycle: run tasks until the slice deadline.
    ///
    /// Returns `true` when more work remains and another cycle was requested.
    /// A failing callback ends the slice with its error; the scheduler's flags
    /// are restored first and the failed task is not run again.
    pub fn perform_work_until_deadline(&self) -> SchedulerResult<bool> {
        let inner = &*self.inner;
        if !inner.is_message_loop_running.get() {
            return Ok(false);
        }
        let current_time = inner.clock.now();
        inner.slice_start.set(current_time);

        let result = self.flush_work(current_time);
        let has_more_work = match &result {
            Ok(more) => *more,
            Err(_) => true,
        };
        if !has_more_work {
            inner.is_message_loop_running.set(false);
        }
        result
    }

    /// Fire the host timer if its deadline has been reached.
    pub fn fire_host_timeout(&self) -> bool {
        match self.inner.host_timeout_deadline.get() {
            Some(deadline) if self.now() >= deadline => {
                self.inner.host_timeout_deadline.set(None);
                self.handle_timeout(self.now());
                true
            }
            _ => false,
        }
    }

    /// Run yield cycles until the host callback is no longer requested.
    /// Does not wait for timers.
    pub fn flush(&self) -> SchedulerResult<()> {
        if self.inner.is_performing_work.get() {
            return Ok(());
        }
        while self.inner.is_message_loop_running.get() {
            self.perform_work_until_deadline()?;
        }
        Ok(())
    }

    /// Host event loop: run every cycle, waiting on the clock for timers,
    /// until nothing is left.
    pub fn run_until_idle(&self) -> SchedulerResult<()> {
        if self.inner.is_performing_work.get() {
            return Ok(());
        }
        loop {
            if self.inner.is_message_loop_running.get() {
                self.perform_work_until_deadline()?;
                continue;
            }
            match self.inner.host_timeout_deadline.get() {
                Some(deadline) => {
                    self.inner.clock.wait_until(deadline);
                    self.fire_host_timeout();
                }
                None => return Ok(()),
            }
        }
    }

    fn flush_work(
        &self,
        initial_time: i64,
    ) -> SchedulerResult<bool> {
        let inner = &*self.inner;
        inner.is_host_callback_scheduled.set(false);
        if inner.is_host_timeout_scheduled.get() {
            inner.is_host_timeout_scheduled.set(false);
            self.cancel_host_timeout();
        }

        inner.is_performing_work.set(true);
        let _guard = WorkGuard {
            inner,
            previous_priority_level: inner.current_priority_level.get(),
        };
        self.work_loop(initial_time)
    }

    fn work_loop(
        &self,
        initial_time: i64,
    ) -> SchedulerResult<bool> {
        let inner = &*self.inner;
        let mut current_time = initial_time;
        self.advance_timers(current_time);

        loop {
            let Some(task) = self.peek_ready() else {
                break;
            };
            inner.current_task.replace(Some(task.clone()));

            if task.expiration_time() > current_time && self.should_yield() {
                debug!("yielding to host before {}", task.task_id());
                return Ok(true);
            }

            match task.take_callback() {
                Some(callback) => {
                    inner.current_priority_level.set(task.priority_level());
                    let did_timeout = task.expiration_time() <= current_time;
                    let outcome =
                        callback(did_timeout).map_err(|source| SchedulerError::TaskFailed {
                            task: task.task_id(),
                            source,
                        })?;
                    current_time = inner.clock.now();
                    match outcome {
                        Continuation::Continue(next) => {
                            task.set_callback(next);
                            self.advance_timers(current_time);
                            return Ok(true);
                        }
                        Continuation::Done => {
                            if self.is_ready_top(&task) {
                                inner.task_queue.borrow_mut().pop();
                            }
                            self.advance_timers(current_time);
                        }
                    }
                }
                None => {
                    trace!("dropping cancelled {}", task.task_id());
                    inner.task_queue.borrow_mut().pop();
                }
            }
        }

        let first_timer_start = inner.timer_queue.borrow().peek().map(|timer| timer.start_time());
        if let Some(start_time) = first_timer_start {
            inner.is_host_timeout_scheduled.set(true);
            self.request_host_timeout(start_time - current_time);
        }
        Ok(false)
    }

    /// Promote timers whose start time has passed into the ready queue.
    fn advance_timers(
        &self,
        current_time: i64,
    ) {
        let inner = &*self.inner;
        let mut timers = inner.timer_queue.borrow_mut();
        loop {
            let (alive, start_time) = match timers.peek() {
                Some(timer) => (timer.has_callback(), timer.start_time()),
                None => return,
            };
            if !alive {
                timers.pop();
            } else if start_time <= current_time {
                if let Some(timer) = timers.pop() {
                    timer.set_sort_index(timer.expiration_time());
                    trace!("promoting {}", timer.task_id());
                    inner.task_queue.borrow_mut().push(timer);
                }
            } else {
                return;
            }
        }
    }

    fn handle_timeout(
        &self,
        current_time: i64,
    ) {
        let inner = &*self.inner;
        inner.is_host_timeout_scheduled.set(false);
        self.advance_timers(current_time);

        if inner.is_host_callback_scheduled.get() {
            return;
        }
        if self.peek_ready().is_some() {
            inner.is_host_callback_scheduled.set(true);
            self.request_host_callback();
        } else {
            let first_timer_start = inner.timer_queue.borrow().peek().map(|timer| timer.start_time());
            if let Some(start_time) = first_timer_start {
                inner.is_host_timeout_scheduled.set(true);
                self.request_host_timeout(start_time - current_time);
            }
        }
    }

    fn request_host_callback(&self) {
        if !self.inner.is_message_loop_running.get() {
            self.inner.is_message_loop_running.set(true);
        }
    }

    fn request_host_timeout(
        &self,
        ms: i64,
    ) {
        let deadline = self.now() + ms.max(0);
        debug!("host timer armed for {}", deadline);
        self.inner.host_timeout_deadline.set(Some(deadline));
    }

    fn cancel_host_timeout(&self) {
        self.inner.host_timeout_deadline.set(None);
    }

    fn peek_ready(&self) -> Option<Rc<Task>> {
        self.inner.task_queue.borrow().peek().cloned()
    }

    fn is_ready_top(
        &self,
        task: &Rc<Task>,
    ) -> bool {
        self.inner
            .task_queue
            .borrow()
            .peek()
            .is_some_and(|top| Rc::ptr_eq(top, task))
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("ready", &self.ready_len())
            .field("delayed", &self.delayed_len())
            .field("performing_work", &self.inner.is_performing_work.get())
            .field("host_callback_scheduled", &self.inner.is_host_callback_scheduled.get())
            .field("message_loop_running", &self.inner.is_message_loop_running.get())
            .field("host_timeout", &self.inner.host_timeout_deadline.get())
            .finish()
    }
}

#[cfg(test)]
mod tests;
