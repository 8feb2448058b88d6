//! Host clock abstraction.
//!
//! The scheduler only needs a monotonic millisecond clock and a way to wait
//! until a timer deadline. [`VirtualClock`] makes both deterministic for tests
//! and simulations; [`SystemClock`] is backed by [`Instant`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic millisecond clock.
pub trait Clock {
    /// Current time in milliseconds.
    fn now(&self) -> i64;

    /// Block (or jump) until `deadline`. Used by the host loop for timers.
    fn wait_until(
        &self,
        deadline: i64,
    );
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: Rc<Cell<i64>>,
}

impl VirtualClock {
    /// Clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ms`.
    pub fn advance(
        &self,
        ms: i64,
    ) {
        self.now.set(self.now.get() + ms.max(0));
    }

    /// Set the absolute time. Time never goes backwards.
    pub fn set(
        &self,
        ms: i64,
    ) {
        if ms > self.now.get() {
            self.now.set(ms);
        }
    }
}

impl Clock for VirtualClock {
    #[inline]
    fn now(&self) -> i64 {
        self.now.get()
    }

    fn wait_until(
        &self,
        deadline: i64,
    ) {
        self.set(deadline);
    }
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose zero is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    fn wait_until(
        &self,
        deadline: i64,
    ) {
        let remaining = deadline - self.now();
        if remaining > 0 {
            std::thread::sleep(Duration::from_millis(remaining as u64));
        }
    }
}
