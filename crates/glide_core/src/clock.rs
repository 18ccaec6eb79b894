//! Time sources for the scheduler
//!
//! The scheduler never reads the wall clock directly. It asks a [`Clock`] for
//! the current time and asks the same clock to wait for the next deadline, so
//! tests can swap in a [`ManualClock`] and drive time by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic time source
pub trait Clock {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block until `now() >= deadline`
    ///
    /// Returns immediately when the deadline has already passed.
    fn sleep_until(&self, deadline: Duration);
}

/// Wall clock backed by [`Instant`]
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let remaining = deadline.saturating_sub(self.now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Virtual clock that only moves when told to
///
/// Clones share the same time value, so a test can keep one clone and hand
/// another to a scheduler.
///
/// ```rust
/// use glide_core::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let shared = clock.clone();
///
/// clock.advance(Duration::from_millis(40));
/// assert_eq!(shared.now(), Duration::from_millis(40));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(by));
    }

    /// Jump to `to`. Moving backwards is ignored.
    pub fn set(&self, to: Duration) {
        if to > self.now.get() {
            self.now.set(to);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep_until(&self, deadline: Duration) {
        self.set(deadline);
    }
}
