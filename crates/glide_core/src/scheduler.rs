//! Timer scheduler
//!
//! Multiplexes any number of independent periodic timers onto one clock.
//! Each timer has its own period, deadline and last-tick timestamp, and can be
//! paused or stopped without affecting the others.
//!
//! Ticks report the measured time since the timer's previous tick rather than
//! the nominal period, so consumers that accumulate deltas stay in step with
//! the clock even when the scheduler runs late.
//!
//! Callbacks run with the scheduler unborrowed: a callback may start, pause or
//! stop any timer, including its own. Timers started from a callback are
//! scheduled one period after the current time and never fire in the cycle
//! that created them.

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, error, trace};

new_key_type! {
    /// Identifier for a timer registered with a [`TimerScheduler`]
    pub struct TimerId;
}

/// Shortest period a timer may tick at
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What a tick callback wants to happen to its timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continuation {
    /// Keep ticking
    Continue,
    /// Release the timer, exactly as [`TimerHandle::stop`] would
    Cancel,
}

/// Lifecycle state of a timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Running,
    /// Deadlines still advance but the callback is skipped and no time accrues
    Paused,
    /// Released, or never existed
    Stopped,
}

/// Callback invoked on every tick with the time since the previous tick
pub type TickCallback = Box<dyn FnMut(Duration) -> Continuation>;

struct Timer {
    period: Duration,
    next_due: Duration,
    last_tick: Duration,
    paused: bool,
    /// `None` while the callback is running
    callback: Option<TickCallback>,
}

impl Timer {
    fn state(&self) -> TimerState {
        if self.paused {
            TimerState::Paused
        } else {
            TimerState::Running
        }
    }

    /// Move the deadline one period on. A timer that fell behind by more
    /// than a period fires once and restarts from `now`.
    fn reschedule(&mut self, now: Duration) {
        self.next_due += self.period;
        if self.next_due <= now {
            self.next_due = now + self.period;
        }
    }
}

struct SchedulerInner {
    timers: SlotMap<TimerId, Timer>,
    period: Duration,
    clock: Rc<dyn Clock>,
}

impl SchedulerInner {
    fn start(&mut self, period: Duration, callback: TickCallback) -> TimerId {
        let now = self.clock.now();
        let period = period.max(MIN_PERIOD);
        let id = self.timers.insert(Timer {
            period,
            next_due: now + period,
            last_tick: now,
            paused: false,
            callback: Some(callback),
        });
        debug!(?id, ?period, "timer started");
        id
    }

    fn pause(&mut self, id: TimerId, paused: bool) {
        let now = self.clock.now();
        let Some(timer) = self.timers.get_mut(id) else {
            return;
        };
        if timer.paused == paused {
            return;
        }

        timer.paused = paused;
        if !paused {
            // Time spent paused is dropped, not deferred
            timer.last_tick = now;
        }
        debug!(?id, paused, "timer pause changed");
    }

    /// Take the callback of a due timer out of its slot
    fn begin_tick(&mut self, id: TimerId, now: Duration) -> Option<(TickCallback, Duration)> {
        // Gone if an earlier callback in this cycle stopped it
        let timer = self.timers.get_mut(id)?;
        timer.reschedule(now);
        if timer.paused {
            return None;
        }

        let delta = now.saturating_sub(timer.last_tick);
        timer.last_tick = now;
        let callback = timer.callback.take()?;
        Some((callback, delta))
    }

    /// Put the callback back, or release the timer. Whatever must be dropped
    /// is handed back so it is dropped outside the borrow.
    fn finish_tick(
        &mut self,
        id: TimerId,
        callback: TickCallback,
        outcome: std::thread::Result<Continuation>,
    ) -> Option<TickCallback> {
        match outcome {
            Ok(Continuation::Continue) => match self.timers.get_mut(id) {
                Some(timer) => {
                    timer.callback = Some(callback);
                    None
                }
                // Stopped from inside its own callback
                None => Some(callback),
            },
            Ok(Continuation::Cancel) => {
                self.timers.remove(id);
                debug!(?id, "timer cancelled by callback");
                Some(callback)
            }
            Err(payload) => {
                self.timers.remove(id);
                error!(
                    ?id,
                    message = panic_message(payload.as_ref()),
                    "timer callback panicked, releasing timer"
                );
                Some(callback)
            }
        }
    }

    fn state(&self, id: TimerId) -> TimerState {
        self.timers
            .get(id)
            .map_or(TimerState::Stopped, Timer::state)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Drives periodic timers off a single clock
///
/// Cloning the scheduler yields another reference to the same set of timers.
///
/// ```rust
/// use glide_core::clock::ManualClock;
/// use glide_core::scheduler::{Continuation, TimerScheduler};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let scheduler = TimerScheduler::with_clock(ManualClock::new());
/// let ticks = Rc::new(Cell::new(0));
///
/// let counter = ticks.clone();
/// scheduler.start(move |_delta| {
///     counter.set(counter.get() + 1);
///     if counter.get() == 3 {
///         Continuation::Cancel
///     } else {
///         Continuation::Continue
///     }
/// });
///
/// scheduler.run();
/// assert_eq!(ticks.get(), 3);
/// assert_eq!(scheduler.timer_count(), 0);
/// ```
#[derive(Clone)]
pub struct TimerScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    clock: Rc<dyn Clock>,
}

impl TimerScheduler {
    /// Scheduler on the system clock with the default 33 ms period
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::with_config(&SchedulerConfig::default(), clock)
    }

    pub fn with_config(config: &SchedulerConfig, clock: impl Clock + 'static) -> Self {
        let clock: Rc<dyn Clock> = Rc::new(clock);
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                timers: SlotMap::with_key(),
                period: config.tick_interval().max(MIN_PERIOD),
                clock: clock.clone(),
            })),
            clock,
        }
    }

    /// Default period for new timers
    pub fn period(&self) -> Duration {
        self.inner.borrow().period
    }

    /// Current time on the scheduler's clock
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Start a timer ticking at the default period
    pub fn start<F>(&self, callback: F) -> TimerHandle
    where
        F: FnMut(Duration) -> Continuation + 'static,
    {
        let period = self.period();
        self.start_with_period(period, callback)
    }

    /// Start a timer with its own period (at least [`MIN_PERIOD`])
    pub fn start_with_period<F>(&self, period: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(Duration) -> Continuation + 'static,
    {
        let id = self.inner.borrow_mut().start(period, Box::new(callback));
        TimerHandle {
            id,
            scheduler: Rc::downgrade(&self.inner),
        }
    }

    pub fn pause(&self, id: TimerId, paused: bool) {
        self.inner.borrow_mut().pause(id, paused);
    }

    /// Release a timer. Unknown or already released ids are ignored.
    pub fn stop(&self, id: TimerId) {
        let removed = self.inner.borrow_mut().timers.remove(id);
        if removed.is_some() {
            debug!(?id, "timer stopped");
        }
    }

    pub fn state(&self, id: TimerId) -> TimerState {
        self.inner.borrow().state(id)
    }

    /// Number of live timers, paused ones included
    pub fn timer_count(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn has_active_timers(&self) -> bool {
        !self.inner.borrow().timers.is_empty()
    }

    /// Check if any timer would invoke its callback
    pub fn has_running_timers(&self) -> bool {
        self.inner.borrow().timers.values().any(|t| !t.paused)
    }

    /// Earliest deadline among live timers
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.borrow().timers.values().map(|t| t.next_due).min()
    }

    /// Fire every timer whose deadline has passed, once each
    ///
    /// Returns the number of callbacks invoked.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let due: SmallVec<[TimerId; 8]> = self
            .inner
            .borrow()
            .timers
            .iter()
            .filter(|(_, timer)| timer.next_due <= now)
            .map(|(id, _)| id)
            .collect();

        let mut fired = 0;
        for id in due {
            let Some((mut callback, delta)) = self.inner.borrow_mut().begin_tick(id, now) else {
                continue;
            };

            trace!(?id, ?delta, "tick");
            fired += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(delta)));
            let released = self.inner.borrow_mut().finish_tick(id, callback, outcome);
            drop(released);
        }
        fired
    }

    /// Tick timers as their deadlines come up until `span` has passed
    pub fn run_for(&self, span: Duration) {
        let end = self.clock.now() + span;
        loop {
            match self.next_deadline() {
                Some(deadline) if deadline <= end => {
                    self.clock.sleep_until(deadline);
                    self.tick();
                }
                _ => {
                    self.clock.sleep_until(end);
                    break;
                }
            }
        }
    }

    /// Tick timers until none is left running
    ///
    /// Returns early when every remaining timer is paused, since nothing
    /// could resume them.
    pub fn run(&self) {
        while self.has_running_timers() {
            let Some(deadline) = self.next_deadline() else {
                break;
            };
            self.clock.sleep_until(deadline);
            self.tick();
        }
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a timer started on a [`TimerScheduler`]
///
/// The handle does not keep the scheduler alive. Once the scheduler is
/// dropped every handle reports [`TimerState::Stopped`].
#[derive(Clone, Debug)]
pub struct TimerHandle {
    id: TimerId,
    scheduler: Weak<RefCell<SchedulerInner>>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Pause or resume ticking
    pub fn pause(&self, paused: bool) {
        if let Some(inner) = self.scheduler.upgrade() {
            inner.borrow_mut().pause(self.id, paused);
        }
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&self) {
        let Some(inner) = self.scheduler.upgrade() else {
            return;
        };
        let removed = inner.borrow_mut().timers.remove(self.id);
        if removed.is_some() {
            debug!(id = ?self.id, "timer stopped");
        }
    }

    pub fn state(&self) -> TimerState {
        self.scheduler
            .upgrade()
            .map_or(TimerState::Stopped, |inner| inner.borrow().state(self.id))
    }

    /// Check if the timer has not been released
    pub fn is_active(&self) -> bool {
        self.state() != TimerState::Stopped
    }
}
