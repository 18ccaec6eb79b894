//! Interpolation engine
//!
//! An [`Interpolator`] eases a set of scalar channels from their start to their
//! end values over a duration. Once started with [`Interpolator::lerp`] it owns
//! one timer on a [`TimerScheduler`] and reports every tick to the client
//! callback with the current values and normalized progress.
//!
//! The client callback may call back into the interpolator: redefining and
//! rerunning from the completion callback chains runs back to back.
//!
//! # Example
//!
//! ```rust
//! use glide_animation::{Easing, Interpolator};
//! use glide_core::{ManualClock, TimerScheduler};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let scheduler = TimerScheduler::with_clock(ManualClock::new());
//! let lerp = Interpolator::new(&scheduler);
//! lerp.define([(0.0, 1.0), (3.0, 6.0)], Duration::from_secs(1), Easing::default());
//!
//! let last = Rc::new(RefCell::new((Vec::new(), 0.0)));
//! let last_clone = last.clone();
//! lerp.lerp(move |values, progress| {
//!     *last_clone.borrow_mut() = (values.to_vec(), progress);
//! })
//! .unwrap();
//!
//! scheduler.run();
//! assert_eq!(*last.borrow(), (vec![1.0, 6.0], 1.0));
//! ```

use crate::easing::Easing;
use glide_core::scheduler::{Continuation, TimerHandle, TimerScheduler};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// One scalar range to interpolate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Channel {
    pub start: f64,
    pub end: f64,
}

impl Channel {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Signed distance from start to end
    pub fn distance(&self) -> f64 {
        self.end - self.start
    }
}

impl From<(f64, f64)> for Channel {
    fn from((start, end): (f64, f64)) -> Self {
        Self::new(start, end)
    }
}

impl From<[f64; 2]> for Channel {
    fn from([start, end]: [f64; 2]) -> Self {
        Self::new(start, end)
    }
}

/// Lifecycle of an interpolation session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Defined but not started
    Idle,
    Running,
    Paused,
    /// Reached the end values; define again to rerun
    Completed,
    /// Stopped before completion; define again to rerun
    Stopped,
}

/// Why [`Interpolator::lerp`] did not start
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LerpRejected {
    #[error("an interpolation is already running")]
    AlreadyActive,

    #[error("duration is zero, nothing to interpolate")]
    ZeroDuration,

    #[error("interpolation already completed, define it again to rerun")]
    Completed,

    #[error("interpolation was stopped, define it again to rerun")]
    Stopped,
}

/// Client callback: current values in channel order, and progress in `[0, 1]`
pub type ResultCallback = Box<dyn FnMut(&[f64], f64)>;

type Values = SmallVec<[f64; 4]>;

struct Session {
    channels: SmallVec<[Channel; 4]>,
    duration: Duration,
    elapsed: Duration,
    easing: Easing,
    state: SessionState,
    /// `None` while the callback is running
    callback: Option<ResultCallback>,
    timer: Option<TimerHandle>,
    /// Bumped by `define` and `stop` so ticks of a superseded run cancel
    generation: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            channels: SmallVec::new(),
            duration: Duration::ZERO,
            elapsed: Duration::ZERO,
            easing: Easing::default(),
            state: SessionState::Idle,
            callback: None,
            timer: None,
            generation: 0,
        }
    }

    /// State, accounting for a timer the scheduler released behind our back
    /// (its callback panicked)
    fn effective_state(&self) -> SessionState {
        match self.state {
            SessionState::Running | SessionState::Paused
                if !self.timer.as_ref().is_some_and(TimerHandle::is_active) =>
            {
                SessionState::Stopped
            }
            state => state,
        }
    }

    fn sync_state(&mut self) {
        self.state = self.effective_state();
    }

    fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        self.elapsed.as_secs_f64() / self.duration.as_secs_f64()
    }

    /// Values of every channel at `elapsed`. The end of the run yields the
    /// end values exactly.
    fn sample(&self, elapsed: Duration) -> Values {
        if elapsed >= self.duration {
            return self.channels.iter().map(|channel| channel.end).collect();
        }

        let ease = self.easing.function();
        let duration = self.duration.as_secs_f64();
        let elapsed = elapsed.as_secs_f64();
        self.channels
            .iter()
            .map(|channel| ease(channel.start, channel.distance(), duration, elapsed))
            .collect()
    }

    /// Detach the current run
    fn release(&mut self) -> (Option<TimerHandle>, Option<ResultCallback>) {
        self.generation += 1;
        (self.timer.take(), self.callback.take())
    }
}

/// Eases scalar channels over time on a shared scheduler
///
/// Cloning yields another handle to the same session, which is how a client
/// callback reaches back into the interpolator.
#[derive(Clone)]
pub struct Interpolator {
    session: Rc<RefCell<Session>>,
    scheduler: TimerScheduler,
}

impl Interpolator {
    pub fn new(scheduler: &TimerScheduler) -> Self {
        Self {
            session: Rc::new(RefCell::new(Session::new())),
            scheduler: scheduler.clone(),
        }
    }

    /// Configure the channels, duration and easing
    ///
    /// Resets elapsed time to zero and cancels any run in progress.
    pub fn define<I, C>(&self, channels: I, duration: Duration, easing: Easing)
    where
        I: IntoIterator<Item = C>,
        C: Into<Channel>,
    {
        let channels: SmallVec<[Channel; 4]> = channels.into_iter().map(Into::into).collect();

        let (timer, callback) = {
            let mut session = self.session.borrow_mut();
            let released = session.release();
            debug!(
                channels = channels.len(),
                ?duration,
                ?easing,
                "interpolation defined"
            );
            session.channels = channels;
            session.duration = duration;
            session.elapsed = Duration::ZERO;
            session.easing = easing;
            session.state = SessionState::Idle;
            released
        };

        if let Some(timer) = timer {
            timer.stop();
        }
        drop(callback);
    }

    /// Start interpolating, reporting each tick to `callback`
    pub fn lerp<F>(&self, callback: F) -> Result<(), LerpRejected>
    where
        F: FnMut(&[f64], f64) + 'static,
    {
        let generation = {
            let mut session = self.session.borrow_mut();
            session.sync_state();

            let rejection = match session.state {
                SessionState::Running | SessionState::Paused => Some(LerpRejected::AlreadyActive),
                SessionState::Completed => Some(LerpRejected::Completed),
                SessionState::Stopped => Some(LerpRejected::Stopped),
                SessionState::Idle if session.duration.is_zero() => {
                    Some(LerpRejected::ZeroDuration)
                }
                SessionState::Idle => None,
            };
            if let Some(rejection) = rejection {
                warn!(%rejection, "lerp ignored");
                return Err(rejection);
            }

            session.callback = Some(Box::new(callback));
            session.state = SessionState::Running;
            session.generation
        };

        let weak = Rc::downgrade(&self.session);
        let timer = self
            .scheduler
            .start(move |delta| step(&weak, generation, delta));
        debug!(id = ?timer.id(), "interpolation started");
        self.session.borrow_mut().timer = Some(timer);
        Ok(())
    }

    /// Pause or resume a running interpolation. No time accrues while paused.
    pub fn pause(&self, paused: bool) {
        let timer = {
            let mut session = self.session.borrow_mut();
            session.sync_state();
            match (session.state, paused) {
                (SessionState::Running, true) => session.state = SessionState::Paused,
                (SessionState::Paused, false) => session.state = SessionState::Running,
                _ => return,
            }
            session.timer.clone()
        };

        if let Some(timer) = timer {
            timer.pause(paused);
        }
        debug!(paused, "interpolation pause changed");
    }

    /// Cancel the run, discarding any pending completion. Idempotent.
    pub fn stop(&self) {
        let (timer, callback) = {
            let mut session = self.session.borrow_mut();
            if !matches!(session.state, SessionState::Running | SessionState::Paused) {
                return;
            }
            session.state = SessionState::Stopped;
            session.release()
        };

        if let Some(timer) = timer {
            timer.stop();
        }
        drop(callback);
        debug!("interpolation stopped");
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().effective_state()
    }

    /// Check if a run is in flight, paused or not
    pub fn is_active(&self) -> bool {
        matches!(self.state(), SessionState::Running | SessionState::Paused)
    }

    pub fn elapsed(&self) -> Duration {
        self.session.borrow().elapsed
    }

    pub fn duration(&self) -> Duration {
        self.session.borrow().duration
    }

    /// Elapsed time over duration, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.session.borrow().progress()
    }

    pub fn easing(&self) -> Easing {
        self.session.borrow().easing
    }

    pub fn channel_count(&self) -> usize {
        self.session.borrow().channels.len()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.session.borrow().channels.to_vec()
    }

    /// Evaluate the channels at an arbitrary elapsed time without touching
    /// the session
    pub fn sample(&self, elapsed: Duration) -> Vec<f64> {
        self.session.borrow().sample(elapsed).into_vec()
    }
}

/// Advance a session by one tick
fn step(weak: &Weak<RefCell<Session>>, generation: u64, delta: Duration) -> Continuation {
    let Some(shared) = weak.upgrade() else {
        return Continuation::Cancel;
    };

    let (mut callback, values, progress) = {
        let mut session = shared.borrow_mut();
        if session.generation != generation {
            return Continuation::Cancel;
        }
        let Some(callback) = session.callback.take() else {
            return Continuation::Cancel;
        };

        session.elapsed = (session.elapsed + delta).min(session.duration);
        let values = session.sample(session.elapsed);
        let progress = session.progress();
        if session.elapsed == session.duration {
            session.state = SessionState::Completed;
            session.timer = None;
        }
        trace!(elapsed = ?session.elapsed, progress, "interpolation step");
        (callback, values, progress)
    };

    callback(values.as_slice(), progress);

    let mut session = shared.borrow_mut();
    if session.generation != generation {
        // Redefined or stopped from inside the callback
        return Continuation::Cancel;
    }
    if session.state == SessionState::Completed {
        debug!("interpolation complete");
        return Continuation::Cancel;
    }

    session.callback = Some(callback);
    Continuation::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::{Style, Transition};
    use glide_core::clock::ManualClock;
    use std::cell::Cell;

    const PERIOD: Duration = Duration::from_millis(33);

    type Frames = Rc<RefCell<Vec<(Vec<f64>, f64)>>>;

    fn setup() -> (TimerScheduler, Interpolator) {
        let scheduler = TimerScheduler::with_clock(ManualClock::new());
        let lerp = Interpolator::new(&scheduler);
        (scheduler, lerp)
    }

    fn recorder() -> (Frames, impl FnMut(&[f64], f64) + 'static) {
        let frames: Frames = Rc::new(RefCell::new(Vec::new()));
        let frames_clone = frames.clone();
        (frames, move |values: &[f64], progress: f64| {
            frames_clone.borrow_mut().push((values.to_vec(), progress));
        })
    }

    #[test]
    fn test_channel_distance() {
        assert_eq!(Channel::from((3.0, 6.0)).distance(), 3.0);
        assert_eq!(Channel::from([5.0, 1.0]).distance(), -4.0);
    }

    #[test]
    fn test_define_sets_session() {
        let (_scheduler, lerp) = setup();
        let easing = Easing::new(Transition::EaseIn, Style::Sine);
        lerp.define([(0.0, 1.0), (2.0, 3.0)], Duration::from_secs(10), easing);

        assert_eq!(lerp.state(), SessionState::Idle);
        assert_eq!(lerp.channel_count(), 2);
        assert_eq!(lerp.duration(), Duration::from_secs(10));
        assert_eq!(lerp.easing(), easing);
        assert_eq!(lerp.elapsed(), Duration::ZERO);
        assert_eq!(lerp.progress(), 0.0);
    }

    #[test]
    fn test_completes_at_end_values() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0), (3.0, 6.0)], Duration::from_secs(10), Easing::default());

        let (frames, callback) = recorder();
        lerp.lerp(callback).unwrap();
        scheduler.run_for(Duration::from_secs(10) + PERIOD);

        let frames = frames.borrow();
        let (values, progress) = frames.last().unwrap();
        assert_eq!(values, &vec![1.0, 6.0]);
        assert_eq!(*progress, 1.0);
        assert_eq!(lerp.state(), SessionState::Completed);
        assert_eq!(scheduler.timer_count(), 0);
    }

    #[test]
    fn test_progress_monotonic_and_bounded() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_millis(500), Easing::default());

        let (frames, callback) = recorder();
        lerp.lerp(callback).unwrap();
        scheduler.run();

        let frames = frames.borrow();
        assert_eq!(frames.len(), 16);
        for pair in frames.windows(2) {
            assert!(pair[1].1 >= pair[0].1);
        }
        assert!(frames.iter().all(|(_, p)| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_values_follow_easing() {
        let (scheduler, lerp) = setup();
        let easing = Easing::new(Transition::EaseOut, Style::Quadratic);
        lerp.define([(0.0, 1.0), (3.0, 5.0)], Duration::from_secs(10), easing);

        let (frames, callback) = recorder();
        lerp.lerp(callback).unwrap();
        scheduler.run_for(PERIOD * 2);

        let frames = frames.borrow();
        assert_eq!(frames.len(), 2);

        let first = &frames[0].0;
        let second = &frames[1].0;
        assert!((first[0] - easing.apply(0.0, 1.0, 10.0, 0.033)).abs() < 1e-12);
        assert!((first[1] - easing.apply(3.0, 2.0, 10.0, 0.033)).abs() < 1e-12);
        assert!(second[0] > first[0]);
        assert!(second[1] > first[1]);
    }

    #[test]
    fn test_zero_duration_never_invokes() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::ZERO, Easing::default());

        let (frames, callback) = recorder();
        assert_eq!(lerp.lerp(callback), Err(LerpRejected::ZeroDuration));

        scheduler.run_for(Duration::from_secs(1));
        assert!(frames.borrow().is_empty());
        assert_eq!(lerp.state(), SessionState::Idle);
        assert_eq!(scheduler.timer_count(), 0);
    }

    #[test]
    fn test_second_lerp_rejected_while_active() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_secs(1), Easing::default());

        let (first, callback) = recorder();
        lerp.lerp(callback).unwrap();

        let (second, callback) = recorder();
        assert_eq!(lerp.lerp(callback), Err(LerpRejected::AlreadyActive));

        scheduler.run_for(PERIOD * 3);
        assert_eq!(first.borrow().len(), 3);
        assert!(second.borrow().is_empty());
        assert_eq!(scheduler.timer_count(), 1);
    }

    #[test]
    fn test_completion_is_terminal_until_define() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_millis(100), Easing::default());
        lerp.lerp(|_, _| {}).unwrap();
        scheduler.run();

        assert_eq!(lerp.lerp(|_, _| {}), Err(LerpRejected::Completed));

        lerp.define([(1.0, 0.0)], Duration::from_millis(100), Easing::default());
        assert_eq!(lerp.lerp(|_, _| {}), Ok(()));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_secs(10), Easing::default());

        let (frames, callback) = recorder();
        lerp.lerp(callback).unwrap();
        scheduler.run_for(PERIOD * 3);

        lerp.stop();
        let after_first = (lerp.state(), lerp.elapsed(), frames.borrow().len());
        lerp.stop();
        let after_second = (lerp.state(), lerp.elapsed(), frames.borrow().len());
        assert_eq!(after_first, after_second);
        assert_eq!(after_first.0, SessionState::Stopped);

        scheduler.run_for(Duration::from_secs(1));
        assert_eq!(frames.borrow().len(), 3);
        assert_eq!(scheduler.timer_count(), 0);
        assert_eq!(lerp.lerp(|_, _| {}), Err(LerpRejected::Stopped));
    }

    #[test]
    fn test_stop_and_pause_idle_are_noops() {
        let (_scheduler, lerp) = setup();
        lerp.stop();
        lerp.pause(true);
        assert_eq!(lerp.state(), SessionState::Idle);

        lerp.define([(0.0, 1.0)], Duration::from_secs(1), Easing::default());
        lerp.pause(true);
        lerp.stop();
        assert_eq!(lerp.state(), SessionState::Idle);
    }

    #[test]
    fn test_pause_excludes_paused_time() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_secs(10), Easing::default());

        let (frames, callback) = recorder();
        lerp.lerp(callback).unwrap();
        scheduler.run_for(Duration::from_millis(100));
        assert_eq!(lerp.elapsed(), Duration::from_millis(99));

        lerp.pause(true);
        assert_eq!(lerp.state(), SessionState::Paused);
        let paused_frames = frames.borrow().len();

        scheduler.run_for(Duration::from_secs(1));
        assert_eq!(lerp.elapsed(), Duration::from_millis(99));
        assert_eq!(frames.borrow().len(), paused_frames);

        lerp.pause(false);
        assert_eq!(lerp.state(), SessionState::Running);
        scheduler.run_for(PERIOD);

        // Only the 22 ms since resuming count
        assert_eq!(lerp.elapsed(), Duration::from_millis(121));
        assert_eq!(frames.borrow().len(), paused_frames + 1);
    }

    #[test]
    fn test_define_cancels_running() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_secs(1), Easing::default());

        let (frames, callback) = recorder();
        lerp.lerp(callback).unwrap();
        scheduler.run_for(PERIOD);

        lerp.define([(0.0, 2.0)], Duration::from_secs(1), Easing::default());
        assert_eq!(lerp.state(), SessionState::Idle);
        assert_eq!(scheduler.timer_count(), 0);

        scheduler.run_for(PERIOD * 3);
        assert_eq!(frames.borrow().len(), 1);
    }

    #[test]
    fn test_chain_from_completion_callback() {
        let (scheduler, lerp) = setup();
        let first_progress = Rc::new(Cell::new(0.0));
        let second_progress = Rc::new(Cell::new(0.0));

        lerp.define([(0.0, 1.0)], Duration::from_millis(200), Easing::default());

        let chained = lerp.clone();
        let first = first_progress.clone();
        let second = second_progress.clone();
        lerp.lerp(move |_, progress| {
            first.set(progress);
            if progress == 1.0 {
                chained.define([(0.0, 1.0)], Duration::from_millis(200), Easing::default());
                let second = second.clone();
                chained
                    .lerp(move |_, progress| second.set(progress))
                    .unwrap();
            }
        })
        .unwrap();

        scheduler.run_for(Duration::from_millis(500));
        assert_eq!(first_progress.get(), 1.0);
        assert_eq!(second_progress.get(), 1.0);
        assert_eq!(lerp.state(), SessionState::Completed);
    }

    #[test]
    fn test_state_inside_final_callback() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_millis(66), Easing::default());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let inner = lerp.clone();
        lerp.lerp(move |_, _| seen_clone.borrow_mut().push(inner.state()))
            .unwrap();
        scheduler.run();

        assert_eq!(
            *seen.borrow(),
            vec![SessionState::Running, SessionState::Completed]
        );
    }

    #[test]
    fn test_panicking_callback_stops_session() {
        let (scheduler, lerp) = setup();
        lerp.define([(0.0, 1.0)], Duration::from_secs(1), Easing::default());
        lerp.lerp(|_, _| panic!("render failed")).unwrap();

        scheduler.run_for(PERIOD);
        assert_eq!(lerp.state(), SessionState::Stopped);
        assert_eq!(scheduler.timer_count(), 0);
    }

    #[test]
    fn test_sample_does_not_touch_session() {
        let (_scheduler, lerp) = setup();
        let easing = Easing::new(Transition::EaseIn, Style::Linear);
        lerp.define([(0.0, 10.0), (10.0, 0.0)], Duration::from_secs(2), easing);

        assert_eq!(lerp.sample(Duration::ZERO), vec![0.0, 10.0]);
        assert_eq!(lerp.sample(Duration::from_secs(1)), vec![5.0, 5.0]);
        assert_eq!(lerp.sample(Duration::from_secs(5)), vec![10.0, 0.0]);
        assert_eq!(lerp.elapsed(), Duration::ZERO);
    }
}
