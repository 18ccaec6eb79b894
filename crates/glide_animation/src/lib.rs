//! Glide Animation System
//!
//! Eased interpolation of scalar channels over wall-clock time.
//!
//! # Features
//!
//! - **Easing Library**: linear, quadratic and sine curves in ease-out,
//!   ease-in and ease-in-out flavors
//! - **Interpolator**: drives a set of channels from start to end values on a
//!   shared [`glide_core::TimerScheduler`], reporting values and progress on
//!   every tick
//! - **Chaining**: runs can be redefined and restarted from their own
//!   completion callback

pub mod easing;
pub mod interpolator;

pub use easing::{Easing, EasingFn, Style, Transition};
pub use interpolator::{Channel, Interpolator, LerpRejected, ResultCallback, SessionState};
