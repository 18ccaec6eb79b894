//! Glide Core Runtime
//!
//! Timing primitives shared by the Glide interpolation crates:
//!
//! - **Clocks**: an injectable time source, with a virtual clock for tests
//! - **Timer Scheduler**: many independent periodic timers on one clock, each
//!   with its own start/pause/stop lifecycle
//! - **Configuration**: TOML-backed scheduler settings
//!
//! # Example
//!
//! ```rust
//! use glide_core::clock::ManualClock;
//! use glide_core::scheduler::{Continuation, TimerScheduler};
//! use std::time::Duration;
//!
//! let scheduler = TimerScheduler::with_clock(ManualClock::new());
//!
//! let handle = scheduler.start(|delta| {
//!     assert_eq!(delta, Duration::from_millis(33));
//!     Continuation::Continue
//! });
//!
//! scheduler.run_for(Duration::from_millis(100));
//! handle.stop();
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::ConfigError;
pub use scheduler::{Continuation, TimerHandle, TimerId, TimerScheduler, TimerState};
