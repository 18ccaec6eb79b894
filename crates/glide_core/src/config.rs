//! Scheduler configuration
//!
//! ```toml
//! tick_interval_ms = 33
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default tick period, roughly 30 Hz
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 33;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period between ticks of every timer started without an explicit period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SchedulerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
