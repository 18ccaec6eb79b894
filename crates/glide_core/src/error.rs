//! Error types for the core runtime

use thiserror::Error;

/// Errors raised while loading scheduler configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or has mistyped keys
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Tick interval of zero would spin the scheduler
    #[error("Tick interval must be greater than zero")]
    InvalidInterval,
}

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;
