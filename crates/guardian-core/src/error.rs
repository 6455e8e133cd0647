//! Core error types for guardian-core.
//!
//! Expected suppressions (own alert, already viewed, stale...) are not
//! errors and live in [`crate::filter::SuppressReason`]. Everything here is
//! a genuine failure, and every one of them is contained: the supervisor logs
//! it and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for guardian-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The alert feed reported a transient failure. Reconnection is left to
    /// the feed itself.
    #[error("Alert stream interrupted: {message}")]
    StreamInterrupted { message: String },

    /// The platform notification call failed. The alert counts as not
    /// delivered and is never retried.
    #[error("Notifier unavailable: {message}")]
    NotifierUnavailable { message: String },

    /// A self-issued restart failed. Periodic reconciliation stays armed.
    #[error("Restart failed: {source}")]
    RestartFailed {
        #[source]
        source: Box<CoreError>,
    },

    /// Periodic job scheduling errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    pub fn stream_interrupted(message: impl Into<String>) -> Self {
        CoreError::StreamInterrupted {
            message: message.into(),
        }
    }

    pub fn notifier_unavailable(message: impl Into<String>) -> Self {
        CoreError::NotifierUnavailable {
            message: message.into(),
        }
    }

    pub fn restart_failed(source: CoreError) -> Self {
        CoreError::RestartFailed {
            source: Box::new(source),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Periodic job scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The scheduler has been shut down and accepts no new jobs
    #[error("Scheduler is shut down")]
    Shutdown,

    /// Interval must be non-zero
    #[error("Invalid interval for job '{name}': interval must be greater than zero")]
    InvalidInterval { name: String },

    /// Created outside a tokio runtime
    #[error("No tokio runtime available to run periodic jobs")]
    NoRuntime,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
