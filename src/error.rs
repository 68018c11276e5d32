use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid options: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Volume {volume} did not reach state {state} after {attempts} attempts")]
    StateTimeout {
        volume: String,
        state: String,
        attempts: u32,
    },

    #[error("{command} failed ({status}) with output [{output}]")]
    Command {
        command: String,
        status: String,
        output: String,
    },

    #[error("Device mismatch: {0}")]
    DeviceMismatch(String),

    #[error("Remote API error: {0}")]
    RemoteTransport(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// Short classification used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::Validation(_) => "validation",
            DriverError::NotFound(_) => "not_found",
            DriverError::StateTimeout { .. } => "state_timeout",
            DriverError::Command { .. } => "command",
            DriverError::DeviceMismatch(_) => "device_mismatch",
            DriverError::RemoteTransport(_) => "remote_transport",
            DriverError::Config(_) => "config",
            DriverError::Io(_) => "io",
        }
    }

    /// Whether a lookup found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::NotFound(_))
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            DriverError::NotFound(e.to_string())
        } else {
            DriverError::RemoteTransport(e.to_string())
        }
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
