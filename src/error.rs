//! Error handling for the cellmon crate.

use crate::acquisition::bus::BusError;

/// A specialized `Result` type for cellmon operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// The main error type for battery monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The I2C interface was never initialized; ADC readings are impossible.
    ///
    /// Raised immediately on any read attempt, never retried within a single
    /// call. The streaming loop retries on its next poll tick with a long
    /// backoff.
    #[error("I2C interface is not available. ADC readings are impossible.")]
    HardwareUnavailable,

    /// A channel index outside the configured cell count was requested.
    /// Rejected before any hardware access is attempted.
    #[error("Invalid channel number: {channel}. Expected 0 to {max}.")]
    InvalidChannel { channel: u8, max: u8 },

    /// A bus-level I2C transaction failed
    #[error("I2C bus error: {0}")]
    Bus(#[from] BusError),

    /// Database operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Create a new storage error
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the hardware interface is absent entirely,
    /// as opposed to a transient fault on an otherwise-present bus.
    pub fn is_hardware_unavailable(&self) -> bool {
        matches!(self, Self::HardwareUnavailable)
    }
}
