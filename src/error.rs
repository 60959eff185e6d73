//! # Error Types
//!
//! Custom error types for RC Link using `thiserror`.
//!
//! The input and link core never fails: decode, curve, filter and setter
//! operations are total. Errors only come from the I/O edges (parameter
//! store backends, serial radio bridge, gamepad, log files, configuration).

use thiserror::Error;

/// Main error type for RC Link
#[derive(Debug, Error)]
pub enum RcLinkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Radio bridge framing errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Parameter store errors
    #[error("Parameter store error: {0}")]
    Store(String),

    /// Gamepad input errors
    #[error("Controller error: {0}")]
    Controller(String),

    /// No usable gamepad was found
    #[error("No gamepad with analog sticks found")]
    ControllerNotFound,

    /// Telemetry log errors
    #[error("Telemetry log error: {0}")]
    Telemetry(String),
}

/// Result type alias for RC Link
pub type Result<T> = std::result::Result<T, RcLinkError>;
