//! # Error Types
//!
//! Custom error types for VESC Telemetry using `thiserror`.

use thiserror::Error;

/// Main error type for VESC Telemetry
#[derive(Debug, Error)]
pub enum VescError {
    /// VESC protocol errors
    #[error("VESC protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No VESC serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Telemetry log errors
    #[error("Telemetry log error: {0}")]
    Telemetry(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for VESC Telemetry
pub type Result<T> = std::result::Result<T, VescError>;
