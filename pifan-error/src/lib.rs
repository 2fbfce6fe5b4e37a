//! Unified error handling for pifan
//!
//! This crate provides the single error type used across all pifan
//! components, built on thiserror for proper Display and Error impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using PifanError
pub type Result<T> = std::result::Result<T, PifanError>;

/// Unified error type for all pifan operations
#[derive(thiserror::Error, Debug)]
pub enum PifanError {
    // ========================================================================
    // I/O Errors
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ========================================================================
    // Sensor Errors
    // ========================================================================
    /// The sensor source does not exist on this host. Recovered locally:
    /// the affected field degrades to its unavailable representation.
    #[error("Sensor source not available: {path}")]
    SensorUnavailable { path: PathBuf },

    #[error("Failed to read sensor {path}: {source}")]
    SensorRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse {
        path: PathBuf,
        detail: String,
    },

    // ========================================================================
    // Actuator Errors
    // ========================================================================
    /// GPIO setup failure. Fatal at startup: the daemon must not run
    /// without its actuator.
    #[error("Failed to initialize GPIO pin {pin}: {reason}")]
    GpioInit {
        pin: u8,
        reason: String,
    },

    /// GPIO value-write failure at runtime. Non-fatal: logged by the
    /// monitor loop and retried on the next tick.
    #[error("Failed to write GPIO pin {pin}: {source}")]
    GpioWrite {
        pin: u8,
        source: io::Error,
    },

    // ========================================================================
    // Protocol and Input Errors
    // ========================================================================
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Malformed client input. Surfaced to the caller as a client-side
    /// error; never mutates state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IPC protocol error: {0}")]
    Protocol(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("{0}")]
    Generic(String),
}

impl PifanError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create an invalid-input error from a string
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<String> for PifanError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for PifanError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
