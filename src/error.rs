//! Error types for the ble-prober crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The address could not be parsed or resolved to a device.
    #[error("Invalid address: {address}")]
    InvalidAddress {
        /// The address as supplied by the caller.
        address: String,
    },

    /// Another scan or probe currently holds the radio.
    #[error("Radio is busy")]
    Busy,

    /// The radio controller is temporarily saturated or resetting.
    ///
    /// Retried inside the connection manager and never returned from a probe.
    #[error("Radio temporarily unavailable: {reason}")]
    TransientRadio {
        /// Backend-specific description of the condition.
        reason: String,
    },

    /// Failed to establish a connection to the peer.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The peer did not accept the connection in time.
    #[error("Connection timed out after {timeout:?}")]
    ConnectionTimeout {
        /// The per-attempt timeout that elapsed.
        timeout: Duration,
    },

    /// The advertisement stream failed mid-scan.
    #[error("Scan channel error: {reason}")]
    ScanChannel {
        /// Description of the failure.
        reason: String,
    },

    /// The peer's GATT table could not be walked.
    #[error("Enumeration error: {context}")]
    Enumeration {
        /// What was being read when the failure happened.
        context: String,
    },

    /// The probe log could not be written.
    #[error("Failed to write probe log {path:?}: {source}")]
    LogWrite {
        /// Path of the log file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the connection manager should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientRadio { .. })
    }

    /// Whether this error is a connection timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
