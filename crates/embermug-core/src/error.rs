// ── Core error types ──
//
// Service-level errors. Transport and codec failures from embermug-api
// are translated into these by the `From` impl below; device-scoped and
// client-scoped failures never escape their own scope, so only connect
// failures, socket errors and shutdown races reach callers.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device errors ────────────────────────────────────────────────
    #[error("Cannot connect to mug {address} after {attempts} attempt(s): {reason}")]
    ConnectionFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Device {address} is not an Ember mug")]
    UnsupportedDevice { address: String },

    #[error("Mug disconnected")]
    DeviceDisconnected,

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Malformed device data: {message}")]
    MalformedData { message: String },

    // ── Client / socket errors ───────────────────────────────────────
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Connection manager has shut down")]
    ManagerStopped,
}

impl CoreError {
    /// Returns `true` for the client-side hangups that end a session quietly.
    pub fn is_hangup(&self) -> bool {
        match self {
            Self::Io(e) => is_hangup(e),
            _ => false,
        }
    }
}

/// Broken pipe and resets mean the consumer went away, which is routine.
pub(crate) fn is_hangup(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<embermug_api::Error> for CoreError {
    fn from(err: embermug_api::Error) -> Self {
        if err.is_disconnected() {
            return CoreError::DeviceDisconnected;
        }
        if err.is_malformed() {
            return CoreError::MalformedData {
                message: err.to_string(),
            };
        }
        match err {
            embermug_api::Error::UnsupportedDevice { address } => CoreError::UnsupportedDevice {
                address: address.to_string(),
            },
            other => CoreError::Device {
                message: other.to_string(),
            },
        }
    }
}
