//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable
//! help text and stable exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use embermug_config::ConfigError;
use embermug_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    /// `EX_CONFIG` from sysexits.h.
    pub const CONFIG: i32 = 78;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Device ───────────────────────────────────────────────────────
    #[error("Could not connect to mug {address} after {attempts} attempt(s)")]
    #[diagnostic(
        code(embermug::connection_failed),
        help(
            "Make sure the mug is awake (lift it or press the base) and in range.\n\
             Last error: {reason}"
        )
    )]
    ConnectionFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Device {address} is not an Ember mug")]
    #[diagnostic(
        code(embermug::unsupported_device),
        help("The device does not expose the Ember GATT service. Check the address.")
    )]
    UnsupportedDevice { address: String },

    #[cfg(not(feature = "bluetooth"))]
    #[error("Bluetooth support is not compiled in")]
    #[diagnostic(
        code(embermug::bluetooth_unavailable),
        help(
            "'{command}' talks to the mug directly. Rebuild with:\n\
             cargo install embermug --features bluetooth"
        )
    )]
    BluetoothUnavailable { command: String },

    // ── Service socket ───────────────────────────────────────────────
    #[error("Cannot reach the embermug service at {}", path.display())]
    #[diagnostic(
        code(embermug::service_unavailable),
        help("Start it with: embermug service\nOr point at its socket with --socket")
    )]
    ServiceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Another service is already listening on {}", path.display())]
    #[diagnostic(
        code(embermug::socket_in_use),
        help("Stop the other instance or pick a different --socket")
    )]
    SocketInUse { path: PathBuf },

    #[error("Service error: {message}")]
    #[diagnostic(code(embermug::service))]
    Service { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No mug address configured")]
    #[diagnostic(
        code(embermug::missing_address),
        help(
            "Pass the address as an argument, set EMBER_SERVICE__DEVICE_ADDRESS,\n\
             or add to {path}:\n\n    [service]\n    device-address = \"C8:6E:14:A0:3B:7F\""
        )
    )]
    MissingAddress { path: String },

    #[error(transparent)]
    #[diagnostic(code(embermug::config))]
    Config(ConfigError),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(embermug::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON from service: {0}")]
    #[diagnostic(code(embermug::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ServiceUnavailable { .. } => {
                exit_code::CONNECTION
            }
            Self::MissingAddress { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingAddress => CliError::MissingAddress {
                path: embermug_config::config_path().display().to_string(),
            },
            other => CliError::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed {
                address,
                attempts,
                reason,
            } => CliError::ConnectionFailed {
                address,
                attempts,
                reason,
            },
            CoreError::UnsupportedDevice { address } => CliError::UnsupportedDevice { address },
            CoreError::Io(e) => CliError::Io(e),
            other => CliError::Service {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let connect = CliError::from(CoreError::ConnectionFailed {
            address: "C8:6E:14:A0:3B:7F".into(),
            attempts: 10,
            reason: "timeout".into(),
        });
        assert_eq!(connect.exit_code(), exit_code::CONNECTION);

        let missing = CliError::from(ConfigError::MissingAddress);
        assert!(matches!(missing, CliError::MissingAddress { .. }));
        assert_eq!(missing.exit_code(), exit_code::CONFIG);

        let usage = CliError::Validation {
            field: "ADDRESS".into(),
            reason: "nope".into(),
        };
        assert_eq!(usage.exit_code(), exit_code::USAGE);
        assert_eq!(
            CliError::from(CoreError::ManagerStopped).exit_code(),
            exit_code::GENERAL
        );
    }
}
