use thiserror::Error;

use crate::address::DeviceAddress;
use crate::attribute::Attribute;

/// Top-level error type for the `embermug-api` crate.
///
/// Covers both halves of the device boundary: the Bluetooth transport
/// (connect, read, write, notify) and the attribute codecs that turn raw
/// characteristic payloads into typed values. `embermug-core` maps these
/// into service-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Device ──────────────────────────────────────────────────────
    /// The peripheral does not expose the mug GATT service.
    #[error("Device {address} is not an Ember mug")]
    UnsupportedDevice { address: DeviceAddress },

    /// The mug does not expose the characteristic backing this attribute.
    #[error("Characteristic not supported by this mug: {0}")]
    UnsupportedCharacteristic(Attribute),

    /// No peripheral with this address is known to the adapter.
    #[error("Device {address} not found")]
    DeviceNotFound { address: DeviceAddress },

    /// The peripheral is not (or no longer) connected.
    #[error("Device not connected")]
    NotConnected,

    // ── Codec ───────────────────────────────────────────────────────
    /// A characteristic payload had the wrong shape for its attribute.
    #[error("Malformed {what} payload: {reason}")]
    MalformedData { what: &'static str, reason: String },

    /// The temperature-unit characteristic held a value other than 0 or 1.
    #[error("Unknown temperature unit: {0}")]
    UnknownTemperatureUnit(u8),

    /// Mug names are limited to 14 bytes.
    #[error("Name is {len} bytes long, the mug accepts at most 14")]
    NameTooLong { len: usize },

    /// A hardware address could not be parsed.
    #[error("Invalid device address '{0}', expected AA:BB:CC:DD:EE:FF")]
    InvalidAddress(String),

    // ── Transport ───────────────────────────────────────────────────
    /// Opaque failure reported by a transport backend.
    #[error("Bluetooth transport error: {0}")]
    Transport(String),

    /// Error bubbled up from the platform Bluetooth stack.
    #[cfg(feature = "btleplug")]
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),
}

impl Error {
    /// Returns `true` if the failure means the link to the device is gone.
    ///
    /// Teardown paths treat this as success: unsubscribing from or
    /// disconnecting an already-disconnected mug is not an error.
    pub fn is_disconnected(&self) -> bool {
        match self {
            Self::NotConnected => true,
            #[cfg(feature = "btleplug")]
            Self::Bluetooth(btleplug::Error::NotConnected) => true,
            _ => false,
        }
    }

    /// Returns `true` if the device answered but the payload was unusable.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedData { .. } | Self::UnknownTemperatureUnit(_)
        )
    }

    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedData {
            what,
            reason: reason.into(),
        }
    }
}
