//! Device boundary for Ember temperature-control mugs.
//!
//! This crate owns everything that touches the mug over Bluetooth LE:
//!
//! - **[`transport`]** -- Capability traits ([`Adapter`], [`Peripheral`]) the
//!   rest of the workspace programs against. A backend supplies connect,
//!   per-characteristic read/write/notify, and a connectivity event stream
//!   that reports *every* device the stack sees.
//!
//! - **[`codec`]** -- Fixed-width little-endian encode/decode for the mug's
//!   GATT characteristics: temperatures, battery, liquid state, events,
//!   colour, firmware versions.
//!
//! - **[`Mug`]** -- A typed session over one connected peripheral, with
//!   getters/setters built on the codec and an event-notification stream.
//!
//! - **[`mock`]** (feature `mock`) -- A scriptable in-memory transport used by
//!   the service tests.
//!
//! - **[`bluetooth`]** (feature `btleplug`) -- The real backend over the
//!   platform Bluetooth stack.

pub mod address;
pub mod attribute;
pub mod codec;
pub mod error;
pub mod mug;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "btleplug")]
pub mod bluetooth;

// ── Primary re-exports ──────────────────────────────────────────────
pub use address::DeviceAddress;
pub use attribute::{Attribute, SERVICE_UUID};
pub use codec::{BatteryState, Color, Event, LiquidState, Temperature, TemperatureUnit, VersionInfo};
pub use error::Error;
pub use mug::{EventStream, Mug};
pub use transport::{Adapter, Advertisement, ConnectivityEvent, Peripheral, scan_for_mugs};
