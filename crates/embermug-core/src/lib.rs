//! Service core between `embermug-api` and socket consumers.
//!
//! - **[`ConnectionManager`]** -- Owns the device address, connects with a
//!   bounded retry, and reacts to connectivity events from the adapter. A
//!   single actor task holds the live [`Mug`](embermug_api::Mug) session
//!   and the [`StateTracker`], so refreshes, events and disconnects are
//!   applied strictly one after another.
//!
//! - **[`StateTracker`]** -- The authoritative [`Snapshot`]. Applies a full
//!   refresh after (re)connect or a single-attribute update per device
//!   event, and reports whether anything actually changed.
//!
//! - **[`ClientRegistry`]** -- The set of subscribed consumers, each with a
//!   bounded mailbox and cancellation scope. [`dispatch`](ClientRegistry::dispatch)
//!   delivers every snapshot to all of them in order; a full mailbox holds
//!   it up only until that client's scope is cancelled.
//!
//! - **[`session`]** -- The per-connection state machine speaking the
//!   newline-delimited JSON protocol ([`Snapshot`] out, [`Message`] in).
//!
//! - **[`Service`]** -- Accept loop tying the above to a Unix listener, with
//!   orderly shutdown. [`monitor()`] is the single-consumer variant.

pub mod config;
pub mod connection;
pub mod error;
pub mod monitor;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod session;
pub mod tracker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_CONNECT_ATTEMPTS, ServiceConfig};
pub use connection::{ConnectionManager, ManagerStatus};
pub use error::CoreError;
pub use monitor::monitor;
pub use protocol::{Message, Snapshot};
pub use registry::{Client, ClientRegistry};
pub use service::Service;
pub use tracker::StateTracker;
