// ── Service configuration ──
//
// What the core needs to run. Built by `embermug-config` from TOML and
// environment, or directly by tests. The core never reads files itself.

use embermug_api::DeviceAddress;

/// Connect attempts before `connect()` gives up.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// The one mug this service follows. Events for other devices are ignored.
    pub address: DeviceAddress,

    /// Attempts per `connect()` call. There is no delay between attempts
    /// beyond what the Bluetooth stack imposes.
    pub connect_attempts: u32,
}

impl ServiceConfig {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }
}
