// ── Wire protocol ──
//
// Newline-delimited JSON over the service socket. The server writes one
// `Snapshot` object per line, immediately on connect and again after
// every change; clients may write `Message` lines back. Field names and
// order are fixed by existing consumers and must not change.

use embermug_api::{BatteryState, LiquidState, Temperature};
use serde::{Deserialize, Serialize};

/// Longest line accepted from a client.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Last known state of the mug.
///
/// When `connected` is false the remaining fields keep their last observed
/// values; they are only zero for a service that has never connected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Connected")]
    pub connected: bool,

    #[serde(rename = "State")]
    pub state: LiquidState,

    #[serde(rename = "Target")]
    pub target: Temperature,

    #[serde(rename = "Current")]
    pub current: Temperature,

    #[serde(rename = "Battery")]
    pub battery: BatteryState,

    #[serde(rename = "HasLiquid")]
    pub has_liquid: bool,
}

/// Control message sent by a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Ask the service to connect to the mug again.
    #[serde(rename = "Reconnect", alias = "reconnect", default)]
    pub reconnect: bool,
}

impl Message {
    pub fn reconnect() -> Self {
        Self { reconnect: true }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_wire_format() {
        let snapshot = Snapshot {
            connected: true,
            state: LiquidState::Stable,
            target: Temperature::from_raw(5500),
            current: Temperature::from_raw(2130),
            battery: BatteryState {
                charge: 87,
                charging: true,
                temperature: Temperature::from_raw(3300),
                voltage: 0,
            },
            has_liquid: true,
        };
        insta::assert_snapshot!(
            serde_json::to_string(&snapshot).unwrap(),
            @r#"{"Connected":true,"State":6,"Target":5500,"Current":2130,"Battery":{"Charge":87,"Charging":true,"Temperature":3300,"Voltage":0},"HasLiquid":true}"#
        );
    }

    #[test]
    fn never_connected_snapshot_is_all_zero() {
        insta::assert_snapshot!(
            serde_json::to_string(&Snapshot::default()).unwrap(),
            @r#"{"Connected":false,"State":0,"Target":0,"Current":0,"Battery":{"Charge":0,"Charging":false,"Temperature":0,"Voltage":0},"HasLiquid":false}"#
        );
    }

    #[test]
    fn message_field_is_case_insensitive_enough() {
        let upper: Message = serde_json::from_str(r#"{"Reconnect":true}"#).unwrap();
        let lower: Message = serde_json::from_str(r#"{"reconnect":true}"#).unwrap();
        let empty: Message = serde_json::from_str("{}").unwrap();
        let extra: Message = serde_json::from_str(r#"{"Reconnect":true,"Other":1}"#).unwrap();
        assert!(upper.reconnect && lower.reconnect && extra.reconnect);
        assert!(!empty.reconnect);
        assert!(serde_json::from_str::<Message>(r#"{"Reconnect":"yes"}"#).is_err());
    }
}
