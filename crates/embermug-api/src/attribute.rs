// ── GATT layout of the mug ──
//
// Every mug characteristic lives under one primary service and shares the
// service's base UUID, differing only in the low byte of the first group.

use strum::{Display, EnumIter};
use uuid::Uuid;

/// Primary GATT service advertised by every Ember mug.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xfc54_3622_236c_4c94_8fa9_944a_3e53_53fa);

const CHARACTERISTIC_BASE: u128 = 0xfc54_0000_236c_4c94_8fa9_944a_3e53_53fa;

/// A readable/writable/notifiable mug characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Attribute {
    Name,
    CurrentTemperature,
    TargetTemperature,
    TemperatureUnit,
    LiquidLevel,
    DateTime,
    Battery,
    LiquidState,
    Version,
    Events,
    Color,
}

impl Attribute {
    /// Low byte of the characteristic UUID's first group.
    const fn code(self) -> u128 {
        match self {
            Self::Name => 0x01,
            Self::CurrentTemperature => 0x02,
            Self::TargetTemperature => 0x03,
            Self::TemperatureUnit => 0x04,
            Self::LiquidLevel => 0x05,
            Self::DateTime => 0x06,
            Self::Battery => 0x07,
            Self::LiquidState => 0x08,
            Self::Version => 0x0c,
            Self::Events => 0x12,
            Self::Color => 0x14,
        }
    }

    pub const fn uuid(self) -> Uuid {
        Uuid::from_u128(CHARACTERISTIC_BASE | (self.code() << 96))
    }

    /// Reverse lookup used by backends that only hand back a UUID.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|attr| attr.uuid() == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characteristic_uuids_follow_the_service_base() {
        assert_eq!(
            Attribute::CurrentTemperature.uuid().to_string(),
            "fc540002-236c-4c94-8fa9-944a3e5353fa"
        );
        assert_eq!(
            Attribute::Events.uuid().to_string(),
            "fc540012-236c-4c94-8fa9-944a3e5353fa"
        );
        assert_eq!(
            SERVICE_UUID.to_string(),
            "fc543622-236c-4c94-8fa9-944a3e5353fa"
        );
    }

    #[test]
    fn uuid_lookup_round_trips_every_attribute() {
        use strum::IntoEnumIterator;
        for attr in Attribute::iter() {
            assert_eq!(Attribute::from_uuid(attr.uuid()), Some(attr));
        }
        assert_eq!(Attribute::from_uuid(SERVICE_UUID), None);
    }
}
