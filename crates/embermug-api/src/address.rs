// ── Bluetooth hardware address ──
//
// The service is pinned to one mug, identified by its 48-bit address.
// Parsing accepts the common textual forms; display is always the
// canonical upper-case colon form that BlueZ and btleplug print.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A six-byte Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for DeviceAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    /// Accepts colon-separated, dash-separated, or bare hex, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAddress(s.to_owned());

        let hex: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-'))
            .collect();
        if hex.len() != 12 || !hex.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, pair) in bytes.iter_mut().zip(hex.as_bytes().chunks(2)) {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            *slot = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_form_case_insensitively() {
        let addr: DeviceAddress = "c8:6e:14:a0:3b:7f".parse().unwrap();
        assert_eq!(addr.octets(), [0xC8, 0x6E, 0x14, 0xA0, 0x3B, 0x7F]);
        assert_eq!(addr.to_string(), "C8:6E:14:A0:3B:7F");
    }

    #[test]
    fn parses_dash_and_bare_forms() {
        let dashed: DeviceAddress = "C8-6E-14-A0-3B-7F".parse().unwrap();
        let bare: DeviceAddress = "c86e14a03b7f".parse().unwrap();
        assert_eq!(dashed, bare);
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!("C8:6E:14:A0:3B".parse::<DeviceAddress>().is_err());
        assert!("C8:6E:14:A0:3B:ZZ".parse::<DeviceAddress>().is_err());
        assert!("".parse::<DeviceAddress>().is_err());
        assert!("é8:6E:14:A0:3B:7F".parse::<DeviceAddress>().is_err());
    }
}
