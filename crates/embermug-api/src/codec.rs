// ── Attribute codecs ──
//
// Fixed-width little-endian encodings of the mug's characteristics.
// Every decoder checks the payload length first and reports a
// `MalformedData` error instead of reading past the end.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter};

use crate::error::Error;

/// Longest name the mug stores, in bytes.
pub const MAX_NAME_LEN: usize = 14;

fn exact<const N: usize>(what: &'static str, data: &[u8]) -> Result<[u8; N], Error> {
    <[u8; N]>::try_from(data)
        .map_err(|_| Error::malformed(what, format!("expected {N} bytes, got {}", data.len())))
}

// ── Temperature ─────────────────────────────────────────────────────

/// Temperature in hundredths of a degree Celsius, as the mug reports it.
///
/// Serializes as the raw integer so `2130` on the wire means 21.30 °C.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(u16);

impl Temperature {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    pub fn from_celsius(degrees: f64) -> Self {
        Self((degrees * 100.0).round().clamp(0.0, f64::from(u16::MAX)) as u16)
    }

    pub fn from_fahrenheit(degrees: f64) -> Self {
        Self::from_celsius((degrees - 32.0) * 5.0 / 9.0)
    }

    pub fn celsius(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    pub fn fahrenheit(self) -> f64 {
        32.0 + f64::from(self.0) * 9.0 / 500.0
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        exact::<2>("temperature", data).map(|b| Self(u16::from_le_bytes(b)))
    }

    pub fn encode(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}°C", self.celsius())
    }
}

// ── Temperature unit ────────────────────────────────────────────────

/// Display unit configured on the mug (affects the companion app only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[strum(serialize = "C")]
    Celsius,
    #[strum(serialize = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        match exact::<1>("temperature unit", data)? {
            [0] => Ok(Self::Celsius),
            [1] => Ok(Self::Fahrenheit),
            [other] => Err(Error::UnknownTemperatureUnit(other)),
        }
    }

    pub fn encode(self) -> [u8; 1] {
        match self {
            Self::Celsius => [0],
            Self::Fahrenheit => [1],
        }
    }
}

// ── Battery ─────────────────────────────────────────────────────────

/// Decoded battery characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatteryState {
    /// Percent charged (0-100).
    pub charge: u8,
    /// Whether the mug sits on its charging coaster.
    pub charging: bool,
    pub temperature: Temperature,
    /// Legacy field, still reported by older firmware.
    pub voltage: u8,
}

impl BatteryState {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let [charge, charging, t_lo, t_hi, voltage] = exact::<5>("battery", data)?;
        Ok(Self {
            charge,
            charging: charging == 1,
            temperature: Temperature(u16::from_le_bytes([t_lo, t_hi])),
            voltage,
        })
    }

    pub fn encode(self) -> [u8; 5] {
        let [t_lo, t_hi] = self.temperature.encode();
        [self.charge, u8::from(self.charging), t_lo, t_hi, self.voltage]
    }
}

// ── Liquid state ────────────────────────────────────────────────────

/// What the mug is currently doing with its contents.
///
/// Values outside the documented range are kept verbatim so they still
/// round-trip to consumers; they display as `invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiquidState {
    Empty,
    Filling,
    Unknown,
    Cooling,
    Heating,
    Stable,
    Invalid(u8),
}

impl Default for LiquidState {
    /// The state of a mug that was never read.
    fn default() -> Self {
        Self::Invalid(0)
    }
}

impl From<u8> for LiquidState {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::Empty,
            2 => Self::Filling,
            3 => Self::Unknown,
            4 => Self::Cooling,
            5 => Self::Heating,
            6 => Self::Stable,
            other => Self::Invalid(other),
        }
    }
}

impl From<LiquidState> for u8 {
    fn from(state: LiquidState) -> Self {
        match state {
            LiquidState::Empty => 1,
            LiquidState::Filling => 2,
            LiquidState::Unknown => 3,
            LiquidState::Cooling => 4,
            LiquidState::Heating => 5,
            LiquidState::Stable => 6,
            LiquidState::Invalid(raw) => raw,
        }
    }
}

impl LiquidState {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let [raw] = exact::<1>("liquid state", data)?;
        Ok(Self::from(raw))
    }
}

impl fmt::Display for LiquidState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Filling => "filling",
            Self::Unknown => "unknown",
            Self::Cooling => "cooling",
            Self::Heating => "heating",
            Self::Stable => "stable",
            Self::Invalid(_) => "invalid",
        })
    }
}

impl Serialize for LiquidState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*self))
    }
}

impl<'de> Deserialize<'de> for LiquidState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from)
    }
}

// ── Liquid level ────────────────────────────────────────────────────

/// Decode the liquid-level characteristic into "is there anything in the mug".
pub fn decode_has_liquid(data: &[u8]) -> Result<bool, Error> {
    let [level] = exact::<1>("liquid level", data)?;
    Ok(level > 0)
}

// ── Events ──────────────────────────────────────────────────────────

/// Push notification from the mug's event characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Event {
    RefreshBattery,
    Charging,
    NotCharging,
    RefreshTarget,
    RefreshTemperature,
    /// Documented by the firmware but never acted on.
    NotImplemented,
    RefreshLevel,
    RefreshState,
}

impl Event {
    /// Decode the first byte of a notification. Trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let Some(&code) = data.first() else {
            return Err(Error::malformed("event", "empty notification"));
        };
        match code {
            1 => Ok(Self::RefreshBattery),
            2 => Ok(Self::Charging),
            3 => Ok(Self::NotCharging),
            4 => Ok(Self::RefreshTarget),
            5 => Ok(Self::RefreshTemperature),
            6 => Ok(Self::NotImplemented),
            7 => Ok(Self::RefreshLevel),
            8 => Ok(Self::RefreshState),
            other => Err(Error::malformed("event", format!("unknown event code {other}"))),
        }
    }

    pub fn encode(self) -> [u8; 1] {
        [match self {
            Self::RefreshBattery => 1,
            Self::Charging => 2,
            Self::NotCharging => 3,
            Self::RefreshTarget => 4,
            Self::RefreshTemperature => 5,
            Self::NotImplemented => 6,
            Self::RefreshLevel => 7,
            Self::RefreshState => 8,
        }]
    }
}

// ── Colour ──────────────────────────────────────────────────────────

/// LED colour, RGBA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let [r, g, b, a] = exact::<4>("color", data)?;
        Ok(Self { r, g, b, a })
    }

    pub fn encode(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

// ── Version ─────────────────────────────────────────────────────────

/// Firmware and hardware revisions. Older mugs omit the bootloader field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub firmware: u16,
    pub hardware: u16,
    pub bootloader: u16,
}

impl VersionInfo {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        match *data {
            [f0, f1, h0, h1] => Ok(Self {
                firmware: u16::from_le_bytes([f0, f1]),
                hardware: u16::from_le_bytes([h0, h1]),
                bootloader: 0,
            }),
            [f0, f1, h0, h1, b0, b1] => Ok(Self {
                firmware: u16::from_le_bytes([f0, f1]),
                hardware: u16::from_le_bytes([h0, h1]),
                bootloader: u16::from_le_bytes([b0, b1]),
            }),
            _ => Err(Error::malformed(
                "version",
                format!("expected 4 or 6 bytes, got {}", data.len()),
            )),
        }
    }
}

// ── Name ────────────────────────────────────────────────────────────

pub fn decode_name(data: &[u8]) -> Result<String, Error> {
    let data = data.get(..MAX_NAME_LEN).unwrap_or(data);
    String::from_utf8(data.to_vec()).map_err(|e| Error::malformed("name", e.to_string()))
}

pub fn encode_name(name: &str) -> Result<Vec<u8>, Error> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong { len: name.len() });
    }
    Ok(name.as_bytes().to_vec())
}

// ── Date / time ─────────────────────────────────────────────────────

/// Unix timestamp (u32 LE) followed by the UTC offset in whole hours.
pub fn encode_time(time: &DateTime<FixedOffset>) -> Result<[u8; 5], Error> {
    let timestamp = u32::try_from(time.timestamp())
        .map_err(|_| Error::malformed("date-time", "timestamp outside the 32-bit range"))?;
    let hours = i8::try_from(time.offset().local_minus_utc() / 3600)
        .map_err(|_| Error::malformed("date-time", "UTC offset out of range"))?;

    let [t0, t1, t2, t3] = timestamp.to_le_bytes();
    let [offset] = hours.to_le_bytes();
    Ok([t0, t1, t2, t3, offset])
}
