// ── Mug session ──
//
// Typed access to one connected mug. Construction discovers the mug
// service once and remembers which characteristics the firmware exposes,
// so an attribute the model lacks fails fast without a round-trip.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::debug;
use uuid::Uuid;

use crate::address::DeviceAddress;
use crate::attribute::{Attribute, SERVICE_UUID};
use crate::codec::{
    self, BatteryState, Color, Event, LiquidState, Temperature, TemperatureUnit, VersionInfo,
};
use crate::error::Error;
use crate::transport::Peripheral;

/// Decoded event notifications. A malformed payload surfaces as an `Err`
/// item; the stream keeps going.
pub type EventStream = BoxStream<'static, Result<Event, Error>>;

/// A connected Ember mug.
#[derive(Debug, Clone)]
pub struct Mug<P> {
    peripheral: P,
    characteristics: HashSet<Uuid>,
}

impl<P: Peripheral> Mug<P> {
    /// Wrap a connected peripheral, failing with [`Error::UnsupportedDevice`]
    /// when it does not expose the mug service.
    pub async fn new(peripheral: P) -> Result<Self, Error> {
        let Some(characteristics) = peripheral.discover(SERVICE_UUID).await? else {
            return Err(Error::UnsupportedDevice {
                address: peripheral.address(),
            });
        };
        debug!(
            address = %peripheral.address(),
            characteristics = characteristics.len(),
            "discovered mug service"
        );

        Ok(Self {
            peripheral,
            characteristics: characteristics.into_iter().collect(),
        })
    }

    pub fn address(&self) -> DeviceAddress {
        self.peripheral.address()
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn supports(&self, attribute: Attribute) -> bool {
        self.characteristics.contains(&attribute.uuid())
    }

    fn require(&self, attribute: Attribute) -> Result<Uuid, Error> {
        if self.supports(attribute) {
            Ok(attribute.uuid())
        } else {
            Err(Error::UnsupportedCharacteristic(attribute))
        }
    }

    async fn read(&self, attribute: Attribute) -> Result<Vec<u8>, Error> {
        let uuid = self.require(attribute)?;
        self.peripheral.read(uuid).await
    }

    async fn write(&self, attribute: Attribute, data: &[u8]) -> Result<(), Error> {
        let uuid = self.require(attribute)?;
        self.peripheral.write(uuid, data).await
    }

    // ── Getters ─────────────────────────────────────────────────────

    pub async fn liquid_state(&self) -> Result<LiquidState, Error> {
        LiquidState::decode(&self.read(Attribute::LiquidState).await?)
    }

    pub async fn current_temperature(&self) -> Result<Temperature, Error> {
        Temperature::decode(&self.read(Attribute::CurrentTemperature).await?)
    }

    pub async fn target_temperature(&self) -> Result<Temperature, Error> {
        Temperature::decode(&self.read(Attribute::TargetTemperature).await?)
    }

    pub async fn temperature_unit(&self) -> Result<TemperatureUnit, Error> {
        TemperatureUnit::decode(&self.read(Attribute::TemperatureUnit).await?)
    }

    pub async fn battery(&self) -> Result<BatteryState, Error> {
        BatteryState::decode(&self.read(Attribute::Battery).await?)
    }

    pub async fn has_liquid(&self) -> Result<bool, Error> {
        codec::decode_has_liquid(&self.read(Attribute::LiquidLevel).await?)
    }

    pub async fn name(&self) -> Result<String, Error> {
        codec::decode_name(&self.read(Attribute::Name).await?)
    }

    pub async fn color(&self) -> Result<Color, Error> {
        Color::decode(&self.read(Attribute::Color).await?)
    }

    pub async fn version(&self) -> Result<VersionInfo, Error> {
        VersionInfo::decode(&self.read(Attribute::Version).await?)
    }

    // ── Setters ─────────────────────────────────────────────────────

    pub async fn set_target_temperature(&self, temperature: Temperature) -> Result<(), Error> {
        self.write(Attribute::TargetTemperature, &temperature.encode())
            .await
    }

    pub async fn set_temperature_unit(&self, unit: TemperatureUnit) -> Result<(), Error> {
        self.write(Attribute::TemperatureUnit, &unit.encode()).await
    }

    pub async fn set_name(&self, name: &str) -> Result<(), Error> {
        let data = codec::encode_name(name)?;
        self.write(Attribute::Name, &data).await
    }

    pub async fn set_color(&self, color: Color) -> Result<(), Error> {
        self.write(Attribute::Color, &color.encode()).await
    }

    pub async fn set_time(&self, time: &DateTime<FixedOffset>) -> Result<(), Error> {
        let data = codec::encode_time(time)?;
        self.write(Attribute::DateTime, &data).await
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Enable event notifications and decode them as they arrive.
    ///
    /// The stream ends when notifications are stopped or the link drops.
    pub async fn events(&self) -> Result<EventStream, Error> {
        let uuid = self.require(Attribute::Events)?;
        let raw = self.peripheral.subscribe(uuid).await?;
        Ok(raw.map(|payload| Event::decode(&payload)).boxed())
    }

    pub async fn stop_events(&self) -> Result<(), Error> {
        let uuid = self.require(Attribute::Events)?;
        self.peripheral.unsubscribe(uuid).await
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.peripheral.disconnect().await
    }
}
