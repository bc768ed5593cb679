//! Transport backend over the platform Bluetooth stack (btleplug).
//!
//! Uses the first adapter the platform manager reports. Connecting to a
//! mug the stack has not seen yet runs a short scan filtered on the mug
//! service before giving up.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter as PlatformAdapter, Manager, Peripheral as PlatformPeripheral};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::address::DeviceAddress;
use crate::attribute::SERVICE_UUID;
use crate::error::Error;
use crate::transport::{Adapter, Advertisement, ConnectivityEvent, Peripheral};

/// How long `connect` scans for an unknown device.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DISCOVERY_POLL: Duration = Duration::from_millis(250);

fn to_address(addr: BDAddr) -> DeviceAddress {
    DeviceAddress::new(addr.into_inner())
}

// ── Adapter ─────────────────────────────────────────────────────────

/// The host's Bluetooth adapter.
#[derive(Clone)]
pub struct BluetoothAdapter {
    inner: PlatformAdapter,
}

impl BluetoothAdapter {
    /// Open the first adapter the platform reports.
    pub async fn first() -> Result<Self, Error> {
        let manager = Manager::new().await?;
        let inner = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("no Bluetooth adapter found".into()))?;
        Ok(Self { inner })
    }

    async fn find(&self, address: DeviceAddress) -> Result<Option<PlatformPeripheral>, Error> {
        Ok(self
            .inner
            .peripherals()
            .await?
            .into_iter()
            .find(|p| to_address(p.address()) == address))
    }

    async fn discover(&self, address: DeviceAddress) -> Result<PlatformPeripheral, Error> {
        self.inner
            .start_scan(ScanFilter {
                services: vec![SERVICE_UUID],
            })
            .await?;

        let found = tokio::time::timeout(DISCOVERY_TIMEOUT, async {
            loop {
                if let Some(peripheral) = self.find(address).await? {
                    return Ok::<_, Error>(peripheral);
                }
                tokio::time::sleep(DISCOVERY_POLL).await;
            }
        })
        .await;

        if let Err(e) = self.inner.stop_scan().await {
            debug!(error = %e, "failed to stop scan");
        }

        match found {
            Ok(result) => result,
            Err(_) => Err(Error::DeviceNotFound { address }),
        }
    }

    async fn wrap(&self, id: &btleplug::platform::PeripheralId) -> Option<BluetoothPeripheral> {
        match self.inner.peripheral(id).await {
            Ok(inner) => Some(BluetoothPeripheral::new(inner)),
            Err(e) => {
                debug!(error = %e, "event for a peripheral the adapter no longer knows");
                None
            }
        }
    }
}

#[async_trait]
impl Adapter for BluetoothAdapter {
    type Peripheral = BluetoothPeripheral;

    async fn scan(&self, service: Uuid) -> Result<BoxStream<'static, Advertisement>, Error> {
        let mut events = self.inner.events().await?;
        self.inner
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;

        let adapter = self.clone();
        Ok(async_stream::stream! {
            while let Some(event) = events.next().await {
                let (CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) = event else {
                    continue;
                };
                let Ok(peripheral) = adapter.inner.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                yield Advertisement {
                    address: to_address(props.address),
                    local_name: props.local_name,
                    rssi: props.rssi,
                    services: props.services,
                };
            }
        }
        .boxed())
    }

    async fn connect(&self, address: DeviceAddress) -> Result<BluetoothPeripheral, Error> {
        let inner = match self.find(address).await? {
            Some(peripheral) => peripheral,
            None => self.discover(address).await?,
        };
        if !inner.is_connected().await? {
            inner.connect().await?;
        }
        Ok(BluetoothPeripheral::new(inner))
    }

    async fn connectivity(
        &self,
    ) -> Result<BoxStream<'static, ConnectivityEvent<BluetoothPeripheral>>, Error> {
        let mut events = self.inner.events().await?;
        let adapter = self.clone();
        Ok(async_stream::stream! {
            while let Some(event) = events.next().await {
                let (id, connected) = match event {
                    CentralEvent::DeviceConnected(id) => (id, true),
                    CentralEvent::DeviceDisconnected(id) => (id, false),
                    _ => continue,
                };
                if let Some(peripheral) = adapter.wrap(&id).await {
                    yield ConnectivityEvent { peripheral, connected };
                }
            }
            warn!("adapter event stream ended");
        }
        .boxed())
    }
}

// ── Peripheral ──────────────────────────────────────────────────────

/// A remote device known to the host adapter.
#[derive(Clone)]
pub struct BluetoothPeripheral {
    inner: PlatformPeripheral,
    address: DeviceAddress,
}

impl BluetoothPeripheral {
    fn new(inner: PlatformPeripheral) -> Self {
        let address = to_address(inner.address());
        Self { inner, address }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, Error> {
        self.inner
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::Transport(format!("characteristic {uuid} not discovered")))
    }
}

#[async_trait]
impl Peripheral for BluetoothPeripheral {
    fn address(&self) -> DeviceAddress {
        self.address
    }

    async fn discover(&self, service: Uuid) -> Result<Option<Vec<Uuid>>, Error> {
        self.inner.discover_services().await?;
        Ok(self
            .inner
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| s.characteristics.into_iter().map(|c| c.uuid).collect()))
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, Error> {
        let ch = self.characteristic(characteristic)?;
        Ok(self.inner.read(&ch).await?)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), Error> {
        let ch = self.characteristic(characteristic)?;
        Ok(self
            .inner
            .write(&ch, data, WriteType::WithoutResponse)
            .await?)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, Error> {
        let ch = self.characteristic(characteristic)?;
        let notifications = self.inner.notifications().await?;
        self.inner.subscribe(&ch).await?;
        Ok(notifications
            .filter_map(move |n| std::future::ready((n.uuid == characteristic).then_some(n.value)))
            .boxed())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), Error> {
        let ch = self.characteristic(characteristic)?;
        Ok(self.inner.unsubscribe(&ch).await?)
    }

    async fn disconnect(&self) -> Result<(), Error> {
        Ok(self.inner.disconnect().await?)
    }
}
