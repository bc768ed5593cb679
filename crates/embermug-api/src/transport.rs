// ── Transport capability ──
//
// The narrow surface the service needs from a Bluetooth LE stack. A
// backend (btleplug, the in-memory mock) implements these two traits;
// nothing above this module knows which one is in use.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::address::DeviceAddress;
use crate::attribute::SERVICE_UUID;
use crate::error::Error;

/// One advertisement seen while scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub address: DeviceAddress,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
}

/// A connect or disconnect observed by the adapter.
///
/// Adapters report these for every device they see, not just the one the
/// service cares about. Consumers must filter on `peripheral.address()`.
#[derive(Debug, Clone)]
pub struct ConnectivityEvent<P> {
    pub peripheral: P,
    pub connected: bool,
}

/// A local Bluetooth adapter.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    type Peripheral: Peripheral;

    /// Scan for advertisements carrying `service`. The stream runs until
    /// dropped; calling `scan` again starts a fresh scan.
    async fn scan(&self, service: Uuid) -> Result<BoxStream<'static, Advertisement>, Error>;

    /// Establish a link to the device at `address`.
    async fn connect(&self, address: DeviceAddress) -> Result<Self::Peripheral, Error>;

    /// Subscribe to connect/disconnect notifications for all devices.
    async fn connectivity(
        &self,
    ) -> Result<BoxStream<'static, ConnectivityEvent<Self::Peripheral>>, Error>;
}

/// A (possibly) connected remote device.
#[async_trait]
pub trait Peripheral: Clone + Send + Sync + 'static {
    fn address(&self) -> DeviceAddress;

    /// Discover `service` and list its characteristics, or `None` when the
    /// device does not expose it.
    async fn discover(&self, service: Uuid) -> Result<Option<Vec<Uuid>>, Error>;

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, Error>;

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), Error>;

    /// Enable notifications and stream each payload as it arrives.
    async fn subscribe(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, Error>;

    /// Disable notifications. Open streams from `subscribe` end.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), Error>;

    async fn disconnect(&self) -> Result<(), Error>;
}

/// Scan for anything advertising the mug service.
///
/// The filter is applied here as well as in the adapter, since some
/// stacks deliver unfiltered results regardless of the scan filter.
pub async fn scan_for_mugs<A: Adapter>(
    adapter: &A,
) -> Result<BoxStream<'static, Advertisement>, Error> {
    let stream = adapter.scan(SERVICE_UUID).await?;
    Ok(stream
        .filter(|adv| std::future::ready(adv.services.contains(&SERVICE_UUID)))
        .boxed())
}
