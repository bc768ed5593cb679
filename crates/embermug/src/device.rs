// ── Device access ──
//
// Opens the transport for commands that talk to the mug. With the
// `bluetooth` feature this is the platform stack; without it `open`
// always fails, and `Unavailable` stands in as an adapter type that can
// never be constructed so the command code type-checks either way.

use crate::error::CliError;

#[cfg(feature = "bluetooth")]
use embermug_api::bluetooth::BluetoothAdapter;

#[cfg(feature = "bluetooth")]
pub async fn open(command: &str) -> Result<BluetoothAdapter, CliError> {
    tracing::debug!(command, "opening Bluetooth adapter");
    BluetoothAdapter::first()
        .await
        .map_err(|e| CliError::from(embermug_core::CoreError::from(e)))
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
pub async fn open(command: &str) -> Result<unavailable::Unavailable, CliError> {
    Err(CliError::BluetoothUnavailable {
        command: command.into(),
    })
}

#[cfg(not(feature = "bluetooth"))]
mod unavailable {
    use async_trait::async_trait;
    use embermug_api::{Adapter, Advertisement, ConnectivityEvent, DeviceAddress, Error, Peripheral};
    use futures_util::stream::BoxStream;
    use uuid::Uuid;

    /// Uninhabited: no value of this type exists.
    pub enum Unavailable {}

    #[derive(Clone)]
    pub enum NoPeripheral {}

    #[async_trait]
    impl Adapter for Unavailable {
        type Peripheral = NoPeripheral;

        async fn scan(&self, _: Uuid) -> Result<BoxStream<'static, Advertisement>, Error> {
            match *self {}
        }

        async fn connect(&self, _: DeviceAddress) -> Result<NoPeripheral, Error> {
            match *self {}
        }

        async fn connectivity(
            &self,
        ) -> Result<BoxStream<'static, ConnectivityEvent<NoPeripheral>>, Error> {
            match *self {}
        }
    }

    #[async_trait]
    impl Peripheral for NoPeripheral {
        fn address(&self) -> DeviceAddress {
            match *self {}
        }

        async fn discover(&self, _: Uuid) -> Result<Option<Vec<Uuid>>, Error> {
            match *self {}
        }

        async fn read(&self, _: Uuid) -> Result<Vec<u8>, Error> {
            match *self {}
        }

        async fn write(&self, _: Uuid, _: &[u8]) -> Result<(), Error> {
            match *self {}
        }

        async fn subscribe(&self, _: Uuid) -> Result<BoxStream<'static, Vec<u8>>, Error> {
            match *self {}
        }

        async fn unsubscribe(&self, _: Uuid) -> Result<(), Error> {
            match *self {}
        }

        async fn disconnect(&self) -> Result<(), Error> {
            match *self {}
        }
    }
}
