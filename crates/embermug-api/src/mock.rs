//! Scriptable in-memory transport.
//!
//! [`MockAdapter`] and [`MockPeripheral`] implement the transport traits
//! without any Bluetooth hardware. Tests script attribute values, inject
//! read and connect failures, push event notifications, and raise
//! connectivity events for arbitrary addresses, then observe what the
//! code under test did (connect attempts, unsubscribes, disconnects).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use uuid::Uuid;

use crate::address::DeviceAddress;
use crate::attribute::{Attribute, SERVICE_UUID};
use crate::codec::{BatteryState, Event, LiquidState, Temperature};
use crate::error::Error;
use crate::transport::{Adapter, Advertisement, ConnectivityEvent, Peripheral};

const CONNECTIVITY_CHANNEL_SIZE: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── MockPeripheral ──────────────────────────────────────────────────

/// An in-memory mug. Clones share state.
#[derive(Clone)]
pub struct MockPeripheral {
    address: DeviceAddress,
    state: Arc<PeripheralState>,
}

struct PeripheralState {
    has_service: AtomicBool,
    connected: AtomicBool,
    values: Mutex<HashMap<Attribute, Vec<u8>>>,
    absent: Mutex<HashSet<Attribute>>,
    failing: Mutex<HashSet<Attribute>>,
    notify: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    reads: AtomicUsize,
    unsubscribes: AtomicUsize,
    disconnects: AtomicUsize,
}

impl std::fmt::Debug for MockPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeripheral")
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl MockPeripheral {
    /// A connected mug holding 21.30 °C coffee, heating towards 55.00 °C,
    /// with a half-charged battery.
    pub fn new(address: DeviceAddress) -> Self {
        let values = HashMap::from([
            (Attribute::Name, b"Ember Mug".to_vec()),
            (Attribute::CurrentTemperature, Temperature::from_raw(2130).encode().to_vec()),
            (Attribute::TargetTemperature, Temperature::from_raw(5500).encode().to_vec()),
            (Attribute::TemperatureUnit, vec![0]),
            (Attribute::LiquidLevel, vec![30]),
            (
                Attribute::Battery,
                BatteryState {
                    charge: 50,
                    charging: false,
                    temperature: Temperature::from_raw(3100),
                    voltage: 0,
                }
                .encode()
                .to_vec(),
            ),
            (Attribute::LiquidState, vec![u8::from(LiquidState::Heating)]),
            (Attribute::Version, vec![0x90, 0x01, 0x02, 0x00, 0x05, 0x00]),
            (Attribute::Color, vec![0xff, 0x80, 0x00, 0xff]),
        ]);

        Self {
            address,
            state: Arc::new(PeripheralState {
                has_service: AtomicBool::new(true),
                connected: AtomicBool::new(true),
                values: Mutex::new(values),
                absent: Mutex::new(HashSet::new()),
                failing: Mutex::new(HashSet::new()),
                notify: Mutex::new(None),
                reads: AtomicUsize::new(0),
                unsubscribes: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }),
        }
    }

    /// Make service discovery come back empty, as for a non-mug device.
    #[must_use]
    pub fn without_service(self) -> Self {
        self.state.has_service.store(false, Ordering::SeqCst);
        self
    }

    /// Drop one characteristic from the discovered set.
    #[must_use]
    pub fn without(self, attribute: Attribute) -> Self {
        lock(&self.state.absent).insert(attribute);
        self
    }

    // ── Scripting ───────────────────────────────────────────────────

    pub fn set(&self, attribute: Attribute, data: impl Into<Vec<u8>>) {
        lock(&self.state.values).insert(attribute, data.into());
    }

    pub fn set_current_temperature(&self, temperature: Temperature) {
        self.set(Attribute::CurrentTemperature, temperature.encode());
    }

    pub fn set_target_temperature(&self, temperature: Temperature) {
        self.set(Attribute::TargetTemperature, temperature.encode());
    }

    pub fn set_battery(&self, battery: BatteryState) {
        self.set(Attribute::Battery, battery.encode());
    }

    pub fn set_liquid_state(&self, state: LiquidState) {
        self.set(Attribute::LiquidState, [u8::from(state)]);
    }

    pub fn set_liquid_level(&self, level: u8) {
        self.set(Attribute::LiquidLevel, [level]);
    }

    /// Make every subsequent read of `attribute` fail.
    pub fn fail_reads(&self, attribute: Attribute) {
        lock(&self.state.failing).insert(attribute);
    }

    pub fn restore_reads(&self, attribute: Attribute) {
        lock(&self.state.failing).remove(&attribute);
    }

    /// Deliver an event notification to the current subscriber, if any.
    pub fn push_event(&self, event: Event) {
        self.push_raw_event(event.encode().to_vec());
    }

    pub fn push_raw_event(&self, payload: Vec<u8>) {
        if let Some(tx) = lock(&self.state.notify).as_ref() {
            let _ = tx.send(payload);
        }
    }

    /// Simulate the link dropping without anyone calling `disconnect`.
    pub fn drop_link(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
        lock(&self.state.notify).take();
    }

    // ── Observation ─────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state.notify).is_some()
    }

    pub fn read_calls(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn attribute(uuid: Uuid) -> Result<Attribute, Error> {
        Attribute::from_uuid(uuid)
            .ok_or_else(|| Error::Transport(format!("unknown characteristic {uuid}")))
    }
}

#[async_trait]
impl Peripheral for MockPeripheral {
    fn address(&self) -> DeviceAddress {
        self.address
    }

    async fn discover(&self, service: Uuid) -> Result<Option<Vec<Uuid>>, Error> {
        self.ensure_connected()?;
        if service != SERVICE_UUID || !self.state.has_service.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let absent = lock(&self.state.absent);
        Ok(Some(
            <Attribute as strum::IntoEnumIterator>::iter()
                .filter(|attr| !absent.contains(attr))
                .map(Attribute::uuid)
                .collect(),
        ))
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, Error> {
        self.ensure_connected()?;
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let attribute = Self::attribute(characteristic)?;
        if lock(&self.state.failing).contains(&attribute) {
            return Err(Error::Transport(format!("scripted read failure: {attribute}")));
        }
        lock(&self.state.values)
            .get(&attribute)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no value scripted for {attribute}")))
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), Error> {
        self.ensure_connected()?;
        let attribute = Self::attribute(characteristic)?;
        self.set(attribute, data);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, Error> {
        self.ensure_connected()?;
        Self::attribute(characteristic)?;
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.state.notify) = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), Error> {
        self.ensure_connected()?;
        Self::attribute(characteristic)?;
        self.state.unsubscribes.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.notify).take();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected()?;
        self.drop_link();
        Ok(())
    }
}

// ── MockAdapter ─────────────────────────────────────────────────────

/// An in-memory adapter. Clones share state.
#[derive(Clone)]
pub struct MockAdapter {
    state: Arc<AdapterState>,
}

struct AdapterState {
    devices: Mutex<HashMap<DeviceAddress, MockPeripheral>>,
    connect_calls: AtomicUsize,
    failing_connects: AtomicUsize,
    connectivity: broadcast::Sender<ConnectivityEvent<MockPeripheral>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        let (connectivity, _) = broadcast::channel(CONNECTIVITY_CHANNEL_SIZE);
        Self {
            state: Arc::new(AdapterState {
                devices: Mutex::new(HashMap::new()),
                connect_calls: AtomicUsize::new(0),
                failing_connects: AtomicUsize::new(0),
                connectivity,
            }),
        }
    }

    /// Make a device reachable through `connect`.
    pub fn add_device(&self, peripheral: MockPeripheral) {
        lock(&self.state.devices).insert(peripheral.address(), peripheral);
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// Raise a "connected" event for `peripheral`, which need not be registered.
    pub fn emit_connected(&self, peripheral: &MockPeripheral) {
        peripheral.state.connected.store(true, Ordering::SeqCst);
        self.emit(peripheral, true);
    }

    /// Raise a "disconnected" event, dropping the peripheral's link first.
    pub fn emit_disconnected(&self, peripheral: &MockPeripheral) {
        peripheral.drop_link();
        self.emit(peripheral, false);
    }

    fn emit(&self, peripheral: &MockPeripheral, connected: bool) {
        let _ = self.state.connectivity.send(ConnectivityEvent {
            peripheral: peripheral.clone(),
            connected,
        });
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    type Peripheral = MockPeripheral;

    async fn scan(&self, service: Uuid) -> Result<BoxStream<'static, Advertisement>, Error> {
        let adverts: Vec<Advertisement> = lock(&self.state.devices)
            .values()
            .filter(|p| p.state.has_service.load(Ordering::SeqCst))
            .map(|p| Advertisement {
                address: p.address(),
                local_name: Some("Ember Mug".into()),
                rssi: Some(-60),
                services: vec![service],
            })
            .collect();
        Ok(futures_util::stream::iter(adverts).boxed())
    }

    async fn connect(&self, address: DeviceAddress) -> Result<MockPeripheral, Error> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);

        let scripted_failure = self
            .state
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(Error::Transport("scripted connect failure".into()));
        }

        let peripheral = lock(&self.state.devices)
            .get(&address)
            .cloned()
            .ok_or(Error::DeviceNotFound { address })?;
        peripheral.state.connected.store(true, Ordering::SeqCst);
        Ok(peripheral)
    }

    async fn connectivity(
        &self,
    ) -> Result<BoxStream<'static, ConnectivityEvent<MockPeripheral>>, Error> {
        let rx = self.state.connectivity.subscribe();
        Ok(BroadcastStream::new(rx)
            .filter_map(|event| std::future::ready(event.ok()))
            .boxed())
    }
}
