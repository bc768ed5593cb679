// ── Connection manager ──
//
// Lifecycle of the link to the one configured mug. A single actor task
// owns the live `Mug` session and the `StateTracker`; everything that
// touches either (connect, disconnect, device events, shutdown) is a
// `Command` on its queue. The session and the snapshot's `connected`
// flag therefore always change together, and a refresh or event is fully
// applied and dispatched before the next command is looked at.

use std::sync::{Arc, Mutex, PoisonError};

use embermug_api::{Adapter, DeviceAddress, Event, EventStream, Mug, Peripheral};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ServiceConfig;
use crate::error::CoreError;
use crate::protocol::Snapshot;
use crate::registry::ClientRegistry;
use crate::tracker::StateTracker;

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Point-in-time view of the manager, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub snapshot: Snapshot,
    /// Address of the live session, if any.
    pub session: Option<DeviceAddress>,
}

enum Command<P> {
    Connected(P),
    Disconnected,
    Event { generation: u64, event: Event },
    Status(oneshot::Sender<ManagerStatus>),
    Shutdown(oneshot::Sender<()>),
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Handle to the connection actor.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Must be created inside a
/// Tokio runtime, since construction spawns the actor task.
pub struct ConnectionManager<A: Adapter> {
    inner: Arc<ManagerInner<A>>,
}

impl<A: Adapter> Clone for ConnectionManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ManagerInner<A: Adapter> {
    adapter: A,
    config: ServiceConfig,
    registry: ClientRegistry,
    commands: mpsc::Sender<Command<A::Peripheral>>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Adapter> ConnectionManager<A> {
    /// Spawn the actor. Does NOT connect -- call [`connect()`](Self::connect).
    pub fn new(adapter: A, config: ServiceConfig, registry: ClientRegistry) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let actor = Actor {
            registry: registry.clone(),
            tracker: StateTracker::new(),
            session: None,
            generation: 0,
            commands: commands.downgrade(),
        };
        let handle = tokio::spawn(actor.run(rx));

        Self {
            inner: Arc::new(ManagerInner {
                adapter,
                config,
                registry,
                commands,
                actor: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.inner.config.address
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the configured mug, retrying up to the configured bound.
    ///
    /// On success the peripheral is handed to the actor, which opens a
    /// session, refreshes every attribute and dispatches the result. If a
    /// session is already live the new link is ignored. Failure is returned
    /// to the caller and leaves the service running.
    pub async fn connect(&self) -> Result<A::Peripheral, CoreError> {
        let peripheral = connect_with_retry(&self.inner.adapter, &self.inner.config).await?;
        self.send(Command::Connected(peripheral.clone())).await?;
        Ok(peripheral)
    }

    /// Entry point for adapter connectivity events.
    ///
    /// The adapter reports every device it sees; anything that is not the
    /// configured mug is dropped here before it can reach the actor.
    pub async fn on_connectivity_changed(&self, peripheral: A::Peripheral, connected: bool) {
        let address = peripheral.address();
        if address != self.inner.config.address {
            trace!(%address, connected, "ignoring connectivity event for another device");
            return;
        }

        let command = if connected {
            Command::Connected(peripheral)
        } else {
            Command::Disconnected
        };
        if self.send(command).await.is_err() {
            debug!(%address, connected, "connectivity event after shutdown");
        }
    }

    /// Subscribe to adapter connectivity events and route them until
    /// `cancel` fires or the adapter's stream ends.
    ///
    /// The subscription is in place when this returns, so a connect issued
    /// afterwards cannot race past it.
    pub async fn watch_connectivity(
        &self,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, CoreError> {
        let mut events = self.inner.adapter.connectivity().await?;
        let manager = self.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.next() => {
                        let Some(event) = event else {
                            warn!("adapter connectivity stream ended");
                            break;
                        };
                        manager
                            .on_connectivity_changed(event.peripheral, event.connected)
                            .await;
                    }
                }
            }
        }))
    }

    /// Current snapshot and session, as seen by the actor after every
    /// command queued before this call.
    pub async fn status(&self) -> Result<ManagerStatus, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx)).await?;
        rx.await.map_err(|_| CoreError::ManagerStopped)
    }

    /// Stop event notifications, disconnect the mug and stop the actor.
    ///
    /// A mug that already dropped the link is not an error. Calling this
    /// again after the actor has stopped is a no-op.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Shutdown(tx)).await.is_ok() {
            rx.await.map_err(|_| CoreError::ManagerStopped)?;
        }

        let handle = self
            .inner
            .actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "connection actor panicked");
            }
        }
        Ok(())
    }

    async fn send(&self, command: Command<A::Peripheral>) -> Result<(), CoreError> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| CoreError::ManagerStopped)
    }
}

/// Try `connect_attempts` times, back to back, returning the last error.
pub(crate) async fn connect_with_retry<A: Adapter>(
    adapter: &A,
    config: &ServiceConfig,
) -> Result<A::Peripheral, CoreError> {
    let attempts = config.connect_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match adapter.connect(config.address).await {
            Ok(peripheral) => {
                debug!(address = %config.address, attempt, "link established");
                return Ok(peripheral);
            }
            Err(e) => {
                debug!(address = %config.address, attempt, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(CoreError::ConnectionFailed {
        address: config.address.to_string(),
        attempts,
        reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

// ── Actor ────────────────────────────────────────────────────────────

struct Session<P> {
    mug: Mug<P>,
    generation: u64,
    forwarder: Option<JoinHandle<()>>,
}

impl<P> Session<P> {
    fn stop_forwarding(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

struct Actor<P> {
    registry: ClientRegistry,
    tracker: StateTracker,
    session: Option<Session<P>>,
    /// Bumped per session; events tagged with an older value are stale.
    generation: u64,
    commands: mpsc::WeakSender<Command<P>>,
}

impl<P: Peripheral> Actor<P> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command<P>>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Connected(peripheral) => self.on_connected(peripheral).await,
                Command::Disconnected => self.on_disconnected().await,
                Command::Event { generation, event } => self.on_event(generation, event).await,
                Command::Status(reply) => {
                    let _ = reply.send(ManagerStatus {
                        snapshot: self.tracker.snapshot().clone(),
                        session: self.session.as_ref().map(|s| s.mug.address()),
                    });
                }
                Command::Shutdown(reply) => {
                    self.close_session().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        debug!("connection actor stopped");
    }

    async fn on_connected(&mut self, peripheral: P) {
        if let Some(session) = &self.session {
            debug!(address = %session.mug.address(), "session already live, ignoring connect");
            return;
        }

        let address = peripheral.address();
        let mug = match Mug::new(peripheral).await {
            Ok(mug) => mug,
            Err(e) => {
                warn!(%address, error = %e, "failed to open mug session");
                return;
            }
        };

        // Without notifications the snapshot would go stale, so the link is
        // released and the next connect starts from scratch.
        let events = match mug.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!(%address, error = %e, "failed to start event notifications");
                if let Err(e) = mug.close().await {
                    log_teardown_error("disconnect", &e);
                }
                return;
            }
        };
        self.generation += 1;
        let forwarder = Some(tokio::spawn(forward_events(
            events,
            self.generation,
            self.commands.clone(),
        )));

        self.tracker.set_connected(true);
        self.tracker.refresh(&mug).await;
        self.session = Some(Session {
            mug,
            generation: self.generation,
            forwarder,
        });

        info!(%address, "mug connected");
        self.registry.dispatch(self.tracker.snapshot().clone()).await;
    }

    async fn on_disconnected(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop_forwarding();
            info!(address = %session.mug.address(), "mug disconnected");
        }
        self.tracker.set_connected(false);
        self.registry.dispatch(self.tracker.snapshot().clone()).await;
    }

    async fn on_event(&mut self, generation: u64, event: Event) {
        let Some(session) = self
            .session
            .as_ref()
            .filter(|s| s.generation == generation)
        else {
            debug!(%event, generation, "discarding event from a closed session");
            return;
        };

        match self.tracker.apply_event(&session.mug, event).await {
            Ok(true) => {
                debug!(%event, "mug state changed");
                self.registry.dispatch(self.tracker.snapshot().clone()).await;
            }
            Ok(false) => trace!(%event, "mug state unchanged"),
            Err(e) => warn!(%event, error = %e, "failed to apply mug event"),
        }
    }

    async fn close_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.stop_forwarding();

        if let Err(e) = session.mug.stop_events().await {
            log_teardown_error("stop event notifications", &e);
        }
        if let Err(e) = session.mug.close().await {
            log_teardown_error("disconnect", &e);
        }
        self.tracker.set_connected(false);
        info!(address = %session.mug.address(), "mug session closed");
    }
}

fn log_teardown_error(step: &str, err: &embermug_api::Error) {
    if err.is_disconnected() {
        debug!(step, "mug already disconnected");
    } else {
        warn!(step, error = %err, "mug teardown step failed");
    }
}

/// Relay decoded events into the actor queue, tagged with their session.
async fn forward_events<P>(
    mut events: EventStream,
    generation: u64,
    commands: mpsc::WeakSender<Command<P>>,
) {
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let Some(tx) = commands.upgrade() else { break };
                if tx.send(Command::Event { generation, event }).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed mug event"),
        }
    }
    trace!(generation, "event stream ended");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use embermug_api::mock::{MockAdapter, MockPeripheral};
    use embermug_api::{Attribute, LiquidState, Temperature};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::registry::Client;

    const ADDRESS: DeviceAddress = DeviceAddress::new([0xC8, 0x6E, 0x14, 0xA0, 0x3B, 0x7F]);
    const OTHER: DeviceAddress = DeviceAddress::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

    fn setup() -> (MockAdapter, MockPeripheral, ConnectionManager<MockAdapter>) {
        let adapter = MockAdapter::new();
        let mug = MockPeripheral::new(ADDRESS);
        adapter.add_device(mug.clone());
        let manager = ConnectionManager::new(
            adapter.clone(),
            ServiceConfig::new(ADDRESS),
            ClientRegistry::new(),
        );
        (adapter, mug, manager)
    }

    async fn next_update(client: &mut Client) -> Arc<Snapshot> {
        tokio::time::timeout(Duration::from_secs(2), client.updates.recv())
            .await
            .expect("timed out waiting for a dispatch")
            .unwrap()
    }

    #[tokio::test]
    async fn connect_refreshes_and_dispatches() {
        let (adapter, _mug, manager) = setup();
        let mut client = manager.registry().register(&CancellationToken::new());

        manager.connect().await.unwrap();
        let snapshot = next_update(&mut client).await;

        assert!(snapshot.connected);
        assert_eq!(snapshot.current.raw(), 2130);
        assert_eq!(snapshot.state, LiquidState::Heating);
        assert_eq!(adapter.connect_calls(), 1);
        assert_eq!(manager.status().await.unwrap().session, Some(ADDRESS));
    }

    #[tokio::test]
    async fn connect_retries_up_to_the_bound() {
        let (adapter, _mug, manager) = setup();
        adapter.fail_next_connects(3);
        manager.connect().await.unwrap();
        assert_eq!(adapter.connect_calls(), 4);

        let (adapter, _mug, manager) = setup();
        adapter.fail_next_connects(usize::MAX);
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, CoreError::ConnectionFailed { attempts: 10, .. }));
        assert_eq!(adapter.connect_calls(), 10);
        assert_eq!(manager.status().await.unwrap().session, None);
    }

    #[tokio::test]
    async fn events_for_other_devices_are_filtered() {
        let (adapter, _mug, manager) = setup();
        let watcher = manager
            .watch_connectivity(CancellationToken::new())
            .await
            .unwrap();
        let stranger = MockPeripheral::new(OTHER);

        for _ in 0..3 {
            manager.on_connectivity_changed(stranger.clone(), true).await;
            manager.on_connectivity_changed(stranger.clone(), false).await;
        }
        adapter.emit_connected(&stranger);
        adapter.emit_disconnected(&stranger);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = manager.status().await.unwrap();
        assert_eq!(status.snapshot, Snapshot::default());
        assert_eq!(status.session, None);
        assert_eq!(stranger.read_calls(), 0);
        watcher.abort();
    }

    #[tokio::test]
    async fn adapter_connect_event_opens_a_session() {
        let (adapter, mug, manager) = setup();
        let mut client = manager.registry().register(&CancellationToken::new());
        let _watcher = manager
            .watch_connectivity(CancellationToken::new())
            .await
            .unwrap();

        adapter.emit_connected(&mug);
        let snapshot = next_update(&mut client).await;
        assert!(snapshot.connected);
        assert_eq!(adapter.connect_calls(), 0);
    }

    #[tokio::test]
    async fn disconnect_keeps_last_known_values() {
        let (_adapter, mug, manager) = setup();
        let mut client = manager.registry().register(&CancellationToken::new());
        manager.connect().await.unwrap();
        let connected = next_update(&mut client).await;

        mug.drop_link();
        manager.on_connectivity_changed(mug.clone(), false).await;
        let disconnected = next_update(&mut client).await;

        assert!(!disconnected.connected);
        assert_eq!(
            *disconnected,
            Snapshot {
                connected: false,
                ..(*connected).clone()
            }
        );
        assert_eq!(manager.status().await.unwrap().session, None);
    }

    #[tokio::test]
    async fn device_events_are_applied_in_order() {
        let (_adapter, mug, manager) = setup();
        let mut client = manager.registry().register(&CancellationToken::new());
        manager.connect().await.unwrap();
        next_update(&mut client).await;

        mug.set_current_temperature(Temperature::from_raw(2200));
        mug.push_event(Event::RefreshTemperature);
        assert_eq!(next_update(&mut client).await.current.raw(), 2200);

        mug.push_event(Event::Charging);
        assert!(next_update(&mut client).await.battery.charging);
    }

    #[tokio::test]
    async fn unchanged_event_does_not_dispatch() {
        let (_adapter, mug, manager) = setup();
        let mut client = manager.registry().register(&CancellationToken::new());
        manager.connect().await.unwrap();
        next_update(&mut client).await;

        mug.push_event(Event::RefreshTemperature);
        mug.fail_reads(Attribute::TargetTemperature);
        mug.push_event(Event::RefreshTarget);
        // Queue a status probe behind both events.
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.status().await.unwrap();
        assert!(client.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_while_live_keeps_the_session() {
        let (adapter, mug, manager) = setup();
        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        let status = manager.status().await.unwrap();

        assert_eq!(adapter.connect_calls(), 2);
        assert!(mug.is_subscribed());
        assert_eq!(status.session, Some(ADDRESS));
    }

    #[tokio::test]
    async fn failed_notifications_release_the_mug() {
        let adapter = MockAdapter::new();
        let mug = MockPeripheral::new(ADDRESS).without(Attribute::Events);
        adapter.add_device(mug.clone());
        let manager = ConnectionManager::new(
            adapter.clone(),
            ServiceConfig::new(ADDRESS),
            ClientRegistry::new(),
        );
        let mut client = manager.registry().register(&CancellationToken::new());

        manager.connect().await.unwrap();
        let status = manager.status().await.unwrap();

        assert_eq!(status.session, None);
        assert!(!status.snapshot.connected);
        assert_eq!(mug.disconnect_calls(), 1);
        assert!(!mug.is_connected());
        assert!(client.updates.try_recv().is_err());

        // Nothing is left behind to block the next attempt.
        manager.connect().await.unwrap();
        manager.status().await.unwrap();
        assert_eq!(adapter.connect_calls(), 2);
        assert_eq!(mug.disconnect_calls(), 2);
    }

    #[tokio::test]
    async fn shutdown_unsubscribes_then_disconnects() {
        let (_adapter, mug, manager) = setup();
        manager.connect().await.unwrap();
        manager.status().await.unwrap();

        manager.shutdown().await.unwrap();
        assert_eq!(mug.unsubscribe_calls(), 1);
        assert_eq!(mug.disconnect_calls(), 1);
        assert!(!mug.is_connected());
        assert!(matches!(manager.status().await, Err(CoreError::ManagerStopped)));

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_tolerates_an_already_dropped_link() {
        let (_adapter, mug, manager) = setup();
        manager.connect().await.unwrap();
        manager.status().await.unwrap();

        mug.drop_link();
        manager.shutdown().await.unwrap();
        assert_eq!(mug.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn stale_session_events_are_dropped() {
        let (adapter, mug, manager) = setup();
        let mut client = manager.registry().register(&CancellationToken::new());
        manager.connect().await.unwrap();
        next_update(&mut client).await;

        adapter.emit_disconnected(&mug);
        manager.on_connectivity_changed(mug.clone(), false).await;
        next_update(&mut client).await;

        mug.set_current_temperature(Temperature::from_raw(9000));
        mug.push_event(Event::RefreshTemperature);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = manager.status().await.unwrap();
        assert_eq!(status.snapshot.current.raw(), 2130);
        assert!(!status.snapshot.connected);
    }
}
