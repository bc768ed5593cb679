// ── Service runner ──
//
// Ties the connection manager and the client registry to a Unix
// listener. One tracked task per accepted client; on cancellation the
// loop stops accepting, waits for every session to finish, then shuts
// the device session down.

use embermug_api::Adapter;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::registry::ClientRegistry;
use crate::session;

/// The mug service: one device, many socket consumers.
pub struct Service<A: Adapter> {
    manager: ConnectionManager<A>,
    registry: ClientRegistry,
}

impl<A: Adapter> Service<A> {
    /// Spawns the connection actor; must be called inside a Tokio runtime.
    pub fn new(adapter: A, config: ServiceConfig) -> Self {
        let registry = ClientRegistry::new();
        let manager = ConnectionManager::new(adapter, config, registry.clone());
        Self { manager, registry }
    }

    pub fn manager(&self) -> &ConnectionManager<A> {
        &self.manager
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Serve clients on `listener` until `cancel` fires.
    ///
    /// The initial connect happens after the connectivity subscription is
    /// in place; its failure is logged and the service keeps running so a
    /// client can ask for a reconnect later. An accept error ends the loop
    /// and is returned once teardown has finished.
    pub async fn run(
        &self,
        listener: UnixListener,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        let scope = cancel.child_token();
        let watcher = self.manager.watch_connectivity(scope.clone()).await?;

        match self.manager.connect().await {
            Ok(_) => debug!(address = %self.manager.address(), "initial connect succeeded"),
            Err(e) => warn!(error = %e, "initial connect failed, waiting for the mug"),
        }

        info!(address = %self.manager.address(), "accepting clients");
        let tasks = TaskTracker::new();

        let result = loop {
            tokio::select! {
                biased;
                () = scope.cancelled() => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let client = self.registry.register(&scope);
                        debug!(client_id = %client.id, "client connected");
                        tasks.spawn(session::serve(
                            stream,
                            client,
                            self.manager.clone(),
                            self.registry.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed, shutting down");
                        break Err(CoreError::Io(e));
                    }
                },
            }
        };

        // ── Teardown ──
        scope.cancel();
        tasks.close();
        tasks.wait().await;
        if let Err(e) = watcher.await {
            warn!(error = %e, "connectivity watcher panicked");
        }
        self.manager.shutdown().await?;
        info!("service stopped");

        result
    }
}
