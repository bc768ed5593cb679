// ── Client registry & fan-out ──
//
// Every subscriber owns a bounded mailbox and a cancellation scope derived
// from the service scope. Dispatch delivers each snapshot to every mailbox
// in order. A full mailbox makes dispatch wait, but only until that
// client's own scope is cancelled; a cancelled client is dropped and
// dispatch moves on to the next one.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::Snapshot;

/// Snapshots a client may fall behind by before dispatch waits on it.
pub const MAILBOX_SIZE: usize = 32;

/// One registered subscriber, handed to the task that serves it.
#[derive(Debug)]
pub struct Client {
    /// Opaque unique id, used as the registry key and in logs.
    pub id: String,

    /// Cancelling this scope ends the client's session. It is a child of
    /// the scope passed to [`ClientRegistry::register`].
    pub cancel: CancellationToken,

    /// The latest snapshot at registration time. Dispatches that race the
    /// registration may deliver the same snapshot again through `updates`.
    pub greeting: Arc<Snapshot>,

    /// Every snapshot dispatched after registration, in order. Closed once
    /// the client is removed from the registry.
    pub updates: mpsc::Receiver<Arc<Snapshot>>,
}

#[derive(Clone)]
struct Slot {
    mailbox: mpsc::Sender<Arc<Snapshot>>,
    cancel: CancellationToken,
}

impl Slot {
    fn departed(&self) -> bool {
        self.cancel.is_cancelled() || self.mailbox.is_closed()
    }
}

struct RegistryInner {
    /// Last dispatched snapshot, used to greet new clients.
    latest: ArcSwap<Snapshot>,
    clients: DashMap<String, Slot>,
}

/// The set of currently subscribed clients.
///
/// Cheaply cloneable; clones share the same set.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                latest: ArcSwap::from_pointee(Snapshot::default()),
                clients: DashMap::new(),
            }),
        }
    }

    /// Register a new client whose scope is a child of `parent`.
    pub fn register(&self, parent: &CancellationToken) -> Client {
        let id = Uuid::new_v4().to_string();
        let cancel = parent.child_token();
        let (mailbox, updates) = mpsc::channel(MAILBOX_SIZE);

        self.inner.clients.insert(
            id.clone(),
            Slot {
                mailbox,
                cancel: cancel.clone(),
            },
        );

        // Read after the insert: a dispatch that missed this client has
        // already published its snapshot.
        let greeting = self.inner.latest.load_full();

        debug!(client_id = %id, clients = self.inner.clients.len(), "client registered");
        Client {
            id,
            cancel,
            greeting,
            updates,
        }
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.inner.clients.remove(id).is_some();
        if removed {
            debug!(client_id = %id, "client removed");
        }
        removed
    }

    /// Deliver `snapshot` to every registered client.
    ///
    /// Clients whose scope has been cancelled, or whose receiving half is
    /// gone, are dropped from the registry instead. Waiting on a full
    /// mailbox ends when that client's scope is cancelled.
    pub async fn dispatch(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        // Publish before fan-out so concurrent registrations catch up.
        self.inner.latest.store(Arc::clone(&snapshot));

        // No shard lock may be held across the sends below.
        let slots: Vec<(String, Slot)> = self
            .inner
            .clients
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (id, slot) in slots {
            if slot.departed() {
                self.drop_departed(&id);
                continue;
            }
            let delivered = tokio::select! {
                biased;
                () = slot.cancel.cancelled() => false,
                sent = slot.mailbox.send(Arc::clone(&snapshot)) => sent.is_ok(),
            };
            if !delivered {
                self.drop_departed(&id);
            }
        }
    }

    fn drop_departed(&self, id: &str) {
        if self.inner.clients.remove(id).is_some() {
            debug!(client_id = %id, "dropping departed client");
        }
    }

    /// The most recently dispatched snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.inner.latest.load_full()
    }

    pub fn len(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.clients.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.clients.contains_key(id)
    }
}
