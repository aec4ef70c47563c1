//! Broadcast hub for the sync channel
//!
//! Every connection subscribes to one broadcast channel. Events carry a
//! scope so a connection can skip events meant for everyone but itself.
//! The hub also tracks connected clients and announces the count on each
//! connect and disconnect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stackboard_protocol::ServerEvent;
use tokio::sync::{broadcast, RwLock};

/// Identifier of one sync connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Who receives a broadcast event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    AllExcept(ClientId),
}

impl Scope {
    pub fn includes(self, client: ClientId) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != client,
        }
    }
}

/// A scoped event on the hub channel
#[derive(Debug, Clone)]
pub struct Envelope {
    pub scope: Scope,
    pub event: Arc<ServerEvent>,
}

/// Registration handed to a new connection
pub struct Subscription {
    pub client_id: ClientId,
    pub events: broadcast::Receiver<Envelope>,
}

struct HubInner {
    tx: broadcast::Sender<Envelope>,
    clients: RwLock<HashSet<ClientId>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to the shared hub
#[derive(Clone)]
pub struct SyncHub {
    inner: Arc<HubInner>,
}

impl SyncHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                tx,
                clients: RwLock::new(HashSet::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Send an event; silently dropped when nobody is connected
    pub fn publish(&self, scope: Scope, event: ServerEvent) {
        tracing::debug!(event = event.name(), ?scope, "Broadcasting");
        let _ = self.inner.tx.send(Envelope {
            scope,
            event: Arc::new(event),
        });
    }

    /// Register a connection and announce the new client count
    ///
    /// The subscription is taken before the announcement, so the new client
    /// sees its own count.
    pub async fn register(&self) -> Subscription {
        let client_id = ClientId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let events = self.inner.tx.subscribe();
        let count = {
            let mut clients = self.inner.clients.write().await;
            clients.insert(client_id);
            clients.len()
        };
        tracing::info!(client = %client_id, clients = count, "Client connected");
        self.publish(Scope::All, ServerEvent::ClientCount(count));
        Subscription { client_id, events }
    }

    /// Forget a connection and announce the remaining client count
    pub async fn unregister(&self, client_id: ClientId) {
        let (removed, count) = {
            let mut clients = self.inner.clients.write().await;
            (clients.remove(&client_id), clients.len())
        };
        if removed {
            tracing::info!(client = %client_id, clients = count, "Client disconnected");
            self.publish(Scope::All, ServerEvent::ClientCount(count));
        }
    }

    pub async fn client_count(&self) -> usize {
        self.inner.clients.read().await.len()
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(256)
    }
}
