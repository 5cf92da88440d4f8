//! Stream client state and registry.
//!
//! Every connected stream is an independent consumer of the single tick
//! source. The generator serializes each tick once and the registry hands the
//! shared payload to every client channel; no per-connection work is done to
//! compute state.

use crate::protocol::StreamMessage;
use dashmap::DashMap;
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique client identifier.
pub type ClientId = Uuid;

/// Pre-serialized stream payload shared by all clients.
pub type Payload = Arc<str>;

/// Buffer size for client message channels.
/// At a ~1.2s tick this holds about 20 seconds of backlog.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 16;

/// State for a single connected stream client.
pub struct ClientState {
    /// Unique client identifier.
    pub id: ClientId,
    /// Channel feeding the client's event stream.
    /// Bounded so a stalled client cannot grow memory without limit.
    pub tx: mpsc::Sender<Payload>,
    /// Ticks dropped because the client's buffer was full.
    pub dropped: AtomicU64,
}

impl ClientState {
    /// Create a new client state with a bounded channel.
    pub fn new(tx: mpsc::Sender<Payload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Try to queue a payload without blocking.
    /// Returns false if the buffer is full or the stream has gone away.
    pub fn try_send(&self, payload: Payload) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("gateway_dropped_ticks_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Number of ticks dropped for this client.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Lock-free registry of connected stream clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientState>>,
}

impl ClientRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a new client.
    pub fn register(&self, client: Arc<ClientState>) -> ClientId {
        let id = client.id;
        self.clients.insert(id, client);
        info!("Client {} registered", id);
        id
    }

    /// Unregister a client. Unknown ids are ignored.
    pub fn unregister(&self, client_id: &ClientId) -> Option<Arc<ClientState>> {
        let removed = self.clients.remove(client_id).map(|(_, client)| client);
        if let Some(client) = &removed {
            info!(
                "Client {} unregistered ({} ticks dropped)",
                client_id,
                client.dropped_count()
            );
        }
        removed
    }

    /// Drop every client's sender so each open stream runs to its end.
    /// Returns the number of clients released.
    pub fn close_all(&self) -> usize {
        let released = self.clients.len();
        self.clients.clear();
        if released > 0 {
            info!("Closed {} stream clients", released);
        }
        released
    }

    /// Get the total number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Broadcast a message to every connected client.
    /// Returns the number of clients the message was queued for.
    pub fn broadcast(&self, msg: &StreamMessage<'_>) -> usize {
        if self.clients.is_empty() {
            return 0;
        }

        // Pre-serialize the message once
        let payload: Payload = match msg.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("Failed to serialize {} message: {}", msg.kind(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        for entry in self.clients.iter() {
            if entry.value().try_send(payload.clone()) {
                delivered += 1;
            } else {
                debug!("Dropped {} for client {}", msg.kind(), entry.key());
            }
        }
        delivered
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
