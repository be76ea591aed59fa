use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use chime_types::events::ServerEvent;

use crate::error::ProtocolError;

/// Default ceiling on live connections.
pub const DEFAULT_CAPACITY: usize = 50;

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
    /// Stop writing and close the transport.
    Close,
}

/// Sending half of a connection's outbound queue.
///
/// Sends never block. A failed send means the writer is gone, which only
/// happens once the connection is closing.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        self.send_text(event.to_json())
    }

    pub fn send_text(&self, text: String) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    pub fn send_binary(&self, data: Bytes) -> bool {
        self.tx.send(Outbound::Binary(data)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// A connection slot handed out by [`SessionRegistry::try_admit`].
pub struct Slot {
    pub conn_id: Uuid,
    pub outbox: Outbox,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

struct Peer {
    client_id: i64,
    outbox: Outbox,
}

/// Bounded set of live connections.
///
/// Admission, release and broadcast all go through one lock, so a broadcast
/// sees either all of a concurrent admit/release or none of it.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    capacity: usize,

    /// Live connections: conn_id -> peer
    live: RwLock<HashMap<Uuid, Peer>>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                capacity,
                live: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Claim a slot, or fail once the ceiling is reached.
    pub async fn try_admit(&self, client_id: i64) -> Result<Slot, ProtocolError> {
        let mut live = self.inner.live.write().await;
        if live.len() >= self.inner.capacity {
            warn!(
                "Refusing client {}: {} of {} slots in use",
                client_id,
                live.len(),
                self.inner.capacity
            );
            return Err(ProtocolError::CapacityExceeded(live.len()));
        }

        let conn_id = Uuid::new_v4();
        let (tx, outbound) = mpsc::unbounded_channel();
        let outbox = Outbox { tx };
        live.insert(
            conn_id,
            Peer {
                client_id,
                outbox: outbox.clone(),
            },
        );
        info!(
            "Admitted client {} as {} ({}/{})",
            client_id,
            conn_id,
            live.len(),
            self.inner.capacity
        );

        Ok(Slot {
            conn_id,
            outbox,
            outbound,
        })
    }

    /// Free a slot. Releasing an unknown or already released slot is a no-op.
    pub async fn release(&self, conn_id: Uuid) -> bool {
        let removed = self.inner.live.write().await.remove(&conn_id);
        match removed {
            Some(peer) => {
                info!("Released client {} ({})", peer.client_id, conn_id);
                true
            }
            None => false,
        }
    }

    /// Deliver a text frame to every live connection. Returns how many
    /// connections accepted it; failures are logged and skipped.
    pub async fn broadcast(&self, text: &str) -> usize {
        let live = self.inner.live.read().await;
        let mut delivered = 0;
        for (conn_id, peer) in live.iter() {
            if peer.outbox.send_text(text.to_string()) {
                delivered += 1;
            } else {
                debug!("Broadcast skipped closing connection {}", conn_id);
            }
        }
        delivered
    }

    pub async fn live_count(&self) -> usize {
        self.inner.live.read().await.len()
    }

    pub async fn is_live(&self, conn_id: Uuid) -> bool {
        self.inner.live.read().await.contains_key(&conn_id)
    }

    /// Client ids of all live connections.
    pub async fn live_clients(&self) -> Vec<i64> {
        self.inner
            .live
            .read()
            .await
            .values()
            .map(|peer| peer.client_id)
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
