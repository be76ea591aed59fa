use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chime_db::Store;
use chime_types::events::ServerEvent;

use crate::config::GatewayConfig;
use crate::error::ProtocolError;
use crate::registry::{Outbound, SessionRegistry, Slot};
use crate::session::Session;
use crate::sink::MediaStore;
use crate::transport::{FrameSink, FrameSource};
use crate::window::{Clock, SystemClock};

/// Shared state behind every connection: store, sinks, registry, policy.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn Store>,
    media: MediaStore,
    registry: SessionRegistry,
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, media: MediaStore, config: GatewayConfig) -> Self {
        Self::with_clock(store, media, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        media: MediaStore,
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                media,
                registry: SessionRegistry::new(config.max_connections),
                config,
                clock,
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn media(&self) -> &MediaStore {
        &self.inner.media
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Run a store call off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, ProtocolError>
    where
        F: FnOnce(&dyn Store) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| ProtocolError::Persistence(anyhow!("spawn_blocking join error: {}", e)))?
            .map_err(ProtocolError::Persistence)
    }

    /// Drive one client connection from admission to teardown.
    pub async fn serve<S, K>(&self, client_id: i64, mut source: S, mut sink: K)
    where
        S: FrameSource,
        K: FrameSink,
    {
        let Slot {
            conn_id,
            outbox,
            outbound,
        } = match self.registry().try_admit(client_id).await {
            Ok(slot) => slot,
            Err(e) => {
                let rejected = ServerEvent::Rejected {
                    reason: e.to_string(),
                };
                let _ = sink.send_text(rejected.to_json()).await;
                sink.close().await;
                return;
            }
        };

        info!("Client {} connected ({})", client_id, conn_id);

        let mut writer = tokio::spawn(run_writer(
            sink,
            outbound,
            self.config().heartbeat_interval,
        ));
        let mut session = Session::new(self.clone(), client_id, outbox);

        // Whichever side stops first ends the connection
        let writer_finished = tokio::select! {
            _ = session.run(&mut source) => false,
            _ = &mut writer => true,
        };

        session.close().await;
        self.registry().release(conn_id).await;
        // Dropping the last outbox lets the writer flush and close
        drop(session);
        if !writer_finished {
            let _ = writer.await;
        }

        info!("Client {} disconnected ({})", client_id, conn_id);

        let notice = ServerEvent::Notice {
            text: format!("Client #{} left the chat", client_id),
        };
        self.registry().broadcast(&notice.to_json()).await;
    }
}

/// Drain a connection's outbound queue into its sink, with heartbeat.
async fn run_writer<K: FrameSink>(
    mut sink: K,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let result = match next {
                    Some(Outbound::Text(text)) => sink.send_text(text).await,
                    Some(Outbound::Binary(data)) => sink.send_binary(data).await,
                    Some(Outbound::Close) | None => break,
                };
                if let Err(e) = result {
                    debug!("Send failed, stopping writer: {:#}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                match sink.heartbeat().await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("Heartbeat timeout, dropping connection");
                        break;
                    }
                    Err(e) => {
                        debug!("Heartbeat failed, stopping writer: {:#}", e);
                        break;
                    }
                }
            }
        }
    }

    sink.close().await;
}
