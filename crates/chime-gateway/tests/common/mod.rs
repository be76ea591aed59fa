#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use chime_db::{Database, Store};
use chime_gateway::header::TransferHeader;
use chime_gateway::transport::{Frame, FrameSink, FrameSource};
use chime_gateway::window::FixedClock;
use chime_gateway::{AdmissionDelay, Engine, GatewayConfig, MediaStore};
use chime_types::events::ServerEvent;
use chime_types::models::{Chat, MediaKind, Message, MessageStatus};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A fixed day at the given UTC time.
pub fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, hour, minute, 0).unwrap()
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        admission_delay: AdmissionDelay::NONE,
        ..GatewayConfig::default()
    }
}

pub fn header(kind: MediaKind, length: u64, client_id: i64, name: &str) -> Vec<u8> {
    TransferHeader::new(kind, length, client_id, name)
        .encode()
        .unwrap()
}

pub struct Harness {
    pub engine: Engine,
    pub db: Arc<Database>,
    pub clock: Arc<FixedClock>,
    pub media_dir: TempDir,
}

impl Harness {
    pub async fn new(at: DateTime<Utc>) -> Self {
        Self::build(at, test_config(), |db| db as Arc<dyn Store>).await
    }

    pub async fn with_config(at: DateTime<Utc>, config: GatewayConfig) -> Self {
        Self::build(at, config, |db| db as Arc<dyn Store>).await
    }

    /// Build an engine whose store is derived from the harness database.
    pub async fn build<F>(at: DateTime<Utc>, config: GatewayConfig, store: F) -> Self
    where
        F: FnOnce(Arc<Database>) -> Arc<dyn Store>,
    {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let media_dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(media_dir.path().to_path_buf()).await.unwrap();
        let clock = Arc::new(FixedClock::new(at));
        let engine = Engine::with_clock(store(db.clone()), media, config, clock.clone());
        Self {
            engine,
            db,
            clock,
            media_dir,
        }
    }

    pub fn connect(&self, client_id: i64) -> TestClient {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = self.engine.clone();
        let task = tokio::spawn(async move {
            engine
                .serve(
                    client_id,
                    ChannelSource { rx: frames_rx },
                    ChannelSink { tx: Some(events_tx) },
                )
                .await
        });
        TestClient {
            frames: Some(frames_tx),
            events: events_rx,
            task,
        }
    }

    pub fn messages(&self, chat_id: Uuid) -> Vec<Message> {
        self.db.list_messages(chat_id, 100, 0).unwrap()
    }

    pub fn media_file(&self, content: &str) -> std::path::PathBuf {
        self.media_dir.path().join(content)
    }

    pub fn media_files(&self, kind: MediaKind) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.media_dir.path().join(kind.as_str()))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

/// One in-memory connection to the engine.
pub struct TestClient {
    frames: Option<mpsc::UnboundedSender<Frame>>,
    events: mpsc::UnboundedReceiver<Frame>,
    task: JoinHandle<()>,
}

impl TestClient {
    pub fn send_text(&self, text: &str) {
        self.frames
            .as_ref()
            .unwrap()
            .send(Frame::Text(text.to_string()))
            .unwrap();
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) {
        self.frames
            .as_ref()
            .unwrap()
            .send(Frame::Binary(data.into()))
            .unwrap();
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        let frame = tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("connection closed");
        match frame {
            Frame::Text(text) => serde_json::from_str(&text).unwrap(),
            Frame::Binary(_) => panic!("unexpected binary frame"),
        }
    }

    /// True once the server has closed this connection.
    pub async fn is_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(EVENT_TIMEOUT, self.events.recv()).await,
            Ok(None)
        )
    }

    /// Send the timezone and return the chat from the `ready` reply.
    pub async fn bootstrap(&mut self, timezone: &str) -> (Uuid, String) {
        self.send_text(timezone);
        match self.next_event().await {
            ServerEvent::Ready {
                chat_id, timezone, ..
            } => (chat_id, timezone),
            other => panic!("expected ready, got {:?}", other),
        }
    }

    /// Disconnect and wait for the server side to finish tearing down.
    pub async fn disconnect(mut self) {
        self.frames.take();
        tokio::time::timeout(EVENT_TIMEOUT, self.task)
            .await
            .expect("session did not end")
            .unwrap();
    }
}

struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow::anyhow!("closed"))?;
        tx.send(Frame::Text(text))?;
        Ok(())
    }

    async fn send_binary(&mut self, data: Bytes) -> anyhow::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow::anyhow!("closed"))?;
        tx.send(Frame::Binary(data))?;
        Ok(())
    }

    async fn close(&mut self) {
        self.tx.take();
    }
}

/// Store whose message writes always fail; chats still work.
pub struct FailingStore {
    pub inner: Arc<Database>,
}

impl Store for FailingStore {
    fn get_chat(&self, client_id: i64) -> anyhow::Result<Option<Chat>> {
        self.inner.get_chat(client_id)
    }

    fn create_chat(&self, client_id: i64, timezone: &str) -> anyhow::Result<Chat> {
        self.inner.create_chat(client_id, timezone)
    }

    fn create_message(&self, _: Uuid, _: &str, _: MessageStatus) -> anyhow::Result<Message> {
        anyhow::bail!("disk I/O error")
    }

    fn list_messages(&self, chat_id: Uuid, limit: u32, offset: u32) -> anyhow::Result<Vec<Message>> {
        self.inner.list_messages(chat_id, limit, offset)
    }
}
