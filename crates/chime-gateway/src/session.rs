//! Lifecycle of one admitted connection.
//!
//! ```text
//! ┌───────────────┐  timezone text  ┌────────┐  disconnect  ┌────────┐
//! │ Bootstrapping │────────────────>│ Active │─────────────>│ Closed │
//! └───────────────┘                 └────────┘              └────────┘
//!         │ invalid timezone / binary first                     ^
//!         └─────────────────────────────────────────────────────┘
//! ```
//!
//! Frames are handled strictly one at a time, so the transfer assembler
//! needs no locking.

use chrono_tz::Tz;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use chime_types::events::ServerEvent;
use chime_types::models::{Chat, MessageKind, MessageStatus};

use crate::assembler::{Disposition, Step, TransferAssembler, TransferComplete};
use crate::engine::Engine;
use crate::error::ProtocolError;
use crate::header::TransferHeader;
use crate::registry::Outbox;
use crate::sink::{SinkName, Staging};
use crate::transport::{Frame, FrameSource};
use crate::window::resolve_timezone;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Bootstrapping,
    Active { chat: Chat, tz: Tz },
    Closed,
}

/// Whether the read loop keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct Session {
    engine: Engine,
    client_id: i64,
    state: SessionState,
    assembler: TransferAssembler,
    // Scratch file of the accepted transfer in flight
    staging: Option<Staging>,
    outbox: Outbox,
}

impl Session {
    pub fn new(engine: Engine, client_id: i64, outbox: Outbox) -> Self {
        Self {
            engine,
            client_id,
            state: SessionState::Bootstrapping,
            assembler: TransferAssembler::new(client_id),
            staging: None,
            outbox,
        }
    }

    /// Process frames until the peer disconnects or the session closes itself.
    pub async fn run<S: FrameSource + ?Sized>(&mut self, source: &mut S) {
        while let Some(frame) = source.recv().await {
            if self.handle(frame).await == Flow::Close {
                break;
            }
        }
    }

    pub async fn handle(&mut self, frame: Frame) -> Flow {
        let (chat_id, tz) = match &self.state {
            SessionState::Active { chat, tz } => (chat.id, *tz),
            SessionState::Closed => return Flow::Close,
            SessionState::Bootstrapping => {
                return self.bootstrap(frame).await;
            }
        };

        match frame {
            Frame::Text(text) => self.on_text(chat_id, tz, text).await,
            Frame::Binary(data) => self.on_binary(chat_id, tz, &data).await,
        }
        Flow::Continue
    }

    /// Enter `Closed`. Any transfer in flight is dropped without a message
    /// and its sink is left untouched.
    pub async fn close(&mut self) {
        self.state = SessionState::Closed;
        if let Some(sink) = self.assembler.abandon() {
            info!(
                "Client {}: abandoned partial transfer into {}",
                self.client_id, sink
            );
        }
        self.drop_staging().await;
    }

    // -- Bootstrap --

    async fn bootstrap(&mut self, frame: Frame) -> Flow {
        let Frame::Text(requested) = frame else {
            return self.reject("expected a timezone text frame first".into());
        };

        match self.open_chat(requested.trim()).await {
            Ok((chat, tz)) => {
                info!(
                    "Client {}: chat {} ready in {}",
                    self.client_id, chat.id, chat.timezone
                );
                self.outbox.send_event(&ServerEvent::Ready {
                    chat_id: chat.id,
                    client_id: self.client_id,
                    timezone: chat.timezone.clone(),
                });
                self.state = SessionState::Active { chat, tz };
                Flow::Continue
            }
            Err(e) => {
                warn!("Client {}: bootstrap failed: {}", self.client_id, e);
                self.reject(e.to_string())
            }
        }
    }

    /// Known chats keep their stored timezone; new chats validate the
    /// requested one before they are created.
    async fn open_chat(&self, requested: &str) -> Result<(Chat, Tz), ProtocolError> {
        let client_id = self.client_id;
        let existing = self
            .engine
            .blocking(move |store| store.get_chat(client_id))
            .await?;

        let chat = match existing {
            Some(chat) => {
                if chat.timezone != requested {
                    debug!(
                        "Client {}: keeping stored timezone {} (ignoring {})",
                        client_id, chat.timezone, requested
                    );
                }
                chat
            }
            None => {
                resolve_timezone(requested)?;
                let timezone = requested.to_string();
                self.engine
                    .blocking(move |store| store.create_chat(client_id, &timezone))
                    .await?
            }
        };

        let tz = resolve_timezone(&chat.timezone)?;
        Ok((chat, tz))
    }

    fn reject(&mut self, reason: String) -> Flow {
        self.outbox.send_event(&ServerEvent::Rejected { reason });
        self.outbox.close();
        self.state = SessionState::Closed;
        Flow::Close
    }

    // -- Text --

    async fn on_text(&mut self, chat_id: Uuid, tz: Tz, text: String) {
        let window = self.engine.config().text_window;
        let (content, status) = if window.contains(self.engine.clock().now(), tz) {
            (text, MessageStatus::Accepted)
        } else {
            debug!(
                "Client {}: text outside {} in {}",
                self.client_id, window, tz
            );
            (String::new(), MessageStatus::Discarded)
        };

        self.record(chat_id, MessageKind::Text, content, status).await;
    }

    // -- Multimedia --

    async fn on_binary(&mut self, chat_id: Uuid, tz: Tz, frame: &[u8]) {
        match self.assembler.feed(frame) {
            Ok(Step::Header(header)) => self.on_header(tz, header).await,
            Ok(Step::Chunk { sink, complete }) => {
                self.on_chunk(chat_id, frame, sink, complete).await
            }
            Err(e) => self.fail_transfer(e).await,
        }
    }

    /// Admission is decided once, against the header's arrival time, and
    /// holds for the whole transfer.
    async fn on_header(&mut self, tz: Tz, header: TransferHeader) {
        let window = self.engine.config().media_window(header.kind);
        let disposition = if window.contains(self.engine.clock().now(), tz) {
            Disposition::Accept {
                sink: SinkName::derive(header.kind, header.client_id, &header.name),
            }
        } else {
            Disposition::Discard
        };

        info!(
            "Client {}: {} '{}' ({} bytes) {}",
            self.client_id,
            header.kind,
            header.name,
            header.length,
            match &disposition {
                Disposition::Accept { sink } => format!("accepted into {}", sink),
                Disposition::Discard => format!("discarded, outside {} in {}", window, tz),
            }
        );

        let delay = self.engine.config().admission_delay.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let staging = disposition.sink().map(|sink| self.engine.media().stage(sink));
        match self.assembler.begin(header, disposition) {
            Ok(()) => self.staging = staging,
            Err(e) => self.fail_transfer(e).await,
        }
    }

    /// Report a fault that ends the transfer in flight but not the connection.
    async fn fail_transfer(&mut self, e: ProtocolError) {
        if e.is_transfer_local() {
            warn!("Client {}: {}", self.client_id, e);
        } else {
            error!("Client {}: unexpected transfer fault: {}", self.client_id, e);
        }
        self.assembler.abandon();
        self.drop_staging().await;
        self.outbox.send_event(&ServerEvent::TransferError {
            reason: e.to_string(),
        });
    }

    async fn drop_staging(&mut self) {
        if let Some(staging) = self.staging.take() {
            self.engine.media().discard(staging).await;
        }
    }

    async fn on_chunk(
        &mut self,
        chat_id: Uuid,
        chunk: &[u8],
        sink: Option<SinkName>,
        complete: Option<TransferComplete>,
    ) {
        trace!(
            "Client {}: chunk of {} bytes, {:?} remaining",
            self.client_id,
            chunk.len(),
            self.assembler.remaining()
        );

        if sink.is_some() {
            let written = match &self.staging {
                Some(staging) => self.engine.media().append(staging, chunk).await,
                None => Ok(()),
            };
            if let Err(e) = written.map_err(ProtocolError::from) {
                error!(
                    "Client {}: staging a chunk failed, discarding the rest: {}",
                    self.client_id, e
                );
                self.assembler.demote();
                self.drop_staging().await;
            }
        }

        let Some(done) = complete else {
            return;
        };

        let stored = match (done.sink, self.staging.take()) {
            (Some(sink), Some(staging)) => {
                let committed = self.engine.media().commit(staging).await;
                match committed.map_err(ProtocolError::from) {
                    Ok(_) => Some(sink),
                    Err(e) => {
                        error!(
                            "Client {}: committing into {} failed: {}",
                            self.client_id, sink, e
                        );
                        None
                    }
                }
            }
            (_, leftover) => {
                if let Some(staging) = leftover {
                    self.engine.media().discard(staging).await;
                }
                None
            }
        };

        let kind = MessageKind::from(done.kind);
        match stored {
            Some(sink) => {
                info!(
                    "Client {}: {} transfer of {} bytes stored in {}",
                    self.client_id, done.kind, done.length, sink
                );
                self.record(chat_id, kind, sink.to_string(), MessageStatus::Accepted)
                    .await;
            }
            None => {
                info!(
                    "Client {}: {} transfer of {} bytes drained",
                    self.client_id, done.kind, done.length
                );
                self.record(chat_id, kind, String::new(), MessageStatus::Discarded)
                    .await;
            }
        }
    }

    // -- Persistence --

    /// Store exactly one message and acknowledge it. A store failure is
    /// reported to the client; the frame still counts as processed.
    async fn record(&self, chat_id: Uuid, kind: MessageKind, content: String, status: MessageStatus) {
        let result = self
            .engine
            .blocking(move |store| store.create_message(chat_id, &content, status))
            .await;

        let event = match result {
            Ok(message) => match status {
                MessageStatus::Accepted => ServerEvent::Accepted {
                    kind,
                    message_id: message.id,
                },
                MessageStatus::Discarded => ServerEvent::Discarded {
                    kind,
                    message_id: message.id,
                },
            },
            Err(e) => {
                error!(
                    "Client {}: could not record {} message: {}",
                    self.client_id, status, e
                );
                ServerEvent::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.outbox.send_event(&event);
    }
}
