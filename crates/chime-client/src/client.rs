use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};
use uuid::Uuid;

use chime_gateway::header::TransferHeader;
use chime_types::events::ServerEvent;
use chime_types::models::MediaKind;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::source::MediaSource;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection to the server, before or after the timezone bootstrap.
pub struct ChatClient {
    sender: ChatSender,
    events: EventStream,
}

/// Write half: text messages and file transfers.
pub struct ChatSender {
    client_id: i64,
    chunk_size: usize,
    tx: SplitSink<WsStream, Message>,
}

/// Read half: server events in arrival order.
pub struct EventStream {
    rx: SplitStream<WsStream>,
}

impl ChatClient {
    pub async fn connect(config: &ClientConfig, client_id: i64) -> Result<Self, ClientError> {
        let url = config.url_for(client_id);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
        info!("Connected to {} as client {}", url, client_id);

        let (tx, rx) = ws_stream.split();
        Ok(Self {
            sender: ChatSender {
                client_id,
                chunk_size: config.chunk_size,
                tx,
            },
            events: EventStream { rx },
        })
    }

    /// Send the timezone as the first frame and wait for the chat to be ready.
    /// A returning client gets its stored timezone back, whatever was sent.
    pub async fn bootstrap(&mut self, timezone: &str) -> Result<(Uuid, String), ClientError> {
        self.sender.send_text(timezone).await?;
        loop {
            match self.events.next_event().await? {
                ServerEvent::Ready {
                    chat_id, timezone, ..
                } => return Ok((chat_id, timezone)),
                ServerEvent::Rejected { reason } => return Err(ClientError::Rejected(reason)),
                ServerEvent::Notice { text } => debug!("Notice during bootstrap: {}", text),
                other => return Err(ClientError::Unexpected(format!("{:?}", other))),
            }
        }
    }

    pub fn client_id(&self) -> i64 {
        self.sender.client_id
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), ClientError> {
        self.sender.send_text(text).await
    }

    pub async fn send_voice(&mut self, address: &str) -> Result<u64, ClientError> {
        self.sender.send_voice(address).await
    }

    pub async fn send_video(&mut self, address: &str) -> Result<u64, ClientError> {
        self.sender.send_video(address).await
    }

    pub async fn next_event(&mut self) -> Result<ServerEvent, ClientError> {
        self.events.next_event().await
    }

    pub fn into_split(self) -> (ChatSender, EventStream) {
        (self.sender, self.events)
    }

    pub async fn close(self) -> Result<(), ClientError> {
        self.sender.close().await
    }
}

impl ChatSender {
    pub async fn send_text(&mut self, text: &str) -> Result<(), ClientError> {
        self.tx.send(Message::text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send_voice(&mut self, address: &str) -> Result<u64, ClientError> {
        let source = MediaSource::open(address).await?;
        self.send_media(MediaKind::Voice, source).await
    }

    pub async fn send_video(&mut self, address: &str) -> Result<u64, ClientError> {
        let source = MediaSource::open(address).await?;
        self.send_media(MediaKind::Video, source).await
    }

    /// Stream `source` as one header frame followed by chunk frames. Returns
    /// the number of payload bytes sent.
    ///
    /// A source that yields more or fewer bytes than it declared is an error;
    /// bytes past the declared size are never sent.
    pub async fn send_media(
        &mut self,
        kind: MediaKind,
        mut source: MediaSource,
    ) -> Result<u64, ClientError> {
        let declared = source.size();
        let header = TransferHeader::new(kind, declared, self.client_id, source.name()).encode()?;
        self.tx.send(Message::binary(header)).await?;
        info!("Sending {} '{}' ({} bytes)", kind, source.name(), declared);

        let mut sent = 0u64;
        while let Some(chunk) = source.next_chunk(self.chunk_size).await? {
            let len = chunk.len() as u64;
            if sent + len > declared {
                return Err(ClientError::SizeMismatch {
                    declared,
                    sent: sent + len,
                });
            }
            self.tx.send(Message::binary(chunk)).await?;
            sent += len;
            trace!("{}/{} bytes sent", sent, declared);
        }

        if sent != declared {
            return Err(ClientError::SizeMismatch { declared, sent });
        }
        Ok(sent)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.tx.close().await?;
        Ok(())
    }
}

impl EventStream {
    /// Next JSON event; control and binary frames are skipped.
    pub async fn next_event(&mut self) -> Result<ServerEvent, ClientError> {
        loop {
            match self.rx.next().await {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(text.as_str())?),
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                Some(Ok(other)) => trace!("Skipping {} byte non-text frame", other.len()),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
