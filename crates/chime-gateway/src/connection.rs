use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::transport::{Frame, FrameSink, FrameSource};

/// Consecutive unanswered pings before a connection is considered dead.
const MAX_MISSED_PONGS: u8 = 2;

/// Serve an upgraded WebSocket for `client_id` until either side goes away.
pub async fn handle_connection(socket: WebSocket, engine: Engine, client_id: i64) {
    let (source, sink) = split(socket);
    engine.serve(client_id, source, sink).await;
}

/// Split a socket into the halves the engine drives. The halves share a
/// flag so pongs seen by the reader count toward the writer's heartbeat.
pub fn split(socket: WebSocket) -> (WsSource, WsSink) {
    let (sink, stream) = socket.split();
    let pong = Arc::new(AtomicBool::new(true));
    (
        WsSource {
            stream,
            pong: pong.clone(),
        },
        WsSink {
            sink,
            pong,
            missed: 0,
        },
    )
}

pub struct WsSource {
    stream: SplitStream<WebSocket>,
    pong: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Frame> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Frame::Text(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => return Some(Frame::Binary(data)),
                Ok(Message::Pong(_)) => self.pong.store(true, Ordering::Release),
                // axum answers pings itself
                Ok(Message::Ping(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => {
                    debug!("WebSocket read failed: {}", e);
                    return None;
                }
            }
        }
        None
    }
}

pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
    pong: Arc<AtomicBool>,
    missed: u8,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .context("sending text frame")
    }

    async fn send_binary(&mut self, data: Bytes) -> anyhow::Result<()> {
        self.sink
            .send(Message::Binary(data))
            .await
            .context("sending binary frame")
    }

    async fn heartbeat(&mut self) -> anyhow::Result<bool> {
        if self.pong.swap(false, Ordering::Acquire) {
            self.missed = 0;
        } else {
            self.missed += 1;
            if self.missed >= MAX_MISSED_PONGS {
                warn!("Missed {} pongs", self.missed);
                return Ok(false);
            }
        }
        self.sink
            .send(Message::Ping(Bytes::new()))
            .await
            .context("sending ping")?;
        Ok(true)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}
