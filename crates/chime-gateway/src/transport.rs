//! Transport abstraction for message-oriented duplex connections.
//!
//! A connection is split into a [`FrameSource`] read by the session and a
//! [`FrameSink`] owned by the connection's writer task. Production uses axum
//! WebSocket halves (see [`crate::connection`]), tests use in-memory channels.

use async_trait::async_trait;
use bytes::Bytes;

/// One discrete unit delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// Receiving half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame in send order, or `None` once the peer has disconnected.
    async fn recv(&mut self) -> Option<Frame>;
}

/// Sending half of a connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;

    async fn send_binary(&mut self, data: Bytes) -> anyhow::Result<()>;

    /// Called on every heartbeat tick. Returning `false` drops the connection.
    async fn heartbeat(&mut self) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn close(&mut self);
}
