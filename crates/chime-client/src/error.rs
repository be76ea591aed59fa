use thiserror::Error;

use chime_gateway::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid header: {0}")]
    Header(#[from] ProtocolError),

    #[error("Unreadable server event: {0}")]
    Event(#[from] serde_json::Error),

    #[error("Invalid file address '{0}'")]
    InvalidSource(String),

    #[error("Not downloadable: {0}")]
    NotDownloadable(String),

    #[error("Server rejected the connection: {0}")]
    Rejected(String),

    #[error("Unexpected server event: {0}")]
    Unexpected(String),

    #[error("Source yielded {sent} bytes but declared {declared}")]
    SizeMismatch { declared: u64, sent: u64 },

    #[error("Connection closed")]
    Closed,
}
