//! WebSocket client for a Chime server: timezone bootstrap, text messages and
//! streamed voice/video transfers from local files or URLs.

pub mod client;
pub mod config;
pub mod error;
pub mod source;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use source::MediaSource;
