use anyhow::{Context, Result, bail};
use tracing::warn;

pub const DEFAULT_WS_ENDPOINT: &str = "ws://127.0.0.1:8000/ws";

/// Bytes per binary frame when streaming a file.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL; the client id is appended as the last path segment.
    pub ws_endpoint: String,
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ws_endpoint = lookup("CHIME_WS_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_WS_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        if !ws_endpoint.starts_with("ws://") && !ws_endpoint.starts_with("wss://") {
            bail!("CHIME_WS_ENDPOINT must be a ws:// or wss:// URL, got '{}'", ws_endpoint);
        }

        let chunk_size = match lookup("CHIME_CHUNK_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("invalid CHIME_CHUNK_SIZE '{}'", raw))?,
            None => DEFAULT_CHUNK_SIZE,
        };
        if chunk_size == 0 {
            bail!("CHIME_CHUNK_SIZE must be at least 1");
        }

        Ok(Self {
            ws_endpoint,
            chunk_size,
        })
    }

    pub fn url_for(&self, client_id: i64) -> String {
        format!("{}/{}", self.ws_endpoint, client_id)
    }
}

/// IANA name of the machine's timezone, `UTC` when it cannot be determined.
pub fn local_timezone() -> String {
    match iana_time_zone::get_timezone() {
        Ok(name) => name,
        Err(e) => {
            warn!("Could not determine the local timezone, using UTC: {}", e);
            "UTC".to_string()
        }
    }
}
