use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageKind;

/// Events sent from the server to a client as WebSocket text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Bootstrap finished; the chat is ready for messages
    Ready {
        chat_id: Uuid,
        client_id: i64,
        timezone: String,
    },

    /// A message was inside its admission window and was stored
    Accepted { kind: MessageKind, message_id: Uuid },

    /// A message was outside its admission window and was recorded as discarded
    Discarded { kind: MessageKind, message_id: Uuid },

    /// A multimedia transfer was aborted; the connection stays usable
    TransferError { reason: String },

    /// The frame was processed but the message could not be recorded
    Failed { reason: String },

    /// The connection is refused and will be closed
    Rejected { reason: String },

    /// Server-wide notice delivered to every live connection
    Notice { text: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
