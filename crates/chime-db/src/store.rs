use anyhow::Result;
use uuid::Uuid;

use chime_types::models::{Chat, Message, MessageStatus};

use crate::Database;

/// Durable storage for chats and their messages.
///
/// Calls are blocking; async callers run them on `spawn_blocking`.
/// Each call is atomic on its own and safe to issue from many connections.
pub trait Store: Send + Sync + 'static {
    fn get_chat(&self, client_id: i64) -> Result<Option<Chat>>;

    /// Returns the existing chat unchanged when `client_id` is already known.
    fn create_chat(&self, client_id: i64, timezone: &str) -> Result<Chat>;

    fn create_message(&self, chat_id: Uuid, content: &str, status: MessageStatus) -> Result<Message>;

    fn list_messages(&self, chat_id: Uuid, limit: u32, offset: u32) -> Result<Vec<Message>>;
}

impl Store for Database {
    fn get_chat(&self, client_id: i64) -> Result<Option<Chat>> {
        Database::get_chat(self, client_id)
    }

    fn create_chat(&self, client_id: i64, timezone: &str) -> Result<Chat> {
        Database::create_chat(self, client_id, timezone)
    }

    fn create_message(&self, chat_id: Uuid, content: &str, status: MessageStatus) -> Result<Message> {
        Database::create_message(self, chat_id, content, status)
    }

    fn list_messages(&self, chat_id: Uuid, limit: u32, offset: u32) -> Result<Vec<Message>> {
        Database::list_messages(self, chat_id, limit, offset)
    }
}
