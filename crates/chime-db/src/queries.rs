use crate::Database;
use crate::models::{ChatRow, MessageRow};
use anyhow::{Result, anyhow};
use chime_types::models::{Chat, Message, MessageStatus};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

impl Database {
    // -- Chats --

    pub fn get_chat(&self, client_id: i64) -> Result<Option<Chat>> {
        self.with_conn(|conn| query_chat_by_client(conn, client_id))?
            .map(Chat::try_from)
            .transpose()
    }

    /// Create the chat for `client_id`, or return the existing one untouched.
    /// The timezone of an existing chat is never rewritten.
    pub fn create_chat(&self, client_id: i64, timezone: &str) -> Result<Chat> {
        let row = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (id, client_id, timezone, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(client_id) DO NOTHING",
                rusqlite::params![Uuid::new_v4().to_string(), client_id, timezone, now_timestamp()],
            )?;
            query_chat_by_client(conn, client_id)?
                .ok_or_else(|| anyhow!("Chat for client {} vanished after insert", client_id))
        })?;

        Chat::try_from(row)
    }

    // -- Messages --

    pub fn create_message(&self, chat_id: Uuid, content: &str, status: MessageStatus) -> Result<Message> {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            status: status.as_str().to_string(),
            created_at: now_timestamp(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, content, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![row.id, row.chat_id, row.content, row.status, row.created_at],
            )?;
            Ok(())
        })?;

        Message::try_from(row)
    }

    /// Oldest first, so `offset` walks forward through the history.
    pub fn list_messages(&self, chat_id: Uuid, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_messages(conn, &chat_id.to_string(), limit, offset))?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }
}

/// Fixed-width RFC 3339 so lexical order in SQLite matches time order.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_chat_by_client(conn: &Connection, client_id: i64) -> Result<Option<ChatRow>> {
    let mut stmt =
        conn.prepare("SELECT id, client_id, timezone, created_at FROM chats WHERE client_id = ?1")?;

    let row = stmt
        .query_row([client_id], |row| {
            Ok(ChatRow {
                id: row.get(0)?,
                client_id: row.get(1)?,
                timezone: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, chat_id: &str, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, content, status, created_at
         FROM messages
         WHERE chat_id = ?1
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![chat_id, limit, offset], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                content: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
