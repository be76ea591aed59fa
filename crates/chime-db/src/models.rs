//! Database row types, one per SQLite table.
//! Distinct from chime-types models to keep the DB layer independent.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};

use chime_types::models::{Chat, Message};

pub struct ChatRow {
    pub id: String,
    pub client_id: i64,
    pub timezone: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub status: String,
    pub created_at: String,
}

impl TryFrom<ChatRow> for Chat {
    type Error = anyhow::Error;

    fn try_from(row: ChatRow) -> Result<Self> {
        Ok(Chat {
            id: row.id.parse().with_context(|| format!("corrupt chat id '{}'", row.id))?,
            client_id: row.client_id,
            timezone: row.timezone,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id.parse().with_context(|| format!("corrupt message id '{}'", row.id))?,
            chat_id: row
                .chat_id
                .parse()
                .with_context(|| format!("corrupt chat_id '{}' on message '{}'", row.chat_id, row.id))?,
            content: row.content,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

/// Timestamps are written as RFC 3339; rows created by hand in the sqlite
/// shell use `datetime('now')`, which has no offset and is UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}
