use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use chime_types::api::MessageResponse;

use crate::state::AppState;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub chat_id: Uuid,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Page through a chat's history, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as u32;
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        warn!("Rejecting negative offset {} for chat {}", offset, query.chat_id);
        return Err(StatusCode::BAD_REQUEST);
    }
    let offset = u32::try_from(offset).unwrap_or(u32::MAX);

    // Run blocking DB query off the async runtime
    let store = state.store.clone();
    let chat_id = query.chat_id;
    let messages = tokio::task::spawn_blocking(move || store.list_messages(chat_id, limit, offset))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|e| {
            error!("Listing messages for chat {} failed: {:#}", chat_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let messages: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(Json(messages))
}
