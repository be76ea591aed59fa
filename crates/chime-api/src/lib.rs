pub mod messages;
pub mod state;

use axum::{Router, routing::get};

pub use state::{AppState, AppStateInner};

/// Read-only HTTP routes over the message store.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(messages::get_messages))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}
