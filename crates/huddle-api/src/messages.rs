use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use crate::AppState;

/// Hard cap on `limit`, whatever the client asks for.
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /messages: the most recent messages, oldest first. Read-only view
/// of the same history the gateway pushes on join.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.clamp(1, MAX_LIMIT);

    let messages = state.store.find_recent(limit).await.map_err(|e| {
        error!("Failed to load messages: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(messages))
}
