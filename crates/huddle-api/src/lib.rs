//! Plain HTTP surface next to the realtime gateway: history reads and
//! media upload/download.

pub mod media;
pub mod messages;
pub mod middleware;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use huddle_db::MessageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<dyn MessageStore>,
    pub media: MediaConfig,
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// The HTTP routes. `/health` is always public; everything else requires
/// a token when a secret is configured.
pub fn router(state: AppState) -> Router {
    // Leave headroom so oversized uploads reach the handler and get a 413
    // from our own check rather than a dropped body.
    let body_limit = state.media.max_upload_bytes.saturating_add(1);

    let protected = Router::new()
        .route("/messages", get(messages::get_messages))
        .route("/media", post(media::upload_media))
        .route("/media/{name}", get(media::download_media))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(protected)
}
