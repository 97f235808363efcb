pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use huddle_api::middleware::{bearer_token, verify_token};
use huddle_api::{AppStateInner, MediaConfig};
use huddle_db::{Database, MemoryStore, MessageStore, SqliteStore};
use huddle_gateway::{Gateway, connection};

use crate::config::{ServerConfig, StoreBackend};

#[derive(Clone)]
struct ServerState {
    gateway: Gateway,
    jwt_secret: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

pub fn open_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn MessageStore>> {
    Ok(match backend {
        StoreBackend::Sqlite(path) => Arc::new(SqliteStore::new(Database::open(path)?)),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    })
}

/// Start the gateway supervisor and assemble every route. The returned
/// handle finishes once the router and all connections are gone.
pub fn build_app(config: &ServerConfig, store: Arc<dyn MessageStore>) -> (Router, JoinHandle<()>) {
    let (gateway, supervisor) = Gateway::spawn(store.clone(), config.gateway.clone());

    let api_state = Arc::new(AppStateInner {
        store,
        media: MediaConfig {
            dir: config.media_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        },
        jwt_secret: config.jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState {
            gateway,
            jwt_secret: config.jwt_secret.as_deref().map(Arc::from),
        });

    let app = Router::new()
        .merge(huddle_api::router(api_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    (app, supervisor)
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match state.jwt_secret.as_deref() {
        None => None,
        Some(secret) => {
            let token = bearer_token(&headers).or(query.token.as_deref());
            match token.and_then(|t| verify_token(secret, t)) {
                Some(claims) => Some(claims.identity()),
                None => {
                    warn!("Rejected gateway upgrade: missing or invalid token");
                    return StatusCode::UNAUTHORIZED.into_response();
                }
            }
        }
    };

    let gateway = state.gateway;
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, identity))
}
