// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::{Any, CorsLayer};

use crate::ingest::IngestCommand;
use crate::models::TwinSnapshot;
use crate::twin::TwinStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) twin: TwinStore,
    pub(crate) ingest_tx: mpsc::Sender<IngestCommand>,
    pub(crate) twin_tx: broadcast::Sender<TwinSnapshot>,
    pub(crate) ws_twin_connections: Arc<AtomicUsize>,
}

pub fn app(
    twin: TwinStore,
    ingest_tx: mpsc::Sender<IngestCommand>,
    twin_tx: broadcast::Sender<TwinSnapshot>,
    ws_twin_connections: Arc<AtomicUsize>,
) -> Router {
    let state = AppState {
        twin,
        ingest_tx,
        twin_tx,
        ws_twin_connections,
    };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/twin", get(http::twin_handler)) // GET /api/twin
        .route("/api/gateway", put(http::gateway_handler)) // PUT /api/gateway
        .route("/api/nodes/{id}", get(http::node_handler)) // GET /api/nodes/{id}
        .route(
            "/api/nodes/{id}/connection",
            get(http::connection_handler).put(http::set_connection_handler),
        ) // GET|PUT /api/nodes/{id}/connection
        .route("/api/nodes/{id}/sync", post(http::sync_handler)) // POST /api/nodes/{id}/sync
        .route("/api/nodes/{id}/frames", post(http::frames_handler)) // POST /api/nodes/{id}/frames
        .route("/api/nodes/{id}/bundles", get(http::bundles_handler)) // GET /api/nodes/{id}/bundles
        .route(
            "/api/nodes/{id}/migrations",
            get(http::migrations_handler).post(http::record_migration_handler),
        ) // GET|POST /api/nodes/{id}/migrations
        .route("/ws/twin", get(ws::ws_twin)) // WS /ws/twin
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
