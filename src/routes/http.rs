// REST handlers: version, twin reads, agent ingestion, bundles, migrations, gateway

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use super::AppState;
use crate::error::{LookupResult, TwinError};
use crate::ingest::IngestCommand;
use crate::models::{GatewayState, MigrationEvent};

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Deserialize)]
pub(super) struct ConnectionBody {
    connected: bool,
}

#[derive(Debug, Serialize)]
struct SyncResponse<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

fn lookup<T: Serialize>(result: Result<T, TwinError>) -> impl IntoResponse {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(TwinError::NodeNotFound(_)) => StatusCode::NOT_FOUND,
    };
    (status, Json(LookupResult::from(result)))
}

fn worker_unavailable() -> (StatusCode, Json<LookupResult<()>>) {
    tracing::warn!(operation = "ingest_send", "ingest worker is not running");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(LookupResult {
            success: false,
            data: None,
            error: Some("ingest unavailable".to_string()),
        }),
    )
}

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/twin: full point-in-time snapshot.
pub(super) async fn twin_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.twin.get_snapshot())
}

pub(super) async fn node_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    lookup(state.twin.get_node(&id))
}

pub(super) async fn connection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    lookup(state.twin.check_connection(&id))
}

/// PUT /api/nodes/{id}/connection: queued behind pending agent updates.
pub(super) async fn set_connection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConnectionBody>,
) -> axum::response::Response {
    let command = IngestCommand::Connection {
        node_id: id,
        connected: body.connected,
    };
    if state.ingest_tx.send(command).await.is_err() {
        return worker_unavailable().into_response();
    }
    StatusCode::ACCEPTED.into_response()
}

/// POST /api/nodes/{id}/sync: one partial snapshot as JSON; replies once applied.
pub(super) async fn sync_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> axum::response::Response {
    let (reply_tx, reply_rx) = oneshot::channel();
    let command = IngestCommand::Partial {
        node_id: id,
        payload,
        reply: Some(reply_tx),
    };
    if state.ingest_tx.send(command).await.is_err() {
        return worker_unavailable().into_response();
    }
    match reply_rx.await {
        Ok(warnings) => Json(SyncResponse {
            success: true,
            data: serde_json::json!({ "warnings": warnings }),
        })
        .into_response(),
        Err(_) => worker_unavailable().into_response(),
    }
}

/// POST /api/nodes/{id}/frames: raw NUL-delimited agent frames; a trailing partial frame is kept.
pub(super) async fn frames_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let (reply_tx, reply_rx) = oneshot::channel();
    let command = IngestCommand::Frames {
        node_id: id,
        bytes: body,
        reply: Some(reply_tx),
    };
    if state.ingest_tx.send(command).await.is_err() {
        return worker_unavailable().into_response();
    }
    match reply_rx.await {
        Ok(report) => Json(SyncResponse {
            success: true,
            data: report,
        })
        .into_response(),
        Err(_) => worker_unavailable().into_response(),
    }
}

pub(super) async fn bundles_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    lookup(state.twin.bundles(&id))
}

pub(super) async fn migrations_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    lookup(state.twin.migration_history(&id))
}

pub(super) async fn record_migration_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(event): Json<MigrationEvent>,
) -> impl IntoResponse {
    lookup(state.twin.record_migration(&id, event))
}

/// PUT /api/gateway: replaces the gateway state wholesale.
pub(super) async fn gateway_handler(
    State(state): State<AppState>,
    Json(gateway): Json<GatewayState>,
) -> impl IntoResponse {
    state.twin.update_gateway(gateway);
    StatusCode::NO_CONTENT
}
