// WebSocket twin stream: full snapshot on connect, then one per change

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::TwinSnapshot;
use crate::twin::TwinStore;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the ws_twin connection count on drop (connect = +1, drop = -1).
struct WsTwinGuard(Arc<AtomicUsize>);

impl Drop for WsTwinGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// false when the client is gone or too slow.
async fn send_json(socket: &mut WebSocket, snapshot: &TwinSnapshot) -> anyhow::Result<bool> {
    let json = serde_json::to_string(snapshot)?;
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    Ok(matches!(r, Ok(Ok(()))))
}

pub(super) async fn ws_twin(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let tx = state.twin_tx.clone();
    let twin = state.twin.clone();
    let conn_count = state.ws_twin_connections.clone();
    ws.on_upgrade(move |socket| async move {
        // subscribe before reading the snapshot so no change is missed in between
        let mut rx = tx.subscribe();
        if let Err(e) = stream_twin(socket, &mut rx, twin, conn_count).await {
            tracing::info!("Twin stream error: {}", e);
        }
    })
}

async fn stream_twin(
    mut socket: WebSocket,
    rx: &mut broadcast::Receiver<TwinSnapshot>,
    twin: TwinStore,
    conn_count: Arc<AtomicUsize>,
) -> anyhow::Result<()> {
    conn_count.fetch_add(1, Ordering::Relaxed);
    let _guard = WsTwinGuard(conn_count);
    tracing::info!("Client connected to twin stream");

    if !send_json(&mut socket, &twin.get_snapshot()).await? {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(snapshot) => {
                        if !send_json(&mut socket, &snapshot).await? {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/twin client lagged, skipped {} snapshots", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
