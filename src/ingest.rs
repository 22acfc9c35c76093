// Agent ingestion: NUL-delimited frame decoding and the single worker task
// every agent write goes through, so updates apply strictly one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, interval};
use tracing::Instrument;

use crate::twin::TwinStore;
use crate::twin::validate::ShapeWarning;

/// Frame terminator used by the agent.
pub const FRAME_DELIMITER: u8 = 0;

/// Unterminated data beyond this is discarded.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const MIN_CHANNEL_CAPACITY: usize = 16;

/// Channel capacity for agent commands (backpressure on HTTP handlers if the worker falls behind).
pub fn channel_capacity(configured: usize) -> usize {
    configured.max(MIN_CHANNEL_CAPACITY)
}

/// One message from an agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    SyncPartial {
        payload: Value,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unterminated frame exceeds 16 MiB ({0} bytes buffered)")]
    Oversized(usize),
}

/// Buffers a byte stream and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Prefix of `buf` already known to hold no delimiter.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held for a frame whose terminator has not arrived yet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame; blank frames are skipped.
    pub fn next_frame(&mut self) -> Option<Result<AgentMessage, FrameError>> {
        loop {
            let Some(offset) = self.buf[self.scanned..]
                .iter()
                .position(|b| *b == FRAME_DELIMITER)
            else {
                if self.buf.len() > MAX_FRAME_BYTES {
                    let dropped = self.buf.len();
                    self.buf.clear();
                    self.scanned = 0;
                    return Some(Err(FrameError::Oversized(dropped)));
                }
                self.scanned = self.buf.len();
                return None;
            };
            let pos = self.scanned + offset;
            self.scanned = 0;
            let frame = self.buf.split_to(pos + 1);
            let body = &frame[..pos];
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(serde_json::from_slice(body).map_err(FrameError::from));
        }
    }
}

/// Outcome of feeding a chunk of frames to the twin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub applied: usize,
    pub ignored: usize,
    pub rejected: usize,
    pub warnings: Vec<ShapeWarning>,
}

/// Decode every complete frame in `decoder` and apply it to `node_id`.
pub fn apply_frames(twin: &TwinStore, node_id: &str, decoder: &mut FrameDecoder) -> FrameReport {
    let mut report = FrameReport::default();
    while let Some(frame) = decoder.next_frame() {
        match frame {
            Ok(AgentMessage::SyncPartial { payload, .. }) => {
                report.warnings.extend(twin.update_node(node_id, &payload));
                report.applied += 1;
            }
            Ok(AgentMessage::Unknown) => {
                tracing::debug!(node_id, "ignoring agent message of unknown type");
                report.ignored += 1;
            }
            Err(e) => {
                tracing::warn!(node_id, error = %e, operation = "decode_frame", "dropping agent frame");
                report.rejected += 1;
            }
        }
    }
    report
}

pub enum IngestCommand {
    Partial {
        node_id: String,
        payload: Value,
        reply: Option<oneshot::Sender<Vec<ShapeWarning>>>,
    },
    Frames {
        node_id: String,
        bytes: Bytes,
        reply: Option<oneshot::Sender<FrameReport>>,
    },
    Connection {
        node_id: String,
        connected: bool,
    },
}

/// Twin, command channel, and shutdown for the worker.
pub struct IngestDeps {
    pub twin: TwinStore,
    pub rx: mpsc::Receiver<IngestCommand>,
    pub ws_twin_connections: Arc<AtomicUsize>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct IngestConfig {
    /// How often to log twin stats (real seconds).
    pub stats_log_interval_secs: u64,
}

#[derive(Default)]
struct Counters {
    partials_applied: u64,
    frames_applied: u64,
    frames_rejected: u64,
}

fn handle(
    twin: &TwinStore,
    decoders: &mut HashMap<String, FrameDecoder>,
    counters: &mut Counters,
    command: IngestCommand,
) {
    match command {
        IngestCommand::Partial {
            node_id,
            payload,
            reply,
        } => {
            let warnings = twin.update_node(&node_id, &payload);
            counters.partials_applied += 1;
            if let Some(reply) = reply {
                let _ = reply.send(warnings);
            }
        }
        IngestCommand::Frames {
            node_id,
            bytes,
            reply,
        } => {
            let decoder = decoders.entry(node_id.clone()).or_default();
            decoder.extend(&bytes);
            let report = apply_frames(twin, &node_id, decoder);
            counters.frames_applied += report.applied as u64;
            counters.frames_rejected += report.rejected as u64;
            if let Some(reply) = reply {
                let _ = reply.send(report);
            }
        }
        IngestCommand::Connection { node_id, connected } => {
            if !connected {
                decoders.remove(&node_id);
            }
            twin.set_node_connection(&node_id, connected);
        }
    }
}

pub fn spawn(deps: IngestDeps, config: IngestConfig) -> tokio::task::JoinHandle<()> {
    let IngestDeps {
        twin,
        mut rx,
        ws_twin_connections,
        mut shutdown_rx,
    } = deps;
    let stats_log_interval = Duration::from_secs(config.stats_log_interval_secs);
    let span = tracing::span!(tracing::Level::DEBUG, "ingest");

    let task = async move {
        let mut stats_log_tick = interval(stats_log_interval);
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut decoders: HashMap<String, FrameDecoder> = HashMap::new();
        let mut counters = Counters::default();

        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(command) => handle(&twin, &mut decoders, &mut counters, command),
                        None => {
                            tracing::debug!("Ingest channel closed");
                            break;
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Ingest worker shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    let stats = twin.stats();
                    tracing::info!(
                        nodes = stats.nodes,
                        connected = stats.connected,
                        services = stats.services,
                        containers = stats.containers,
                        routes = stats.routes,
                        subscribers = stats.subscribers,
                        ws_twin_clients = ws_twin_connections.load(Ordering::Relaxed),
                        partials_applied_total = counters.partials_applied,
                        frames_applied_total = counters.frames_applied,
                        frames_rejected_total = counters.frames_rejected,
                        "twin stats"
                    );
                }
            }
        }
    };
    tokio::spawn(task.instrument(span))
}
