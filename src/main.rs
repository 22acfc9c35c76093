use anyhow::Result;
use fleet_twin::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let (twin_tx, _) =
        broadcast::channel::<models::TwinSnapshot>(app_config.publishing.broadcast_capacity);

    let twin = twin::TwinStore::new(app_config.twin.migration_log_capacity);
    let publisher = twin_tx.clone();
    let _publishing = twin.subscribe(move |snapshot| {
        // no receivers just means no /ws/twin clients
        let _ = publisher.send(snapshot.clone());
    });

    let (ingest_tx, ingest_rx) =
        mpsc::channel(ingest::channel_capacity(app_config.ingest.channel_capacity));
    let ws_twin_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let ingest_handle = ingest::spawn(
        ingest::IngestDeps {
            twin: twin.clone(),
            rx: ingest_rx,
            ws_twin_connections: ws_twin_connections.clone(),
            shutdown_rx,
        },
        ingest::IngestConfig {
            stats_log_interval_secs: app_config.ingest.stats_log_interval_secs,
        },
    );

    let app = routes::app(twin, ingest_tx, twin_tx, ws_twin_connections);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = tokio::signal::ctrl_c().await;
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
                let _ = ingest_handle.await;
            }
        }
    }

    Ok(())
}
