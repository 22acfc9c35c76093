use serde::Deserialize;

use crate::twin::DEFAULT_MIGRATION_LOG_CAPACITY;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub twin: TwinConfig,
    pub ingest: IngestConfig,
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwinConfig {
    /// Migration events kept per node; oldest are evicted first.
    #[serde(default = "default_migration_log_capacity")]
    pub migration_log_capacity: usize,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            migration_log_capacity: default_migration_log_capacity(),
        }
    }
}

fn default_migration_log_capacity() -> usize {
    DEFAULT_MIGRATION_LOG_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Pending agent commands before HTTP ingestion handlers wait on the worker.
    pub channel_capacity: usize,
    /// How often to log twin stats (nodes, routes, frames applied/rejected) at INFO level.
    pub stats_log_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max number of twin snapshots kept in the broadcast channel for /ws/twin (slow clients may lag).
    pub broadcast_capacity: usize,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.server.host.is_empty(),
            "server.host must be non-empty"
        );
        anyhow::ensure!(
            self.twin.migration_log_capacity > 0,
            "twin.migration_log_capacity must be > 0, got {}",
            self.twin.migration_log_capacity
        );
        anyhow::ensure!(
            self.ingest.channel_capacity > 0,
            "ingest.channel_capacity must be > 0, got {}",
            self.ingest.channel_capacity
        );
        anyhow::ensure!(
            self.ingest.stats_log_interval_secs > 0,
            "ingest.stats_log_interval_secs must be > 0, got {}",
            self.ingest.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        Ok(())
    }
}
