// Point-in-time view handed to consumers, and the migration audit log entries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{GatewayState, NodeTwin, ProxyState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinSnapshot {
    pub nodes: BTreeMap<String, NodeTwin>,
    pub gateway: GatewayState,
    pub proxy: ProxyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One discrete bundle-migration action, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationEvent {
    #[serde(default)]
    pub timestamp: u64,
    pub bundle_id: String,
    pub action: String,
    pub status: MigrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
