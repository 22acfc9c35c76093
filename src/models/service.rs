// Systemd service unit models plus the facts derived for them by the twin

use serde::{Deserialize, Serialize};

use super::PortMapping;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUnit {
    pub name: String,
    #[serde(default)]
    pub active_state: String,
    #[serde(default)]
    pub sub_state: String,
    #[serde(default)]
    pub load_state: String,
    #[serde(default)]
    pub description: String,
    /// Unit file path (systemd fragment path).
    #[serde(default)]
    pub path: String,
    /// Set semantics; only ever grows.
    #[serde(default)]
    pub associated_container_ids: Vec<String>,
    /// Ports the agent itself reported for the unit, before enrichment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declared_ports: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortMapping>>,
    #[serde(default)]
    pub is_reverse_proxy: bool,
    #[serde(default)]
    pub is_service_bay: bool,
    #[serde(default)]
    pub is_primary_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_configuration: Option<ProxyConfiguration>,
    #[serde(default)]
    pub effective_host_network: bool,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub wants: Vec<String>,
    #[serde(default)]
    pub binds_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_domains: Option<Vec<String>>,
    /// Agent-side claim that this unit is a proxy; kept apart from the derived flag.
    #[serde(skip)]
    pub reported_reverse_proxy: bool,
}

impl ServiceUnit {
    pub fn is_active(&self) -> bool {
        matches!(self.active_state.as_str(), "active" | "reloading")
    }

    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }
}

/// Nginx-style server blocks synthesized for the primary proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfiguration {
    pub servers: Vec<ProxyServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyServer {
    pub server_name: Vec<String>,
    pub listen: Vec<String>,
    pub locations: Vec<ProxyLocation>,
    pub metadata: ProxyTargetMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyLocation {
    pub path: String,
    pub proxy_pass: String,
}

/// Raw upstream address, kept so domains can be correlated back to services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTargetMetadata {
    pub target_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    pub ssl: bool,
}
