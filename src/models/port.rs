// Canonical port mapping shared by containers, services and bundles

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROTOCOL: &str = "tcp";

/// One canonical port binding. At least one of `host_port` / `container_port` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl PortMapping {
    pub fn host(port: u16) -> Self {
        Self {
            host_port: Some(port),
            container_port: Some(port),
            protocol: default_protocol(),
            host_ip: None,
        }
    }

    /// Identity used when merging port lists; `host_ip` is not part of it.
    pub fn dedupe_key(&self) -> (Option<u16>, Option<u16>, &str) {
        (self.host_port, self.container_port, self.protocol.as_str())
    }
}

/// Append every port from `extra` whose dedupe key is not yet present in `into`.
pub fn merge_ports<'a>(into: &mut Vec<PortMapping>, extra: impl IntoIterator<Item = &'a PortMapping>) {
    for port in extra {
        if !into.iter().any(|p| p.dedupe_key() == port.dedupe_key()) {
            into.push(port.clone());
        }
    }
}
