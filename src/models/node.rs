// Per-host twin and the raw facts an agent reports alongside containers/services

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Container, ProxyRoute, ServiceUnit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddress {
    pub address: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub internal: bool,
}

impl NetworkAddress {
    pub fn is_external_ipv4(&self) -> bool {
        !self.internal
            && (self.family.eq_ignore_ascii_case("ipv4") || self.family == "inet")
            && self.address.parse::<std::net::Ipv4Addr>().is_ok()
    }
}

/// Host metrics; `network` maps interface name to its addresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemResources {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: u64,
    #[serde(default)]
    pub total_memory: u64,
    #[serde(default)]
    pub disk_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<BTreeMap<String, Vec<NetworkAddress>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disks: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeUser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Driver")]
    pub driver: String,
    #[serde(default, alias = "Mountpoint")]
    pub mountpoint: String,
    #[serde(default, alias = "Labels", deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, alias = "UsedBy", deserialize_with = "null_as_default")]
    pub used_by: Vec<VolumeUser>,
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// A config/unit file the agent watches; content is shipped verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub modified: f64,
}

/// In-memory mirror of one host. Never deleted, only marked disconnected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTwin {
    pub connected: bool,
    pub last_sync: u64,
    pub initial_sync_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<SystemResources>,
    pub containers: Vec<Container>,
    pub services: Vec<ServiceUnit>,
    pub volumes: Vec<Volume>,
    pub files: BTreeMap<String, WatchedFile>,
    pub proxy_routes: Vec<ProxyRoute>,
    #[serde(rename = "nodeIPs")]
    pub node_ips: Vec<String>,
}

impl NodeTwin {
    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.id == id)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceUnit> {
        self.services.iter().find(|s| s.name == name)
    }
}
