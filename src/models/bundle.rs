// Service bundles: logical applications derived from a node's units

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PortMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyReason {
    Requires,
    After,
    Wants,
    BindsTo,
}

impl DependencyReason {
    pub const ALL: [DependencyReason; 4] = [
        DependencyReason::Requires,
        DependencyReason::After,
        DependencyReason::Wants,
        DependencyReason::BindsTo,
    ];

    /// Prefix of the hint line summarizing edges of this kind.
    pub fn hint_label(self) -> &'static str {
        match self {
            DependencyReason::Requires => "Hard dependencies",
            DependencyReason::After => "Ordered after",
            DependencyReason::Wants => "Soft dependencies",
            DependencyReason::BindsTo => "Binding relationships",
        }
    }

    pub fn is_hard(self) -> bool {
        matches!(self, DependencyReason::Requires | DependencyReason::BindsTo)
    }
}

impl fmt::Display for DependencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyReason::Requires => "Requires",
            DependencyReason::After => "After",
            DependencyReason::Wants => "Wants",
            DependencyReason::BindsTo => "BindsTo",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub reason: DependencyReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleSeverity {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleService {
    pub name: String,
    pub active_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Container,
    Kube,
    Pod,
    Unit,
    Yaml,
    Other,
}

impl AssetKind {
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('.').map(|(_, ext)| ext) {
            Some("container") => AssetKind::Container,
            Some("kube") => AssetKind::Kube,
            Some("pod") => AssetKind::Pod,
            Some("service") => AssetKind::Unit,
            Some("yaml" | "yml") => AssetKind::Yaml,
            _ => AssetKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAsset {
    pub path: String,
    pub kind: AssetKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBundle {
    pub id: String,
    pub display_name: String,
    pub derived_name: String,
    pub node_name: String,
    pub services: Vec<BundleService>,
    pub containers: Vec<BundleContainer>,
    pub ports: Vec<PortMapping>,
    pub assets: Vec<BundleAsset>,
    pub graph: Vec<GraphEdge>,
    pub hints: Vec<String>,
    pub severity: BundleSeverity,
}
