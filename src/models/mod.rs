// Domain models for the fleet twin

mod bundle;
mod container;
mod node;
mod port;
mod proxy;
mod service;
mod snapshot;

pub use bundle::{
    AssetKind, BundleAsset, BundleContainer, BundleService, BundleSeverity, DependencyReason,
    GraphEdge, ServiceBundle,
};
pub use container::{Container, SYSTEMD_UNIT_LABEL};
pub use node::{NetworkAddress, NodeTwin, SystemResources, Volume, VolumeUser, WatchedFile};
pub use port::{DEFAULT_PROTOCOL, PortMapping, merge_ports};
pub use proxy::{GatewayState, ProxyRoute, ProxyState};
pub use service::{
    ProxyConfiguration, ProxyLocation, ProxyServer, ProxyTargetMetadata, ServiceUnit,
};
pub use snapshot::{MigrationEvent, MigrationStatus, TwinSnapshot};

/// Current wall clock in epoch milliseconds (0 if the clock is before the epoch).
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
