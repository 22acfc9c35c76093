// Node-local enrichment: node IPs, wildcard host-IP resolution, effective service
// ports and the primary proxy's synthesized server blocks.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::ports::{parse_publish_spec, resolve_host_ips};
use crate::models::{
    Container, NodeTwin, PortMapping, ProxyConfiguration, ProxyLocation, ProxyRoute, ProxyServer,
    ProxyTargetMetadata, ServiceUnit, SystemResources, WatchedFile, merge_ports,
};
use crate::quadlet::{self, SourceType, kube};

/// External IPv4 addresses of the node, interfaces visited in name order.
pub fn node_ips(resources: Option<&SystemResources>) -> Vec<String> {
    let mut ips: Vec<String> = Vec::new();
    let Some(network) = resources.and_then(|r| r.network.as_ref()) else {
        return ips;
    };
    for addr in network.values().flatten() {
        if addr.is_external_ipv4() && !ips.contains(&addr.address) {
            ips.push(addr.address.clone());
        }
    }
    ips
}

/// pid -> ports of running host-networked containers.
fn pid_port_table(containers: &[Container]) -> HashMap<u32, Vec<PortMapping>> {
    let mut table: HashMap<u32, Vec<PortMapping>> = HashMap::new();
    for c in containers {
        if let Some(pid) = c.pid
            && c.is_running()
            && c.uses_host_network()
        {
            merge_ports(table.entry(pid).or_default(), &c.ports);
        }
    }
    table
}

fn ensure_host_port(ports: &mut Vec<PortMapping>, port: u16) {
    if !ports.iter().any(|p| p.host_port == Some(port)) {
        ports.push(PortMapping::host(port));
    }
}

/// Split `host:port` (IPv6 in brackets); a non-numeric suffix is part of the host.
fn split_host_port(authority: &str) -> (&str, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
        return (host, port);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(p) => (host, Some(p)),
            Err(_) => (authority, None),
        },
        None => (authority, None),
    }
}

/// Upstream URL for a route plus the raw target host/port it was built from.
pub fn normalize_proxy_target(route: &ProxyRoute) -> (String, ProxyTargetMetadata) {
    let raw = route.target_service.trim();
    let (scheme, rest) = raw.split_once("://").unwrap_or(("http", raw));
    let rest = rest.trim_end_matches('/');
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let (host, encoded_port) = split_host_port(authority);

    let proxy_pass = match (encoded_port, route.target_port) {
        (None, Some(port)) => format!("{}://{}:{}{}", scheme, authority, port, path),
        _ => format!("{}://{}{}", scheme, authority, path),
    };
    let metadata = ProxyTargetMetadata {
        target_host: host.to_string(),
        target_port: encoded_port.or(route.target_port),
        ssl: route.ssl,
    };
    (proxy_pass, metadata)
}

pub fn build_proxy_configuration(routes: &[ProxyRoute]) -> ProxyConfiguration {
    let servers = routes
        .iter()
        .map(|route| {
            let (proxy_pass, metadata) = normalize_proxy_target(route);
            let listen = if route.ssl {
                vec!["443 ssl".to_string(), "80".to_string()]
            } else {
                vec!["80".to_string()]
            };
            ProxyServer {
                server_name: vec![route.host.clone()],
                listen,
                locations: vec![ProxyLocation {
                    path: "/".to_string(),
                    proxy_pass,
                }],
                metadata,
            }
        })
        .collect();
    ProxyConfiguration { servers }
}

/// Ports recovered from the unit file itself when nothing live reported any.
fn unit_file_ports(files: &BTreeMap<String, WatchedFile>, service_name: &str) -> Vec<PortMapping> {
    let Some(unit) = quadlet::unit_file_for(files, service_name) else {
        return Vec::new();
    };
    let directives = quadlet::parse(&unit.content);

    match directives.source_type {
        SourceType::Kube => {
            let Some(yaml_ref) = directives.kube_yaml.as_deref() else {
                return Vec::new();
            };
            let Some(yaml) = quadlet::resolve_kube_yaml(files, &unit.path, yaml_ref) else {
                debug!(unit = %unit.path, yaml = yaml_ref, "kube yaml not among watched files");
                return Vec::new();
            };
            match kube::kube_ports(&yaml.content) {
                Ok(ports) => ports,
                Err(e) => {
                    warn!(file = %yaml.path, error = %e, "failed to parse kube yaml");
                    Vec::new()
                }
            }
        }
        SourceType::Container | SourceType::Pod => {
            let host_network = directives.uses_host_network();
            let mut ports = Vec::new();
            for value in &directives.publish_ports {
                match parse_publish_spec(value, host_network) {
                    Ok(p) => merge_ports(&mut ports, [&p]),
                    Err(e) => warn!(unit = %unit.path, value = %value, error = %e, "bad PublishPort"),
                }
            }
            ports
        }
        SourceType::Service | SourceType::Unknown => Vec::new(),
    }
}

fn effective_ports(
    service: &ServiceUnit,
    linked: &[&Container],
    pid_ports: &HashMap<u32, Vec<PortMapping>>,
    routes: &[ProxyRoute],
    files: &BTreeMap<String, WatchedFile>,
) -> Vec<PortMapping> {
    let mut ports: Vec<PortMapping> = service.declared_ports.clone();

    let needs_live_ports =
        service.effective_host_network || linked.iter().any(|c| c.ports.is_empty());
    if service.is_active() && needs_live_ports {
        for c in linked {
            if let Some(found) = c.pid.and_then(|pid| pid_ports.get(&pid)) {
                merge_ports(&mut ports, found);
            }
        }
    }

    for c in linked {
        merge_ports(&mut ports, &c.ports);
    }

    if service.is_primary_proxy {
        ensure_host_port(&mut ports, 80);
        if routes.iter().any(|r| r.ssl) {
            ensure_host_port(&mut ports, 443);
        }
    }

    if ports.is_empty() {
        ports = unit_file_ports(files, &service.name);
    }
    ports
}

/// Run every node-local derivation. Idempotent: derived fields are rebuilt from inputs.
pub fn enrich_node(node: &mut NodeTwin) {
    node.node_ips = node_ips(node.resources.as_ref());
    let first_ip = node.node_ips.first().cloned();

    let NodeTwin {
        containers,
        services,
        files,
        proxy_routes,
        ..
    } = node;

    for c in containers.iter_mut() {
        resolve_host_ips(&mut c.ports, first_ip.as_deref());
    }

    let pid_ports = pid_port_table(containers);
    let by_id: HashMap<&str, &Container> = containers.iter().map(|c| (c.id.as_str(), c)).collect();

    for service in services.iter_mut() {
        let linked: Vec<&Container> = service
            .associated_container_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();

        service.effective_host_network = linked.iter().any(|c| c.uses_host_network());

        let mut ports = effective_ports(service, &linked, &pid_ports, proxy_routes, files);
        resolve_host_ips(&mut ports, first_ip.as_deref());
        service.ports = (!ports.is_empty()).then_some(ports);

        service.proxy_configuration = service
            .is_primary_proxy
            .then(|| build_proxy_configuration(proxy_routes));
    }
}
