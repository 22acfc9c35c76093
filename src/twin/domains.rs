// Cross-node passes: fleet-wide route aggregation and domain back-correlation.
// Correlation is purely address/port coincidence between route targets and the
// host ports a service or container is reachable on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::models::{NodeTwin, PortMapping, ProxyRoute};

/// Union of connected nodes' routes, nodes folded in id order, first host wins.
pub fn aggregate_routes(nodes: &BTreeMap<String, NodeTwin>) -> Vec<ProxyRoute> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut routes = Vec::new();
    for node in nodes.values().filter(|n| n.connected) {
        for route in &node.proxy_routes {
            if seen.insert(route.host.as_str()) {
                routes.push(route.clone());
            }
        }
    }
    routes
}

/// Strip a leading `scheme://` and trailing slashes.
pub fn normalize_target(target: &str) -> String {
    let target = target.trim();
    let target = target
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(target);
    target.trim_end_matches('/').to_ascii_lowercase()
}

/// normalized target -> hosts routed to it.
pub fn route_index(routes: &[ProxyRoute]) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    let mut add = |key: String, host: &str| {
        let hosts = index.entry(key).or_default();
        if !hosts.iter().any(|h| h == host) {
            hosts.push(host.to_string());
        }
    };
    for route in routes {
        let target = normalize_target(&route.target_service);
        if target.is_empty() {
            continue;
        }
        let has_port = target
            .rsplit_once(':')
            .is_some_and(|(_, p)| p.parse::<u16>().is_ok());
        if let (false, Some(port)) = (has_port, route.target_port) {
            add(format!("{}:{}", target, port), &route.host);
        }
        add(target, &route.host);
    }
    index
}

/// Addresses a host port is reachable on from a proxy's point of view.
pub fn candidate_addresses(host_port: u16, node_ips: &[String]) -> Vec<String> {
    let mut out = vec![
        format!("127.0.0.1:{}", host_port),
        format!("localhost:{}", host_port),
        format!("0.0.0.0:{}", host_port),
    ];
    out.extend(node_ips.iter().map(|ip| format!("{}:{}", ip, host_port)));
    out
}

fn verified_for(
    ports: &[PortMapping],
    node_ips: &[String],
    index: &HashMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    let mut domains: BTreeSet<String> = BTreeSet::new();
    for host_port in ports.iter().filter_map(|p| p.host_port) {
        for addr in candidate_addresses(host_port, node_ips) {
            if let Some(hosts) = index.get(&addr) {
                domains.extend(hosts.iter().cloned());
            }
        }
    }
    (!domains.is_empty()).then(|| domains.into_iter().collect())
}

/// Recompute `verified_domains` for every service and container of every node.
pub fn map_domains(nodes: &mut BTreeMap<String, NodeTwin>, routes: &[ProxyRoute]) {
    let index = route_index(routes);
    for node in nodes.values_mut() {
        let node_ips = node.node_ips.clone();
        for service in node.services.iter_mut() {
            let ports = service.ports.as_deref().unwrap_or_default();
            service.verified_domains = verified_for(ports, &node_ips, &index);
        }
        for container in node.containers.iter_mut() {
            container.verified_domains = verified_for(&container.ports, &node_ips, &index);
        }
    }
}
