// Reverse-proxy authority: flag proxy-like services, elect one primary per node,
// and recognise the management service itself.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Container, ServiceUnit, WatchedFile};
use crate::quadlet;

/// Well-known proxy names; an exact match also ranks higher in the election.
pub const PROXY_KEYWORDS: &[&str] = &["nginx", "nginx-web", "haproxy", "traefik", "caddy", "envoy"];

/// Services whose names contain "proxy" but have nothing to do with ingress.
pub const PROXY_EXCLUDES: &[&str] = &["mpris-proxy"];

pub const SELF_KEYWORDS: &[&str] = &["servicebay"];

pub const ROLE_LABEL: &str = "servicebay.role";
pub const REVERSE_PROXY_ROLE: &str = "reverse-proxy";
pub const SELF_ROLE: &str = "servicebay";
pub const PROTECTED_LABEL: &str = "servicebay.protected";

fn contains_keyword(haystack: &str, keywords: &[&str]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    keywords.iter().any(|k| haystack.contains(k))
}

/// Last path segment of an image reference, without tag or digest.
fn image_basename(image: &str) -> &str {
    let name = image.rsplit('/').next().unwrap_or(image);
    let name = name.split('@').next().unwrap_or(name);
    name.split(':').next().unwrap_or(name)
}

fn is_excluded(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    PROXY_EXCLUDES.iter().any(|e| name.contains(e))
}

/// The agent's description, else `Description=` from the unit file.
fn unit_description(service: &ServiceUnit, files: &BTreeMap<String, WatchedFile>) -> String {
    if !service.description.is_empty() {
        return service.description.clone();
    }
    quadlet::unit_file_for(files, &service.name)
        .and_then(|f| quadlet::parse(&f.content).description)
        .unwrap_or_default()
}

/// Tier (a): the unit's own name and description.
fn unit_looks_like_proxy(name: &str, description: &str) -> bool {
    if is_excluded(name) {
        return false;
    }
    contains_keyword(name, PROXY_KEYWORDS)
        || contains_keyword(description, PROXY_KEYWORDS)
        || name.to_ascii_lowercase().contains("proxy")
}

/// Tier (b): evidence from the containers implementing the unit.
fn container_looks_like_proxy(container: &Container) -> bool {
    container.label(ROLE_LABEL) == Some(REVERSE_PROXY_ROLE)
        || contains_keyword(image_basename(&container.image), PROXY_KEYWORDS)
        || contains_keyword(container.display_name(), PROXY_KEYWORDS)
}

fn unit_looks_like_self(name: &str, description: &str) -> bool {
    contains_keyword(name, SELF_KEYWORDS) || contains_keyword(description, SELF_KEYWORDS)
}

fn container_looks_like_self(container: &Container) -> bool {
    container.label(PROTECTED_LABEL) == Some("true")
        || container.label(ROLE_LABEL) == Some(SELF_ROLE)
        || contains_keyword(image_basename(&container.image), SELF_KEYWORDS)
        || contains_keyword(container.display_name(), SELF_KEYWORDS)
}

pub fn is_well_known_proxy_name(name: &str) -> bool {
    PROXY_KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
}

/// Recompute `is_reverse_proxy`, `is_service_bay` and `is_primary_proxy` for every service.
pub fn resolve(
    services: &mut [ServiceUnit],
    containers: &[Container],
    files: &BTreeMap<String, WatchedFile>,
) {
    let by_id: HashMap<&str, &Container> = containers.iter().map(|c| (c.id.as_str(), c)).collect();

    for service in services.iter_mut() {
        let linked: Vec<&Container> = service
            .associated_container_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();
        let description = unit_description(service, files);

        service.is_reverse_proxy = !is_excluded(&service.name)
            && (service.reported_reverse_proxy
                || unit_looks_like_proxy(&service.name, &description)
                || linked.iter().any(|c| container_looks_like_proxy(c)));
        service.is_service_bay = unit_looks_like_self(&service.name, &description)
            || linked.iter().any(|c| container_looks_like_self(c));
    }

    elect_primary(services);
}

/// Exactly one proxy candidate keeps `is_primary_proxy`; ties go to the earliest listed.
fn elect_primary(services: &mut [ServiceUnit]) {
    let mut candidates: Vec<usize> = services
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_reverse_proxy)
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by_key(|&i| {
        let s = &services[i];
        (!s.is_active(), !is_well_known_proxy_name(&s.name))
    });

    let primary = candidates.first().copied();
    for (i, service) in services.iter_mut().enumerate() {
        service.is_primary_proxy = Some(i) == primary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, active: &str) -> ServiceUnit {
        ServiceUnit {
            name: name.into(),
            active_state: active.into(),
            ..ServiceUnit::default()
        }
    }

    #[test]
    fn keyword_and_fallback_matching() {
        let mut services = vec![
            svc("nginx-web", "active"),
            svc("my-proxy", "active"),
            svc("mpris-proxy", "active"),
            svc("postgres", "active"),
        ];
        resolve(&mut services, &[], &BTreeMap::new());
        let flags: Vec<bool> = services.iter().map(|s| s.is_reverse_proxy).collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }

    #[test]
    fn container_label_marks_proxy() {
        let mut services = vec![ServiceUnit {
            associated_container_ids: vec!["c1".into()],
            ..svc("ingress", "active")
        }];
        let container = Container {
            id: "c1".into(),
            names: vec!["/ingress".into()],
            image: "docker.io/library/busybox:latest".into(),
            state: "running".into(),
            ports: vec![],
            labels: [(ROLE_LABEL.to_string(), REVERSE_PROXY_ROLE.to_string())].into(),
            networks: vec![],
            is_host_network: false,
            pod_id: None,
            pod_name: None,
            pid: None,
            verified_domains: None,
        };
        resolve(&mut services, &[container], &BTreeMap::new());
        assert!(services[0].is_reverse_proxy);
        assert!(services[0].is_primary_proxy);
    }

    #[test]
    fn election_prefers_active_then_well_known() {
        let mut services = vec![
            svc("edge-proxy", "active"),
            svc("nginx", "inactive"),
            svc("traefik", "active"),
        ];
        resolve(&mut services, &[], &BTreeMap::new());
        let primaries: Vec<&str> = services
            .iter()
            .filter(|s| s.is_primary_proxy)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(primaries, vec!["traefik"]);
    }

    #[test]
    fn self_identification() {
        let mut services = vec![svc("servicebay", "active"), svc("grafana", "active")];
        resolve(&mut services, &[], &BTreeMap::new());
        assert!(services[0].is_service_bay);
        assert!(!services[1].is_service_bay);
    }

    #[test]
    fn unit_file_description_is_tier_a_evidence() {
        let files: BTreeMap<String, WatchedFile> = [(
            "/q/ingress.container".to_string(),
            WatchedFile {
                path: "/q/ingress.container".into(),
                content: "[Unit]\nDescription=Traefik edge router\n[Container]\nImage=edge\n".into(),
                modified: 0.0,
            },
        )]
        .into();
        let mut services = vec![svc("ingress", "active")];
        resolve(&mut services, &[], &files);
        assert!(services[0].is_reverse_proxy);

        let mut described = vec![ServiceUnit {
            description: "Internal router".into(),
            ..svc("ingress", "active")
        }];
        resolve(&mut described, &[], &files);
        assert!(!described[0].is_reverse_proxy);
    }

    #[test]
    fn image_basename_strips_registry_and_tag() {
        assert_eq!(image_basename("docker.io/library/nginx:1.27"), "nginx");
        assert_eq!(image_basename("traefik@sha256:abc"), "traefik");
    }
}
