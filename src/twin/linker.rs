// Service <-> container association. Links only ever accumulate.

use std::collections::BTreeMap;

use crate::models::{Container, SYSTEMD_UNIT_LABEL, ServiceUnit, WatchedFile};
use crate::quadlet;

fn has_name(container: &Container, name: &str) -> bool {
    container
        .names
        .iter()
        .any(|n| n.trim_start_matches('/') == name)
}

/// Whether `container` carries evidence of being started by `service`.
pub fn container_implements(service_name: &str, container: &Container) -> bool {
    let unit = format!("{}.service", service_name);
    if container.label(SYSTEMD_UNIT_LABEL) == Some(unit.as_str()) {
        return true;
    }

    if let Some(pod) = container.pod_name.as_deref()
        && (pod == service_name || pod.strip_suffix("-pod") == Some(service_name))
    {
        return true;
    }

    has_name(container, service_name) || has_name(container, &format!("systemd-{}", service_name))
}

/// Union newly evidenced container ids into each service's association set.
/// A unit file's `ContainerName=` counts as evidence too.
pub fn link(
    services: &mut [ServiceUnit],
    containers: &[Container],
    files: &BTreeMap<String, WatchedFile>,
) {
    for service in services.iter_mut() {
        let declared_name = quadlet::unit_file_for(files, &service.name)
            .and_then(|f| quadlet::parse(&f.content).container_name);
        for container in containers {
            let evidenced = container_implements(&service.name, container)
                || declared_name
                    .as_deref()
                    .is_some_and(|name| has_name(container, name));
            if evidenced && !service.associated_container_ids.contains(&container.id) {
                service.associated_container_ids.push(container.id.clone());
            }
        }
    }
}

/// Carry associations from the previously stored units over to a fresh service list.
pub fn carry_over(previous: &[ServiceUnit], incoming: &mut [ServiceUnit]) {
    for service in incoming.iter_mut() {
        let Some(old) = previous.iter().find(|p| p.name == service.name) else {
            continue;
        };
        for id in &old.associated_container_ids {
            if !service.associated_container_ids.contains(id) {
                service.associated_container_ids.push(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, name: &str) -> Container {
        Container {
            id: id.into(),
            names: vec![format!("/{}", name)],
            image: String::new(),
            state: "running".into(),
            ports: vec![],
            labels: BTreeMap::new(),
            networks: vec![],
            is_host_network: false,
            pod_id: None,
            pod_name: None,
            pid: None,
            verified_domains: None,
        }
    }

    #[test]
    fn links_by_label_pod_and_name() {
        let mut by_label = container("c1", "whatever");
        by_label
            .labels
            .insert(SYSTEMD_UNIT_LABEL.into(), "app.service".into());
        let mut by_pod = container("c2", "app-db");
        by_pod.pod_name = Some("app-pod".into());
        let by_name = container("c3", "systemd-app");
        let unrelated = container("c4", "application");

        let mut services = vec![ServiceUnit {
            name: "app".into(),
            ..ServiceUnit::default()
        }];
        link(&mut services, &[by_label, by_pod, by_name, unrelated], &BTreeMap::new());
        assert_eq!(services[0].associated_container_ids, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn links_by_container_name_directive() {
        let files: BTreeMap<String, WatchedFile> = [(
            "/q/photos.container".to_string(),
            WatchedFile {
                path: "/q/photos.container".into(),
                content: "[Container]\nImage=immich\nContainerName=immich_server\n".into(),
                modified: 0.0,
            },
        )]
        .into();
        let mut services = vec![ServiceUnit {
            name: "photos".into(),
            ..ServiceUnit::default()
        }];
        let containers = [container("c1", "immich_server"), container("c2", "immich_ml")];

        link(&mut services, &containers, &BTreeMap::new());
        assert!(services[0].associated_container_ids.is_empty());

        link(&mut services, &containers, &files);
        assert_eq!(services[0].associated_container_ids, vec!["c1"]);
    }

    #[test]
    fn carry_over_unions_with_previous() {
        let previous = vec![ServiceUnit {
            name: "app".into(),
            associated_container_ids: vec!["a".into()],
            ..ServiceUnit::default()
        }];
        let mut incoming = vec![ServiceUnit {
            name: "app".into(),
            associated_container_ids: vec!["b".into()],
            ..ServiceUnit::default()
        }];
        carry_over(&previous, &mut incoming);
        assert_eq!(incoming[0].associated_container_ids, vec!["b", "a"]);
    }
}
