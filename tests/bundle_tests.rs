// Bundle builder: grouping, dependency graph, naming, assets and severity

mod common;

use common::*;
use fleet_twin::models::{AssetKind, BundleSeverity, DependencyReason, GraphEdge};
use serde_json::json;

#[test]
fn test_units_sharing_a_pod_form_one_bundle() {
    let twin = fresh_twin();
    twin.update_node(
        "n1",
        &json!({
            "services": [
                service("svcA", "active"),
                service("svcB", "active"),
                service("svcC", "active"),
                service("other", "active"),
            ],
            "files": {
                "/q/svcA.container": unit_file("/q/svcA.container", "[Unit]\nRequires=dep.service\n\n[Container]\nImage=a\nPod=app.pod\n"),
                "/q/svcB.container": unit_file("/q/svcB.container", "[Container]\nImage=b\nPod=app.pod\n"),
                "/q/svcC.container": unit_file("/q/svcC.container", "[Unit]\nAfter=network-online.target\n[Container]\nImage=c\nPod=app\n"),
            },
        }),
    );

    let bundles = twin.bundles("n1").unwrap();
    assert_eq!(bundles.len(), 2);

    let app = &bundles[0];
    assert_eq!(app.derived_name, "app");
    assert_eq!(app.id, "app");
    assert_eq!(app.display_name, "App");
    assert_eq!(app.node_name, "n1");
    let names: Vec<&str> = app.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["svcA", "svcB", "svcC"]);
    assert!(app.graph.contains(&GraphEdge {
        from: "svcA".into(),
        to: "dep.service".into(),
        reason: DependencyReason::Requires,
    }));
    assert_eq!(
        serde_json::to_value(&app.graph[0]).unwrap(),
        json!({"from": "svcA", "to": "dep.service", "reason": "Requires"})
    );
    assert!(app.hints.contains(&"Hard dependencies: dep.service".to_string()));
    assert!(app.hints.contains(&"Ordered after: network-online.target".to_string()));
    assert!(app.hints.contains(&"Missing dependencies: dep.service".to_string()));
    assert_eq!(app.severity, BundleSeverity::Warning);

    assert_eq!(bundles[1].derived_name, "other");
    assert_eq!(bundles[1].severity, BundleSeverity::Ok);
}

#[test]
fn test_dependency_on_local_service_joins_bundle() {
    let twin = fresh_twin();
    let mut web = service("blog-web", "active");
    web["requires"] = json!("blog-db.service");
    web["wants"] = json!(["redis"]);
    twin.update_node(
        "n1",
        &json!({ "services": [web, service("blog-db", "active"), service("redis", "active")] }),
    );

    let bundles = twin.bundles("n1").unwrap();
    assert_eq!(bundles.len(), 1);
    let blog = &bundles[0];
    assert_eq!(blog.services.len(), 3);
    assert_eq!(blog.derived_name, "blog-web");
    assert!(blog.hints.contains(&"Soft dependencies: redis.service".to_string()));
    assert_eq!(blog.severity, BundleSeverity::Ok);
}

#[test]
fn test_common_prefix_names_multi_member_bundle() {
    let twin = fresh_twin();
    let mut server = service("immich-server", "active");
    server["after"] = json!(["immich-ml.service"]);
    twin.update_node(
        "n1",
        &json!({ "services": [server, service("immich-ml", "active")] }),
    );
    let bundles = twin.bundles("n1").unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].derived_name, "immich");
    assert_eq!(bundles[0].display_name, "Immich");
}

#[test]
fn test_failed_member_makes_bundle_critical() {
    let twin = fresh_twin();
    let mut api = service("shop-api", "active");
    api["bindsTo"] = json!("shop-db.service");
    twin.update_node(
        "n1",
        &json!({ "services": [api, service("shop-db", "failed")] }),
    );
    let bundles = twin.bundles("n1").unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].severity, BundleSeverity::Critical);
    assert!(
        bundles[0]
            .hints
            .contains(&"Binding relationships: shop-db.service".to_string())
    );
}

#[test]
fn test_bundle_summarizes_containers_ports_and_assets() {
    let twin = fresh_twin();
    twin.update_node(
        "n1",
        &json!({
            "containers": [container("c1", "photos", json!([{"hostPort": 2283, "containerPort": 3001}]))],
            "services": [service("photos", "active")],
            "files": {
                "/q/photos.kube": unit_file("/q/photos.kube", "[Kube]\nYaml=stacks/photos.yml\n"),
                "/q/stacks/photos.yml": unit_file("/q/stacks/photos.yml", "kind: Pod\nspec:\n  containers: []\n"),
            },
        }),
    );
    let bundles = twin.bundles("n1").unwrap();
    let photos = &bundles[0];

    assert_eq!(photos.containers.len(), 1);
    assert_eq!(photos.containers[0].name, "photos");
    assert_eq!(photos.containers[0].state, "running");
    assert_eq!(photos.ports.len(), 1);
    assert_eq!(photos.ports[0].host_port, Some(2283));

    let assets: Vec<(&str, AssetKind)> = photos
        .assets
        .iter()
        .map(|a| (a.path.as_str(), a.kind))
        .collect();
    assert_eq!(
        assets,
        vec![
            ("/q/photos.kube", AssetKind::Kube),
            ("/q/stacks/photos.yml", AssetKind::Yaml),
        ]
    );
    assert_eq!(photos.services[0].unit_file.as_deref(), Some("/q/photos.kube"));
}

#[test]
fn test_bundle_ids_are_unique_per_node() {
    let twin = fresh_twin();
    twin.update_node(
        "n1",
        &json!({ "services": [service("my.app", "active"), service("my-app", "inactive")] }),
    );
    let bundles = twin.bundles("n1").unwrap();
    let ids: Vec<&str> = bundles.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["my-app", "my-app-2"]);
    assert_eq!(bundles[1].severity, BundleSeverity::Warning);
}

#[test]
fn test_node_without_services_has_no_bundles() {
    let twin = fresh_twin();
    twin.register_node("empty");
    assert!(twin.bundles("empty").unwrap().is_empty());
}
