// Model serialization tests (JSON camelCase, wire renames, podman aliases)

use fleet_twin::models::*;

#[test]
fn test_node_twin_serialization_camel_case() {
    let node = NodeTwin {
        connected: true,
        last_sync: 42,
        node_ips: vec!["10.0.0.5".into()],
        proxy_routes: vec![ProxyRoute {
            host: "a.example.com".into(),
            target_service: "10.0.0.5:9000".into(),
            target_port: None,
            ssl: true,
        }],
        ..NodeTwin::default()
    };
    let json = serde_json::to_string(&node).unwrap();
    assert!(json.contains("\"nodeIPs\""));
    assert!(json.contains("\"lastSync\""));
    assert!(json.contains("\"initialSyncComplete\""));
    assert!(json.contains("\"targetService\""));
    assert!(!json.contains("\"resources\""));
    let back: NodeTwin = serde_json::from_str(&json).unwrap();
    assert_eq!(back, node);
}

#[test]
fn test_service_unit_hides_agent_claim_and_empty_derived_fields() {
    let service = ServiceUnit {
        name: "nginx".into(),
        active_state: "active".into(),
        reported_reverse_proxy: true,
        is_primary_proxy: true,
        ..ServiceUnit::default()
    };
    let value = serde_json::to_value(&service).unwrap();
    assert_eq!(value["isPrimaryProxy"], serde_json::json!(true));
    assert!(value.get("reportedReverseProxy").is_none());
    assert!(value.get("ports").is_none());
    assert!(value.get("verifiedDomains").is_none());
    assert!(value.get("declaredPorts").is_none());
}

#[test]
fn test_port_mapping_defaults_protocol() {
    let port: PortMapping = serde_json::from_str(r#"{"hostPort": 8080}"#).unwrap();
    assert_eq!(port.protocol, DEFAULT_PROTOCOL);
    assert_eq!(port.container_port, None);
    let json = serde_json::to_string(&PortMapping::host(80)).unwrap();
    assert_eq!(json, r#"{"hostPort":80,"containerPort":80,"protocol":"tcp"}"#);
}

#[test]
fn test_merge_ports_dedupes_by_ports_and_protocol() {
    let mut ports = vec![PortMapping::host(80)];
    let mut udp = PortMapping::host(80);
    udp.protocol = "udp".into();
    let mut bound = PortMapping::host(80);
    bound.host_ip = Some("10.0.0.5".into());
    merge_ports(&mut ports, &[bound, udp, PortMapping::host(8081)]);
    let keys: Vec<_> = ports.iter().map(|p| (p.host_port, p.protocol.as_str())).collect();
    assert_eq!(keys, vec![(Some(80), "tcp"), (Some(80), "udp"), (Some(8081), "tcp")]);
}

#[test]
fn test_volume_accepts_podman_shape() {
    let v: Volume = serde_json::from_str(
        r#"{"Name":"data","Driver":"local","Mountpoint":"/var/lib/data","Labels":null,"UsedBy":[{"id":"c1","name":"web"}]}"#,
    )
    .unwrap();
    assert_eq!(v.name, "data");
    assert!(v.labels.is_empty());
    assert_eq!(v.used_by[0].name, "web");
    let json = serde_json::to_string(&v).unwrap();
    assert!(json.contains("\"usedBy\""));
}

#[test]
fn test_network_address_external_ipv4() {
    let addr = |address: &str, family: &str, internal: bool| NetworkAddress {
        address: address.into(),
        family: family.into(),
        internal,
    };
    assert!(addr("192.168.1.10", "IPv4", false).is_external_ipv4());
    assert!(!addr("127.0.0.1", "IPv4", true).is_external_ipv4());
    assert!(!addr("fe80::1", "IPv6", false).is_external_ipv4());
}

#[test]
fn test_bundle_enums_serialize_lowercase() {
    assert_eq!(
        serde_json::to_string(&BundleSeverity::Critical).unwrap(),
        "\"critical\""
    );
    assert_eq!(serde_json::to_string(&AssetKind::Kube).unwrap(), "\"kube\"");
    assert_eq!(AssetKind::from_path("/q/app.yml"), AssetKind::Yaml);
    assert_eq!(AssetKind::from_path("/q/app.network"), AssetKind::Other);
    assert_eq!(DependencyReason::BindsTo.hint_label(), "Binding relationships");
}

#[test]
fn test_migration_event_roundtrip() {
    let event: MigrationEvent = serde_json::from_str(
        r#"{"bundleId":"wiki","action":"stop","status":"failed","message":"timeout"}"#,
    )
    .unwrap();
    assert_eq!(event.timestamp, 0);
    assert_eq!(event.status, MigrationStatus::Failed);
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"bundleId\":\"wiki\""));
}
