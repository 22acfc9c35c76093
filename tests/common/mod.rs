// Shared test helpers
#![allow(dead_code)]

use fleet_twin::config::AppConfig;
use fleet_twin::twin::TwinStore;
use serde_json::{Value, json};

pub const TEST_CONFIG: &str = r#"
[server]
port = 8090
host = "127.0.0.1"

[twin]
migration_log_capacity = 25

[ingest]
channel_capacity = 32
stats_log_interval_secs = 60

[publishing]
broadcast_capacity = 16
"#;

pub fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub fn fresh_twin() -> TwinStore {
    TwinStore::new(test_app_config().twin.migration_log_capacity)
}

/// Agent-shaped container entry (podman ps JSON).
pub fn container(id: &str, name: &str, ports: Value) -> Value {
    json!({
        "Id": id,
        "Names": [name],
        "Image": format!("docker.io/library/{}:latest", name),
        "State": "running",
        "Ports": ports,
        "Labels": {},
        "Networks": ["bridge"],
    })
}

pub fn host_container(id: &str, name: &str, pid: u32, ports: Value) -> Value {
    json!({
        "Id": id,
        "Names": [name],
        "Image": format!("docker.io/library/{}:latest", name),
        "State": "running",
        "Ports": ports,
        "Networks": ["host"],
        "Pid": pid,
    })
}

pub fn service(name: &str, active_state: &str) -> Value {
    json!({
        "name": format!("{}.service", name),
        "activeState": active_state,
        "subState": if active_state == "active" { "running" } else { "dead" },
        "loadState": "loaded",
    })
}

pub fn resources_with_ip(ip: &str) -> Value {
    json!({
        "cpuUsage": 3.5,
        "memoryUsage": 1024,
        "totalMemory": 4096,
        "network": {
            "eth0": [
                {"address": ip, "family": "IPv4", "internal": false},
                {"address": "fe80::1", "family": "IPv6", "internal": false}
            ],
            "lo": [{"address": "127.0.0.1", "family": "IPv4", "internal": true}]
        }
    })
}

pub fn unit_file(path: &str, content: &str) -> Value {
    json!({ "path": path, "content": content, "modified": 1_700_000_000.0 })
}
