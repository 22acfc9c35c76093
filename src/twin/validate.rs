// Shape validation of inbound partial snapshots.
// Each field is checked on its own; a malformed field (or array element) is dropped
// with a warning and the rest of the partial still applies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use super::ports::{RawPortNumber, normalize_ports};
use crate::models::{
    Container, ProxyRoute, ServiceUnit, SystemResources, Volume, WatchedFile,
};

/// A decoded partial update; `None` means "field absent or dropped, keep prior value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePartial {
    pub containers: Option<Vec<Container>>,
    pub services: Option<Vec<ServiceUnit>>,
    pub volumes: Option<Vec<Volume>>,
    pub files: Option<BTreeMap<String, WatchedFile>>,
    pub proxy_routes: Option<Vec<ProxyRoute>>,
    pub resources: Option<SystemResources>,
    pub initial_sync_complete: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeWarning {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }

    /// Dependency lists may arrive as one space/comma separated string.
    fn into_unit_list(self) -> Vec<String> {
        self.into_vec()
            .iter()
            .flat_map(|s| crate::quadlet::parse_unit_list(s))
            .collect()
    }
}

/// Podman reports networks either as a list of names or as an object keyed by name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNetworks {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl RawNetworks {
    fn into_names(self) -> Vec<String> {
        match self {
            RawNetworks::List(v) => v,
            RawNetworks::Map(m) => m.into_keys().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContainer {
    #[serde(alias = "Id")]
    id: String,
    #[serde(default, alias = "Names")]
    names: Option<OneOrMany>,
    #[serde(default, alias = "Image")]
    image: Option<String>,
    #[serde(default, alias = "State")]
    state: Option<String>,
    #[serde(default, alias = "Ports")]
    ports: Option<Value>,
    #[serde(default, alias = "Labels")]
    labels: Option<BTreeMap<String, Value>>,
    #[serde(default, alias = "Networks")]
    networks: Option<RawNetworks>,
    #[serde(default)]
    is_host_network: Option<bool>,
    #[serde(default, alias = "Pod")]
    pod_id: Option<String>,
    #[serde(default, alias = "PodName")]
    pod_name: Option<String>,
    #[serde(default, alias = "Pid")]
    pid: Option<i64>,
}

impl RawContainer {
    fn into_container(self) -> Container {
        let names = self.names.map(OneOrMany::into_vec).unwrap_or_default();
        let owner = names.first().cloned().unwrap_or_else(|| self.id.clone());
        let networks = self.networks.map(RawNetworks::into_names).unwrap_or_default();
        let is_host_network =
            self.is_host_network.unwrap_or(false) || networks.iter().any(|n| n == "host");
        let labels = self
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();
        Container {
            ports: ports_field(self.ports, &owner),
            id: self.id,
            names,
            image: self.image.unwrap_or_default(),
            state: self.state.unwrap_or_default(),
            labels,
            networks,
            is_host_network,
            pod_id: self.pod_id.filter(|s| !s.is_empty()),
            pod_name: self.pod_name.filter(|s| !s.is_empty()),
            pid: self
                .pid
                .filter(|p| *p > 0)
                .and_then(|p| u32::try_from(p).ok()),
            verified_domains: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawService {
    #[serde(alias = "unit")]
    name: String,
    #[serde(default)]
    active_state: Option<String>,
    #[serde(default)]
    sub_state: Option<String>,
    #[serde(default)]
    load_state: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "fragment_path")]
    path: Option<String>,
    #[serde(default)]
    associated_container_ids: Option<Vec<String>>,
    #[serde(default)]
    ports: Option<Value>,
    #[serde(default)]
    is_reverse_proxy: Option<bool>,
    #[serde(default)]
    requires: Option<OneOrMany>,
    #[serde(default)]
    after: Option<OneOrMany>,
    #[serde(default)]
    wants: Option<OneOrMany>,
    #[serde(default)]
    binds_to: Option<OneOrMany>,
    #[serde(default)]
    pod_reference: Option<String>,
}

impl RawService {
    fn into_service(self) -> ServiceUnit {
        let name = self
            .name
            .strip_suffix(".service")
            .unwrap_or(&self.name)
            .to_string();
        let mut associated: Vec<String> = Vec::new();
        for id in self.associated_container_ids.unwrap_or_default() {
            if !associated.contains(&id) {
                associated.push(id);
            }
        }
        ServiceUnit {
            declared_ports: ports_field(self.ports, &name),
            active_state: self.active_state.unwrap_or_default(),
            sub_state: self.sub_state.unwrap_or_default(),
            load_state: self.load_state.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            path: self.path.unwrap_or_default(),
            associated_container_ids: associated,
            reported_reverse_proxy: self.is_reverse_proxy.unwrap_or(false),
            requires: self.requires.map(OneOrMany::into_unit_list).unwrap_or_default(),
            after: self.after.map(OneOrMany::into_unit_list).unwrap_or_default(),
            wants: self.wants.map(OneOrMany::into_unit_list).unwrap_or_default(),
            binds_to: self.binds_to.map(OneOrMany::into_unit_list).unwrap_or_default(),
            pod_reference: self.pod_reference.filter(|s| !s.is_empty()),
            name,
            ..ServiceUnit::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    host: String,
    #[serde(alias = "target_service")]
    target_service: String,
    #[serde(default, alias = "target_port")]
    target_port: Option<RawPortNumber>,
    #[serde(default)]
    ssl: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    modified: Option<f64>,
}

fn ports_field(value: Option<Value>, owner: &str) -> Vec<crate::models::PortMapping> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => normalize_ports(&items, owner),
        Some(other) => {
            warn!(owner, kind = json_kind(&other), "ports is not an array; ignoring");
            Vec::new()
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct Validator<'a> {
    node_id: &'a str,
    warnings: Vec<ShapeWarning>,
}

impl Validator<'_> {
    fn reject(&mut self, field: &str, reason: String) {
        warn!(node_id = self.node_id, field, reason = %reason, "dropping malformed snapshot field");
        self.warnings.push(ShapeWarning {
            field: field.to_string(),
            reason,
        });
    }

    /// `None` when the field is not an array; otherwise each decodable element.
    fn array<T>(
        &mut self,
        field: &str,
        value: &Value,
        decode: impl Fn(&Value) -> Result<T, String>,
    ) -> Option<Vec<T>> {
        let Value::Array(items) = value else {
            self.reject(field, format!("expected array, got {}", json_kind(value)));
            return None;
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match decode(item) {
                Ok(v) => out.push(v),
                Err(reason) => self.reject(&format!("{}[{}]", field, i), reason),
            }
        }
        Some(out)
    }
}

fn decode_container(v: &Value) -> Result<Container, String> {
    RawContainer::deserialize(v)
        .map(RawContainer::into_container)
        .map_err(|e| e.to_string())
}

fn decode_service(v: &Value) -> Result<ServiceUnit, String> {
    let service = RawService::deserialize(v)
        .map(RawService::into_service)
        .map_err(|e| e.to_string())?;
    if service.name.is_empty() {
        return Err("service name is empty".into());
    }
    Ok(service)
}

fn decode_volume(v: &Value) -> Result<Volume, String> {
    Volume::deserialize(v).map_err(|e| e.to_string())
}

fn decode_route(v: &Value) -> Result<ProxyRoute, String> {
    let raw = RawRoute::deserialize(v).map_err(|e| e.to_string())?;
    if raw.host.trim().is_empty() {
        return Err("route host is empty".into());
    }
    let target_port = match raw.target_port {
        Some(RawPortNumber::Int(n)) => u16::try_from(n).ok().filter(|p| *p > 0),
        Some(RawPortNumber::Float(f)) => u16::try_from(f as i64).ok().filter(|p| *p > 0),
        Some(RawPortNumber::Text(s)) => s.trim().parse::<u16>().ok().filter(|p| *p > 0),
        None => None,
    };
    Ok(ProxyRoute {
        host: raw.host.trim().to_string(),
        target_service: raw.target_service.trim().to_string(),
        target_port,
        ssl: raw.ssl.unwrap_or(false),
    })
}

/// Validate and decode a loose JSON partial snapshot.
pub fn validate_partial(node_id: &str, value: &Value) -> (NodePartial, Vec<ShapeWarning>) {
    let mut v = Validator {
        node_id,
        warnings: Vec::new(),
    };
    let mut partial = NodePartial::default();

    let Value::Object(map) = value else {
        v.reject("<root>", format!("expected object, got {}", json_kind(value)));
        return (partial, v.warnings);
    };

    if let Some(raw) = map.get("containers") {
        partial.containers = v.array("containers", raw, decode_container);
    }
    if let Some(raw) = map.get("services") {
        partial.services = v.array("services", raw, decode_service);
    }
    if let Some(raw) = map.get("volumes") {
        partial.volumes = v.array("volumes", raw, decode_volume);
    }
    // agents send routes under `proxy`
    if let Some((field, raw)) = map
        .get_key_value("proxyRoutes")
        .or_else(|| map.get_key_value("proxy"))
    {
        partial.proxy_routes = v.array(field, raw, decode_route);
    }

    if let Some(raw) = map.get("files") {
        match raw {
            Value::Object(entries) => {
                let mut files = BTreeMap::new();
                for (key, entry) in entries {
                    match RawFile::deserialize(entry) {
                        Ok(f) => {
                            let path = f.path.filter(|p| !p.is_empty()).unwrap_or_else(|| key.clone());
                            files.insert(
                                key.clone(),
                                WatchedFile {
                                    path,
                                    content: f.content.unwrap_or_default(),
                                    modified: f.modified.unwrap_or(0.0),
                                },
                            );
                        }
                        Err(e) => v.reject(&format!("files[{}]", key), e.to_string()),
                    }
                }
                partial.files = Some(files);
            }
            other => v.reject("files", format!("expected object, got {}", json_kind(other))),
        }
    }

    if let Some(raw) = map.get("resources") {
        match raw {
            Value::Object(_) => match SystemResources::deserialize(raw) {
                Ok(r) => partial.resources = Some(r),
                Err(e) => v.reject("resources", e.to_string()),
            },
            Value::Null => {}
            other => v.reject("resources", format!("expected object, got {}", json_kind(other))),
        }
    }

    if let Some(raw) = map.get("initialSyncComplete") {
        match raw.as_bool() {
            Some(b) => partial.initial_sync_complete = Some(b),
            None => v.reject(
                "initialSyncComplete",
                format!("expected bool, got {}", json_kind(raw)),
            ),
        }
    }

    (partial, v.warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_array_fields_are_dropped_individually() {
        let (partial, warnings) = validate_partial(
            "n1",
            &json!({
                "containers": "oops",
                "services": [{"name": "web.service", "activeState": "active"}],
                "volumes": null,
                "proxy": {"host": "x"},
                "files": ["not", "an", "object"]
            }),
        );
        assert!(partial.containers.is_none());
        assert!(partial.volumes.is_none());
        assert!(partial.proxy_routes.is_none());
        assert!(partial.files.is_none());
        let services = partial.services.unwrap();
        assert_eq!(services[0].name, "web");
        let fields: Vec<_> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["containers", "volumes", "proxy", "files"]);
    }

    #[test]
    fn bad_elements_are_dropped_but_array_survives() {
        let (partial, warnings) = validate_partial(
            "n1",
            &json!({"containers": [{"id": "a", "Names": ["/a"]}, 42, {"names": ["no-id"]}]}),
        );
        let containers = partial.containers.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].display_name(), "a");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn podman_container_shape_is_decoded() {
        let (partial, _) = validate_partial(
            "n1",
            &json!({"containers": [{
                "Id": "abc",
                "Names": "/adguard",
                "Image": "docker.io/adguard/adguardhome",
                "State": "running",
                "Ports": [{"host_port": 53, "container_port": 53, "protocol": "udp"}],
                "Labels": {"PODMAN_SYSTEMD_UNIT": "adguard.service", "n": 1},
                "Networks": {"host": {}},
                "Pid": 0,
                "PodName": ""
            }]}),
        );
        let c = &partial.containers.unwrap()[0];
        assert_eq!(c.names, vec!["/adguard".to_string()]);
        assert!(c.is_host_network);
        assert_eq!(c.pid, None);
        assert_eq!(c.pod_name, None);
        assert_eq!(c.label("n"), Some("1"));
        assert_eq!(c.ports[0].protocol, "udp");
    }

    #[test]
    fn files_and_resources_are_checked() {
        let (partial, warnings) = validate_partial(
            "n1",
            &json!({
                "files": {"/a.container": {"content": "[Container]"}, "/b": 5},
                "resources": 12,
                "initialSyncComplete": true
            }),
        );
        let files = partial.files.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["/a.container"].path, "/a.container");
        assert!(partial.resources.is_none());
        assert_eq!(partial.initial_sync_complete, Some(true));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn non_object_root_drops_everything() {
        let (partial, warnings) = validate_partial("n1", &json!([1, 2, 3]));
        assert_eq!(partial, NodePartial::default());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn dependency_strings_are_split() {
        let (partial, _) = validate_partial(
            "n1",
            &json!({"services": [{"name": "a", "requires": "b.service, c.service", "after": ["d.service"]}]}),
        );
        let s = &partial.services.unwrap()[0];
        assert_eq!(s.requires, vec!["b.service", "c.service"]);
        assert_eq!(s.after, vec!["d.service"]);
    }
}
