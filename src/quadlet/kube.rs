// Port extraction from Kubernetes pod YAML referenced by `.kube` units

use serde::Deserialize;
use serde_yaml::Value;

use crate::models::PortMapping;
use crate::twin::ports::normalize_protocol;

const CONTAINER_LISTS: &[&str] = &["containers", "initContainers"];

fn as_port(v: Option<&Value>) -> Option<u16> {
    v.and_then(Value::as_u64)
        .and_then(|n| u16::try_from(n).ok())
        .filter(|p| *p > 0)
}

/// Pod specs of one document: a bare Pod, or any workload with `spec.template.spec`.
fn pod_specs(doc: &Value) -> Vec<&Value> {
    let mut specs = Vec::new();
    if let Some(spec) = doc.get("spec") {
        if spec.get("containers").is_some() || spec.get("initContainers").is_some() {
            specs.push(spec);
        }
        if let Some(template_spec) = spec.get("template").and_then(|t| t.get("spec")) {
            specs.push(template_spec);
        }
    }
    specs
}

fn spec_ports(spec: &Value, out: &mut Vec<PortMapping>) {
    let host_network = spec
        .get("hostNetwork")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    for list in CONTAINER_LISTS {
        let Some(containers) = spec.get(*list).and_then(Value::as_sequence) else {
            continue;
        };
        for container in containers {
            let Some(ports) = container.get("ports").and_then(Value::as_sequence) else {
                continue;
            };
            for port in ports {
                let container_port = as_port(port.get("containerPort"));
                let host_port = as_port(port.get("hostPort"))
                    .or(if host_network { container_port } else { None });
                if host_port.is_none() && container_port.is_none() {
                    continue;
                }
                let mapping = PortMapping {
                    host_port,
                    container_port,
                    protocol: normalize_protocol(port.get("protocol").and_then(Value::as_str)),
                    host_ip: port
                        .get("hostIP")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                crate::models::merge_ports(out, [&mapping]);
            }
        }
    }
}

/// All container/init-container ports across every document of a multi-doc YAML.
pub fn kube_ports(yaml: &str) -> Result<Vec<PortMapping>, serde_yaml::Error> {
    let mut out = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let value = Value::deserialize(doc)?;
        if value.is_null() {
            continue;
        }
        for spec in pod_specs(&value) {
            spec_ports(spec, &mut out);
        }
    }
    Ok(out)
}
