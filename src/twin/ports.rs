// Port normalization: every port shape agents have produced -> PortMapping

use serde::Deserialize;

use crate::error::PortDecodeError;
use crate::models::{DEFAULT_PROTOCOL, PortMapping};

/// A port number as it shows up on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPortNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawPortNumber {
    fn to_port(&self) -> Result<u16, PortDecodeError> {
        match self {
            RawPortNumber::Int(n) => port_in_range(*n),
            RawPortNumber::Float(f) if f.fract() == 0.0 => port_in_range(*f as i64),
            RawPortNumber::Float(f) => Err(PortDecodeError::NotNumeric(f.to_string())),
            RawPortNumber::Text(s) => parse_port_number(s),
        }
    }
}

/// Object shapes: twin camelCase, agent snake_case, docker `PublicPort`/`PrivatePort`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPortObject {
    #[serde(default, rename = "hostPort", alias = "host_port", alias = "PublicPort")]
    host_port: Option<RawPortNumber>,
    #[serde(
        default,
        rename = "containerPort",
        alias = "container_port",
        alias = "PrivatePort"
    )]
    container_port: Option<RawPortNumber>,
    #[serde(default, alias = "Type")]
    protocol: Option<String>,
    #[serde(default, rename = "hostIp", alias = "host_ip", alias = "IP")]
    host_ip: Option<String>,
}

/// Every port representation the twin accepts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPort {
    Int(i64),
    Float(f64),
    Text(String),
    Object(RawPortObject),
}

impl RawPort {
    pub fn normalize(&self) -> Result<PortMapping, PortDecodeError> {
        match self {
            RawPort::Int(n) => RawPortNumber::Int(*n).to_port().map(PortMapping::host),
            RawPort::Float(f) => RawPortNumber::Float(*f).to_port().map(PortMapping::host),
            RawPort::Text(s) => {
                let trimmed = s.trim();
                // `8080` and `8080/udp` both publish the same port on host and container
                let (number, protocol) = match trimmed.rsplit_once('/') {
                    Some((number, protocol)) => (number, Some(protocol)),
                    None => (trimmed, None),
                };
                if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
                    let port = parse_port_number(number)?;
                    Ok(PortMapping {
                        protocol: normalize_protocol(protocol),
                        ..PortMapping::host(port)
                    })
                } else {
                    parse_publish_spec(trimmed, false)
                }
            }
            RawPort::Object(o) => {
                let host_port = o.host_port.as_ref().map(RawPortNumber::to_port).transpose()?;
                let container_port = o
                    .container_port
                    .as_ref()
                    .map(RawPortNumber::to_port)
                    .transpose()?;
                if host_port.is_none() && container_port.is_none() {
                    return Err(PortDecodeError::Empty);
                }
                Ok(PortMapping {
                    host_port,
                    container_port,
                    protocol: normalize_protocol(o.protocol.as_deref()),
                    host_ip: o.host_ip.clone().filter(|ip| !ip.trim().is_empty()),
                })
            }
        }
    }
}

/// Decode one loose JSON value into a canonical mapping.
pub fn normalize_port(value: &serde_json::Value) -> Result<PortMapping, PortDecodeError> {
    // serde would happily read a JSON array positionally into the object shape
    if !(value.is_number() || value.is_string() || value.is_object()) {
        return Err(PortDecodeError::Shape(value.to_string()));
    }
    let raw: RawPort = serde_json::from_value(value.clone())
        .map_err(|_| PortDecodeError::Shape(value.to_string()))?;
    raw.normalize()
}

/// Normalize a port list, dropping (and logging) entries that fail to decode.
pub fn normalize_ports(values: &[serde_json::Value], owner: &str) -> Vec<PortMapping> {
    let mut out: Vec<PortMapping> = Vec::with_capacity(values.len());
    for value in values {
        match normalize_port(value) {
            Ok(port) => crate::models::merge_ports(&mut out, [&port]),
            Err(e) => tracing::warn!(owner, error = %e, "dropping malformed port entry"),
        }
    }
    out
}

pub fn normalize_protocol(protocol: Option<&str>) -> String {
    match protocol.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_ascii_lowercase(),
        _ => DEFAULT_PROTOCOL.to_string(),
    }
}

fn port_in_range(n: i64) -> Result<u16, PortDecodeError> {
    if (1..=65535).contains(&n) {
        Ok(n as u16)
    } else {
        Err(PortDecodeError::OutOfRange(n))
    }
}

fn parse_port_number(s: &str) -> Result<u16, PortDecodeError> {
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|_| PortDecodeError::NotNumeric(s.to_string()))?;
    port_in_range(n)
}

/// Parse `[ip:][host:]container[/proto]` (podman `PublishPort=` syntax).
///
/// A single segment is a container port only; with `host_network` the host port
/// defaults to it. IPv6 host addresses in brackets are accepted.
pub fn parse_publish_spec(value: &str, host_network: bool) -> Result<PortMapping, PortDecodeError> {
    let (spec, protocol) = match value.rsplit_once('/') {
        Some((spec, proto)) => (spec, Some(proto)),
        None => (value, None),
    };

    let (host_ip, rest) = match spec.strip_prefix('[') {
        Some(bracketed) => match bracketed.split_once("]:") {
            Some((ip, rest)) => (Some(ip.to_string()), rest),
            None => return Err(PortDecodeError::Shape(value.to_string())),
        },
        None => (None, spec),
    };

    let segments: Vec<&str> = rest.split(':').collect();
    let (host_ip, host_port, container_port) = match segments.as_slice() {
        [container] => (host_ip, None, parse_port_number(container)?),
        [host, container] if host_ip.is_some() => {
            (host_ip, optional_port(host)?, parse_port_number(container)?)
        }
        [host, container] => (None, optional_port(host)?, parse_port_number(container)?),
        [ip, host, container] => (
            Some(ip.to_string()).filter(|ip| !ip.is_empty()),
            optional_port(host)?,
            parse_port_number(container)?,
        ),
        _ => return Err(PortDecodeError::Shape(value.to_string())),
    };

    let host_port = match host_port {
        None if host_network => Some(container_port),
        other => other,
    };

    Ok(PortMapping {
        host_port,
        container_port: Some(container_port),
        protocol: normalize_protocol(protocol),
        host_ip,
    })
}

/// `ip::80` leaves the host port to podman.
fn optional_port(s: &str) -> Result<Option<u16>, PortDecodeError> {
    if s.trim().is_empty() {
        Ok(None)
    } else {
        parse_port_number(s).map(Some)
    }
}

pub fn is_unspecified_host_ip(ip: Option<&str>) -> bool {
    match ip.map(str::trim) {
        None => true,
        Some(ip) => matches!(ip, "" | "0.0.0.0" | "::" | "::0" | "*"),
    }
}

/// Rewrite wildcard bind addresses to the node's first known IP.
pub fn resolve_host_ips(ports: &mut [PortMapping], node_ip: Option<&str>) {
    let Some(node_ip) = node_ip else {
        return;
    };
    for port in ports.iter_mut() {
        if is_unspecified_host_ip(port.host_ip.as_deref()) {
            port.host_ip = Some(node_ip.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_accepts_bare_number_and_numeric_string() {
        let a = normalize_port(&json!(8080)).unwrap();
        let b = normalize_port(&json!("8080")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.host_port, Some(8080));
        assert_eq!(a.container_port, Some(8080));
        assert_eq!(a.protocol, "tcp");
    }

    #[test]
    fn normalize_treats_bare_and_nested_numbers_alike() {
        let bare = normalize_port(&json!(80.0)).unwrap();
        let nested = normalize_port(&json!({"hostPort": 80.0, "containerPort": 80})).unwrap();
        assert_eq!(bare, nested);
        assert!(matches!(
            normalize_port(&json!(80.5)),
            Err(PortDecodeError::NotNumeric(_))
        ));
    }

    #[test]
    fn normalize_numeric_string_with_protocol_keeps_host_port() {
        let p = normalize_port(&json!("8080/UDP")).unwrap();
        assert_eq!(p.host_port, Some(8080));
        assert_eq!(p.container_port, Some(8080));
        assert_eq!(p.protocol, "udp");

        let published = normalize_port(&json!("9000:80/tcp")).unwrap();
        assert_eq!((published.host_port, published.container_port), (Some(9000), Some(80)));
    }

    #[test]
    fn normalize_accepts_agent_snake_case_object() {
        let p = normalize_port(&json!({"host_port": 53, "container_port": "53", "protocol": "UDP"}))
            .unwrap();
        assert_eq!(p.host_port, Some(53));
        assert_eq!(p.container_port, Some(53));
        assert_eq!(p.protocol, "udp");
    }

    #[test]
    fn normalize_accepts_docker_public_private_shape() {
        let p = normalize_port(&json!({"PublicPort": 8443, "PrivatePort": 443, "Type": "tcp", "IP": "0.0.0.0"}))
            .unwrap();
        assert_eq!(p.host_port, Some(8443));
        assert_eq!(p.container_port, Some(443));
        assert_eq!(p.host_ip.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn normalize_keeps_container_only_ports() {
        let p = normalize_port(&json!({"hostPort": null, "containerPort": 9000})).unwrap();
        assert_eq!(p.host_port, None);
        assert_eq!(p.container_port, Some(9000));
    }

    #[test]
    fn normalize_rejects_empty_and_out_of_range() {
        assert_eq!(
            normalize_port(&json!({"protocol": "tcp"})),
            Err(PortDecodeError::Empty)
        );
        assert_eq!(
            normalize_port(&json!(70000)),
            Err(PortDecodeError::OutOfRange(70000))
        );
        assert!(matches!(
            normalize_port(&json!([1, 2])),
            Err(PortDecodeError::Shape(_))
        ));
    }

    #[test]
    fn normalize_ports_drops_bad_entries_and_dedupes() {
        let ports = normalize_ports(&[json!(80), json!("80"), json!(true), json!("8081")], "test");
        let hosts: Vec<_> = ports.iter().map(|p| p.host_port).collect();
        assert_eq!(hosts, vec![Some(80), Some(8081)]);
    }

    #[test]
    fn publish_spec_segment_variants() {
        let one = parse_publish_spec("80", false).unwrap();
        assert_eq!((one.host_port, one.container_port), (None, Some(80)));

        let one_host = parse_publish_spec("80", true).unwrap();
        assert_eq!(one_host.host_port, Some(80));

        let two = parse_publish_spec("8080:80/UDP", false).unwrap();
        assert_eq!((two.host_port, two.container_port), (Some(8080), Some(80)));
        assert_eq!(two.protocol, "udp");

        let three = parse_publish_spec("127.0.0.1:8080:80", false).unwrap();
        assert_eq!(three.host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(three.host_port, Some(8080));

        let v6 = parse_publish_spec("[::1]:8080:80/tcp", false).unwrap();
        assert_eq!(v6.host_ip.as_deref(), Some("::1"));
        assert_eq!(v6.host_port, Some(8080));

        assert!(parse_publish_spec("a:b:c:d", false).is_err());
    }

    #[test]
    fn resolve_host_ips_only_rewrites_wildcards() {
        let mut ports = vec![
            PortMapping {
                host_ip: Some("::".into()),
                ..PortMapping::host(80)
            },
            PortMapping {
                host_ip: Some("192.168.1.9".into()),
                ..PortMapping::host(81)
            },
            PortMapping::host(82),
        ];
        resolve_host_ips(&mut ports, Some("10.0.0.5"));
        assert_eq!(ports[0].host_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(ports[1].host_ip.as_deref(), Some("192.168.1.9"));
        assert_eq!(ports[2].host_ip.as_deref(), Some("10.0.0.5"));

        let mut untouched = vec![PortMapping::host(80)];
        resolve_host_ips(&mut untouched, None);
        assert_eq!(untouched[0].host_ip, None);
    }
}
