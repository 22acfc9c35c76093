// Quadlet / systemd unit file parser.
// Unit files are line-oriented KEY=VALUE text where keys repeat (PublishPort=, Requires=).

pub mod kube;

use std::collections::BTreeMap;

use crate::models::WatchedFile;

/// Extensions of files that generate a `<stem>.service` unit.
pub const UNIT_EXTENSIONS: &[&str] = &["kube", "container", "pod", "service"];

const UNIT_SUFFIXES: &[&str] = &[
    "service", "target", "socket", "mount", "timer", "path", "slice", "scope", "device", "swap",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceType {
    Container,
    Pod,
    Kube,
    Service,
    #[default]
    Unknown,
}

impl SourceType {
    /// Section markers decide the type; `[Container]` wins over the others.
    pub fn detect(content: &str) -> Self {
        let lower = content.to_ascii_lowercase();
        if lower.contains("[container]") {
            SourceType::Container
        } else if lower.contains("[pod]") {
            SourceType::Pod
        } else if lower.contains("[kube]") {
            SourceType::Kube
        } else if lower.contains("[unit]") && lower.contains("[service]") {
            SourceType::Service
        } else {
            SourceType::Unknown
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitDirectives {
    pub source_type: SourceType,
    pub description: Option<String>,
    pub requires: Vec<String>,
    pub after: Vec<String>,
    pub wants: Vec<String>,
    pub binds_to: Vec<String>,
    /// `ContainerName=`; podman names the container this instead of `systemd-<unit>`.
    pub container_name: Option<String>,
    /// Pod reference with any `.pod` suffix removed.
    pub pod: Option<String>,
    pub networks: Vec<String>,
    /// Raw `PublishPort=` values from `[Container]` and `[Pod]`.
    pub publish_ports: Vec<String>,
    pub kube_yaml: Option<String>,
}

impl UnitDirectives {
    pub fn uses_host_network(&self) -> bool {
        self.networks.iter().any(|n| n == "host")
    }
}

/// Split a `Requires=`-style value; bare names get a `.service` suffix.
pub fn parse_unit_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|item| {
            let has_suffix = item
                .rsplit_once('.')
                .is_some_and(|(_, ext)| UNIT_SUFFIXES.contains(&ext));
            if has_suffix {
                item.to_string()
            } else {
                format!("{}.service", item)
            }
        })
        .collect()
}

pub fn parse(content: &str) -> UnitDirectives {
    let mut d = UnitDirectives {
        source_type: SourceType::detect(content),
        ..UnitDirectives::default()
    };
    let mut section = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.to_ascii_lowercase();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim().to_ascii_lowercase(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }

        match (section.as_str(), key.as_str()) {
            ("unit", "requires") => d.requires.extend(parse_unit_list(value)),
            ("unit", "after") => d.after.extend(parse_unit_list(value)),
            ("unit", "wants") => d.wants.extend(parse_unit_list(value)),
            ("unit", "bindsto") => d.binds_to.extend(parse_unit_list(value)),
            ("unit", "description") => d.description = Some(value.to_string()),

            ("container" | "x-container", "containername") => {
                d.container_name = Some(value.to_string())
            }
            ("container" | "x-container", "pod") => {
                d.pod = Some(value.strip_suffix(".pod").unwrap_or(value).to_string())
            }
            ("container" | "x-container" | "pod" | "kube", "network") => {
                d.networks.push(value.to_string())
            }
            ("container" | "x-container" | "pod" | "kube", "publishport") => {
                d.publish_ports.push(value.to_string())
            }

            ("kube", "yaml") => d.kube_yaml = Some(value.to_string()),
            _ => {}
        }
    }
    d
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn dir_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Source unit file for `service_name`, preferring `.kube`, then `.container`, `.pod`, `.service`.
pub fn unit_file_for<'a>(
    files: &'a BTreeMap<String, WatchedFile>,
    service_name: &str,
) -> Option<&'a WatchedFile> {
    UNIT_EXTENSIONS.iter().find_map(|ext| {
        let wanted = format!("{}.{}", service_name, ext);
        files.values().find(|f| file_name(&f.path) == wanted)
    })
}

/// Collapse `.` and `..` segments of a slash-separated path.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Resolve a `Yaml=` reference: relative to the unit's directory, else by path suffix.
pub fn resolve_kube_yaml<'a>(
    files: &'a BTreeMap<String, WatchedFile>,
    unit_path: &str,
    yaml_ref: &str,
) -> Option<&'a WatchedFile> {
    let direct = if yaml_ref.starts_with('/') {
        normalize_path(yaml_ref)
    } else {
        normalize_path(&format!("{}/{}", dir_name(unit_path), yaml_ref))
    };
    if let Some(f) = files.values().find(|f| f.path == direct) {
        return Some(f);
    }

    let suffix = normalize_path(yaml_ref);
    let suffix = suffix.trim_start_matches('/');
    files
        .values()
        .find(|f| f.path == suffix || f.path.ends_with(&format!("/{}", suffix)))
}
