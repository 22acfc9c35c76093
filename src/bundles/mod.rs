// Bundle builder: groups a node's services into applications by shared pod and
// systemd dependency directives, then summarizes each group.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{
    AssetKind, BundleAsset, BundleContainer, BundleService, BundleSeverity, DependencyReason,
    GraphEdge, NodeTwin, PortMapping, ServiceBundle, ServiceUnit, WatchedFile, merge_ports,
};
use crate::quadlet::{self, UnitDirectives};

const NAME_SEPARATORS: &[char] = &['-', '_', '.'];

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // lower index stays root so groups keep listing order
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}

/// What the builder knows about one service: unit file, pod and dependency directives.
struct Member<'a> {
    service: &'a ServiceUnit,
    unit_file: Option<&'a WatchedFile>,
    directives: Option<UnitDirectives>,
    pod: Option<String>,
    deps: Vec<(DependencyReason, String)>,
}

fn dependency_lists(d: &UnitDirectives, reason: DependencyReason) -> &[String] {
    match reason {
        DependencyReason::Requires => &d.requires,
        DependencyReason::After => &d.after,
        DependencyReason::Wants => &d.wants,
        DependencyReason::BindsTo => &d.binds_to,
    }
}

fn service_lists(s: &ServiceUnit, reason: DependencyReason) -> &[String] {
    match reason {
        DependencyReason::Requires => &s.requires,
        DependencyReason::After => &s.after,
        DependencyReason::Wants => &s.wants,
        DependencyReason::BindsTo => &s.binds_to,
    }
}

impl<'a> Member<'a> {
    fn new(service: &'a ServiceUnit, files: &'a BTreeMap<String, WatchedFile>) -> Self {
        let unit_file = quadlet::unit_file_for(files, &service.name);
        let directives = unit_file.map(|f| quadlet::parse(&f.content));

        let pod = directives
            .as_ref()
            .and_then(|d| d.pod.clone())
            .or_else(|| {
                service
                    .pod_reference
                    .as_deref()
                    .map(|p| p.strip_suffix(".pod").unwrap_or(p).to_string())
            })
            .filter(|p| !p.is_empty());

        let mut deps: Vec<(DependencyReason, String)> = Vec::new();
        for reason in DependencyReason::ALL {
            let from_file = directives
                .as_ref()
                .map(|d| dependency_lists(d, reason))
                .unwrap_or_default();
            for target in from_file.iter().chain(service_lists(service, reason)) {
                if !deps.iter().any(|(r, t)| *r == reason && t == target) {
                    deps.push((reason, target.clone()));
                }
            }
        }

        Self {
            service,
            unit_file,
            directives,
            pod,
            deps,
        }
    }
}

fn local_service_name(target: &str) -> Option<&str> {
    target.strip_suffix(".service")
}

/// Longest shared prefix of `names`, cut back to a whole word.
fn common_name_prefix(names: &[&str]) -> Option<String> {
    let first = *names.first()?;
    let mut len = first.len();
    for name in &names[1..] {
        len = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((i, a), _)| i + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(len);
    }
    let mut prefix = &first[..len];

    let ends_on_word = names.iter().all(|n| {
        n[prefix.len()..]
            .chars()
            .next()
            .is_none_or(|c| NAME_SEPARATORS.contains(&c))
    });
    if !ends_on_word {
        prefix = prefix
            .rfind(NAME_SEPARATORS)
            .map(|i| &prefix[..i])
            .unwrap_or("");
    }
    let prefix = prefix.trim_matches(NAME_SEPARATORS);
    (!prefix.is_empty()).then(|| prefix.to_string())
}

fn prettify(name: &str) -> String {
    name.split(NAME_SEPARATORS)
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "bundle".to_string()
    } else {
        slug.to_string()
    }
}

fn unique_id(base: String, used: &mut BTreeSet<String>) -> String {
    let mut id = base.clone();
    let mut n = 2;
    while used.contains(&id) {
        id = format!("{}-{}", base, n);
        n += 1;
    }
    used.insert(id.clone());
    id
}

fn severity(members: &[&Member<'_>], missing: &[String]) -> BundleSeverity {
    if members.iter().any(|m| m.service.active_state == "failed") {
        BundleSeverity::Critical
    } else if !missing.is_empty() || members.iter().any(|m| !m.service.is_active()) {
        BundleSeverity::Warning
    } else {
        BundleSeverity::Ok
    }
}

fn build_one(
    node_name: &str,
    node: &NodeTwin,
    members: &[&Member<'_>],
    used_ids: &mut BTreeSet<String>,
) -> ServiceBundle {
    let names: Vec<&str> = members.iter().map(|m| m.service.name.as_str()).collect();
    let derived_name = members
        .iter()
        .find_map(|m| m.pod.clone())
        .or_else(|| (names.len() > 1).then(|| common_name_prefix(&names)).flatten())
        .unwrap_or_else(|| names[0].to_string());

    let mut ports: Vec<PortMapping> = Vec::new();
    let mut containers: Vec<BundleContainer> = Vec::new();
    let mut assets: Vec<BundleAsset> = Vec::new();
    let mut graph: Vec<GraphEdge> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    for m in members {
        let s = m.service;
        merge_ports(&mut ports, s.ports.as_deref().unwrap_or(s.declared_ports.as_slice()));

        for id in &s.associated_container_ids {
            if containers.iter().any(|c| &c.id == id) {
                continue;
            }
            if let Some(c) = node.container(id) {
                containers.push(BundleContainer {
                    id: c.id.clone(),
                    name: c.display_name().to_string(),
                    image: c.image.clone(),
                    state: c.state.clone(),
                });
            }
        }

        if let Some(unit) = m.unit_file {
            let mut push_asset = |path: &str| {
                if !assets.iter().any(|a| a.path == path) {
                    assets.push(BundleAsset {
                        path: path.to_string(),
                        kind: AssetKind::from_path(path),
                    });
                }
            };
            push_asset(&unit.path);
            if let Some(yaml) = m
                .directives
                .as_ref()
                .and_then(|d| d.kube_yaml.as_deref())
                .and_then(|y| quadlet::resolve_kube_yaml(&node.files, &unit.path, y))
            {
                push_asset(&yaml.path);
            }
        }

        for (reason, target) in &m.deps {
            graph.push(GraphEdge {
                from: s.name.clone(),
                to: target.clone(),
                reason: *reason,
            });
            if reason.is_hard()
                && let Some(stem) = local_service_name(target)
                && node.service(stem).is_none()
                && !missing.contains(target)
            {
                missing.push(target.clone());
            }
        }
    }

    let mut hints: Vec<String> = DependencyReason::ALL
        .into_iter()
        .filter_map(|reason| {
            let mut targets: Vec<&str> = Vec::new();
            for edge in graph.iter().filter(|e| e.reason == reason) {
                if !targets.contains(&edge.to.as_str()) {
                    targets.push(&edge.to);
                }
            }
            (!targets.is_empty()).then(|| format!("{}: {}", reason.hint_label(), targets.join(", ")))
        })
        .collect();
    if !missing.is_empty() {
        hints.push(format!("Missing dependencies: {}", missing.join(", ")));
    }

    ServiceBundle {
        id: unique_id(slugify(&derived_name), used_ids),
        display_name: prettify(&derived_name),
        node_name: node_name.to_string(),
        services: members
            .iter()
            .map(|m| BundleService {
                name: m.service.name.clone(),
                active_state: m.service.active_state.clone(),
                unit_file: m.unit_file.map(|f| f.path.clone()),
            })
            .collect(),
        containers,
        ports,
        assets,
        graph,
        hints,
        severity: severity(members, &missing),
        derived_name,
    }
}

/// Group the node's services into bundles, listed in order of their first member.
pub fn build_bundles(node_name: &str, node: &NodeTwin) -> Vec<ServiceBundle> {
    let members: Vec<Member<'_>> = node
        .services
        .iter()
        .map(|s| Member::new(s, &node.files))
        .collect();
    let index: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, m)| (m.service.name.as_str(), i))
        .collect();

    let mut uf = UnionFind::new(members.len());
    let mut pods: HashMap<&str, usize> = HashMap::new();
    for (i, m) in members.iter().enumerate() {
        if let Some(pod) = m.pod.as_deref() {
            let first = *pods.entry(pod).or_insert(i);
            uf.union(first, i);
        }
        for (_, target) in &m.deps {
            if let Some(&j) = local_service_name(target).and_then(|stem| index.get(stem)) {
                uf.union(i, j);
            }
        }
    }

    let mut groups: Vec<(usize, Vec<&Member<'_>>)> = Vec::new();
    for (i, m) in members.iter().enumerate() {
        let root = uf.find(i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, group)) => group.push(m),
            None => groups.push((root, vec![m])),
        }
    }

    let mut used_ids = BTreeSet::new();
    groups
        .iter()
        .map(|(_, group)| build_one(node_name, node, group, &mut used_ids))
        .collect()
}
