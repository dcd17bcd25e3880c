//! Display decoration for visualization payloads
//!
//! Label, tooltip and color are pure functions of an entity's kind and
//! properties. Optional properties that are absent or empty drop their tooltip
//! line instead of failing.

use super::{Entity, EntityKind, Properties};
use serde::Serialize;

const DEFAULT_NODE_COLOR: &str = "#BDC3C7";
const DEFAULT_EDGE_COLOR: &str = "#95A5A6";
const TOOLTIP_RULE_WIDTH: usize = 30;

/// Display attributes of one visualized entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoration {
    pub label: String,
    pub title: String,
    pub color: &'static str,
}

/// Node color by graph label; unrecognized labels get the default
pub fn node_color(label: &str) -> &'static str {
    match EntityKind::from_label(label) {
        Some(EntityKind::Vm) => "#FF6B6B",
        Some(EntityKind::Cluster) => "#4ECDC4",
        Some(EntityKind::Node) => "#45B7D1",
        Some(EntityKind::Pod) => "#96CEB4",
        Some(EntityKind::Service) => "#FECA57",
        Some(EntityKind::Container) => "#FF9FF3",
        Some(EntityKind::ClusterMetrics) => "#A8E6CF",
        Some(EntityKind::ResourceUsage) => "#D6A2E8",
        None => DEFAULT_NODE_COLOR,
    }
}

/// Edge color by relationship type
pub fn edge_color(rel_type: &str) -> &'static str {
    match rel_type {
        "HOSTS" => "#FF6B6B",
        "CONTAINS" => "#4ECDC4",
        "HAS_RESOURCE_USAGE" => "#A29BFE",
        _ => DEFAULT_EDGE_COLOR,
    }
}

/// Decorate a typed entity
pub fn decorate(entity: &Entity) -> Decoration {
    let kind = entity.kind();
    let mut tooltip = Tooltip::new(kind.label());

    let label = match entity {
        Entity::Vm(vm) => {
            tooltip.line("Host", &vm.hostname);
            if !vm.ip_addresses.is_empty() {
                tooltip.line("IPs", &vm.ip_addresses.join(", "));
            }
            tooltip.line("Platform", &vm.platform);
            tooltip.line("Captured", &vm.captured_at);
            non_empty_or(&vm.hostname, &vm.id)
        }
        Entity::Cluster(cluster) => {
            tooltip.line("Context", &cluster.context);
            if let Some(version) = &cluster.server_version {
                tooltip.line("Version", version);
            }
            if !cluster.available_contexts.is_empty() {
                tooltip.line("Contexts", &cluster.available_contexts.join(", "));
            }
            non_empty_or(&cluster.context, &cluster.id)
        }
        Entity::Node(node) => {
            tooltip.line("Name", &node.name);
            tooltip.status(&node.status, "Ready");
            if !node.roles.is_empty() {
                tooltip.line("Roles", &node.roles.join(", "));
            }
            tooltip.line(
                "CPU",
                &format!("{:.2} / {:.2} cores", node.cpu_usage, node.cpu_allocatable),
            );
            tooltip.line(
                "Memory",
                &format!(
                    "{:.0} / {:.0} MiB",
                    node.memory_usage, node.memory_allocatable
                ),
            );
            non_empty_or(&node.name, &node.id)
        }
        Entity::Pod(pod) => {
            tooltip.line("Name", &pod.name);
            tooltip.status(&pod.status, "Running");
            tooltip.line("Namespace", &pod.namespace);
            tooltip.line("Node", &pod.node);
            non_empty_or(&pod.name, &pod.id)
        }
        Entity::Service(service) => {
            tooltip.line("Name", &service.name);
            tooltip.line("Namespace", &service.namespace);
            tooltip.line("Type", &service.service_type);
            tooltip.line("Cluster IP", &service.cluster_ip);
            if let Some(external) = &service.external_ip {
                tooltip.line("External IP", external);
            }
            if !service.ports.is_empty() {
                let ports: Vec<String> = service
                    .ports
                    .iter()
                    .map(|p| format!("{}/{}", p.port, p.protocol))
                    .collect();
                tooltip.line("Ports", &ports.join(", "));
            }
            non_empty_or(&service.name, &service.id)
        }
        Entity::Container(container) => {
            tooltip.line("Name", &container.name);
            tooltip.status(&container.status, "Running");
            tooltip.line("Image", &container.image);
            tooltip.line("CPU", &format!("{:.3} cores", container.cpu_usage));
            tooltip.line("Memory", &format!("{:.1} MiB", container.memory_usage));
            non_empty_or(&container.name, &container.id)
        }
        Entity::ClusterMetrics(metrics) => {
            tooltip.line(
                "Nodes",
                &format!("{} ({} ready)", metrics.total_nodes, metrics.ready_nodes),
            );
            tooltip.line(
                "Pods",
                &format!(
                    "{} ({} running, {} pending, {} failed)",
                    metrics.total_pods,
                    metrics.running_pods,
                    metrics.pending_pods,
                    metrics.failed_pods
                ),
            );
            tooltip.line("Services", &metrics.total_services.to_string());
            "metrics".to_string()
        }
        Entity::ResourceUsage(usage) => {
            tooltip.line("Captured", &usage.captured_at);
            "usage".to_string()
        }
    };

    Decoration {
        label,
        title: tooltip.finish(),
        color: node_color(kind.label()),
    }
}

/// Decorate a node whose label is not a known entity kind, or whose properties
/// could not be read as one
pub fn decorate_unrecognized(label: &str, id: &str, properties: &Properties) -> Decoration {
    let mut tooltip = Tooltip::new(label);
    for key in ["name", "status", "namespace"] {
        if let Some(value) = properties.get(key).and_then(|v| v.as_str()) {
            tooltip.line(key, value);
        }
    }

    let name = properties
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    Decoration {
        label: non_empty_or(name, id),
        title: tooltip.finish(),
        color: node_color(label),
    }
}

fn non_empty_or(preferred: &str, fallback: &str) -> String {
    if preferred.is_empty() {
        fallback.to_string()
    } else {
        preferred.to_string()
    }
}

struct Tooltip {
    lines: Vec<String>,
}

impl Tooltip {
    fn new(header: &str) -> Self {
        Self {
            lines: vec![header.to_string(), "─".repeat(TOOLTIP_RULE_WIDTH)],
        }
    }

    /// Add `key: value`, skipping empty values
    fn line(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.lines.push(format!("{}: {}", key, value));
        }
    }

    /// Add a status line marked healthy when it equals `healthy`
    fn status(&mut self, status: &str, healthy: &str) {
        if status.is_empty() {
            return;
        }
        let mark = if status == healthy { "[ok]" } else { "[!]" };
        self.lines.push(format!("{} Status: {}", mark, status));
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}
