//! Snapshot assembly
//!
//! Turns one round of inventory records, plus an optional usage overlay, into
//! an immutable [`Snapshot`] of typed entities. Every cross reference (a pod's
//! hosting node, a container's pod) is resolved against records gathered in
//! the same call, never against a separately fetched inventory.

use crate::entity::{
    ClusterEntity, ClusterMetricsEntity, ContainerEntity, Entity, NodeEntity, PodEntity,
    ResourceUsageEntity, ServiceEntity, VmEntity,
};
use crate::identity::{
    ClusterId, ClusterMetricsId, ContainerId, Identity, NodeId, PodId, ResourceUsageId, ServiceId,
    VmId,
};
use crate::models::{HostInfo, Inventory, PodUsage, UsageReport};
use crate::units::{parse_cpu, parse_cpu_opt, parse_memory, parse_memory_opt};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

/// Format a timestamp the way every stored time property is written
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One internally consistent capture of a cluster
///
/// Only [`SnapshotAssembler`] builds snapshots; consumers get read access.
#[derive(Debug, Clone)]
pub struct Snapshot {
    captured_at: DateTime<Utc>,
    vm: VmEntity,
    cluster: ClusterEntity,
    nodes: Vec<NodeEntity>,
    pods: Vec<PodEntity>,
    services: Vec<ServiceEntity>,
    containers: Vec<ContainerEntity>,
    metrics: ClusterMetricsEntity,
    resource_usage: Option<ResourceUsageEntity>,
}

impl Snapshot {
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn vm(&self) -> &VmEntity {
        &self.vm
    }

    pub fn cluster(&self) -> &ClusterEntity {
        &self.cluster
    }

    pub fn nodes(&self) -> &[NodeEntity] {
        &self.nodes
    }

    pub fn pods(&self) -> &[PodEntity] {
        &self.pods
    }

    pub fn services(&self) -> &[ServiceEntity] {
        &self.services
    }

    pub fn containers(&self) -> &[ContainerEntity] {
        &self.containers
    }

    pub fn metrics(&self) -> &ClusterMetricsEntity {
        &self.metrics
    }

    pub fn resource_usage(&self) -> Option<&ResourceUsageEntity> {
        self.resource_usage.as_ref()
    }

    /// All entities, parents before children
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities = Vec::with_capacity(self.entity_count());
        entities.push(Entity::Vm(self.vm.clone()));
        entities.push(Entity::Cluster(self.cluster.clone()));
        entities.extend(self.nodes.iter().cloned().map(Entity::Node));
        entities.extend(self.pods.iter().cloned().map(Entity::Pod));
        entities.extend(self.services.iter().cloned().map(Entity::Service));
        entities.extend(self.containers.iter().cloned().map(Entity::Container));
        entities.push(Entity::ClusterMetrics(self.metrics.clone()));
        if let Some(usage) = &self.resource_usage {
            entities.push(Entity::ResourceUsage(usage.clone()));
        }
        entities
    }

    pub fn entity_count(&self) -> usize {
        3 + self.nodes.len()
            + self.pods.len()
            + self.services.len()
            + self.containers.len()
            + usize::from(self.resource_usage.is_some())
    }
}

/// Builds snapshots for one monitor process
///
/// The VM identity is fixed at construction, so every snapshot this assembler
/// produces hangs off the same VM entity.
#[derive(Debug, Clone)]
pub struct SnapshotAssembler {
    host: HostInfo,
    vm_id: VmId,
}

impl SnapshotAssembler {
    pub fn new(host: HostInfo, started_at: DateTime<Utc>) -> Self {
        let vm_id = VmId::new(host.hostname.clone(), started_at);
        Self { host, vm_id }
    }

    pub fn vm_id(&self) -> &VmId {
        &self.vm_id
    }

    /// Assemble a snapshot captured now
    pub fn assemble(&self, inventory: &Inventory, usage: Option<&UsageReport>) -> Snapshot {
        self.assemble_at(inventory, usage, Utc::now())
    }

    pub fn assemble_at(
        &self,
        inventory: &Inventory,
        usage: Option<&UsageReport>,
        captured_at: DateTime<Utc>,
    ) -> Snapshot {
        let captured = iso_timestamp(captured_at);
        let overlay = UsageOverlay::new(usage);
        let cluster_id = ClusterId::new(inventory.context.clone(), self.vm_id.clone());
        let cluster_key = cluster_id.key();

        let vm = VmEntity {
            id: self.vm_id.key(),
            hostname: self.host.hostname.clone(),
            ip_addresses: self.host.ip_addresses.clone(),
            platform: self.host.platform.clone(),
            captured_at: captured.clone(),
        };

        let cluster = ClusterEntity {
            id: cluster_key.clone(),
            context: inventory.context.clone(),
            vm_id: vm.id.clone(),
            server_version: inventory.cluster_info.server_version.clone(),
            cluster_info: inventory.cluster_info.raw.clone(),
            available_contexts: inventory.available_contexts.clone(),
        };

        let mut node_ids: HashMap<&str, String> = HashMap::new();
        let nodes: Vec<NodeEntity> = inventory
            .nodes
            .iter()
            .map(|record| {
                let id = NodeId::new(record.name.clone(), cluster_id.clone()).key();
                node_ids.insert(record.name.as_str(), id.clone());
                let (cpu_usage, memory_usage) = overlay.node(&record.name);
                NodeEntity {
                    id,
                    name: record.name.clone(),
                    status: record.status.clone(),
                    roles: record.roles.clone(),
                    cpu_capacity: parse_cpu_opt(record.capacity.cpu.as_deref()),
                    memory_capacity: parse_memory_opt(record.capacity.memory.as_deref()),
                    cpu_allocatable: parse_cpu_opt(record.allocatable.cpu.as_deref()),
                    memory_allocatable: parse_memory_opt(record.allocatable.memory.as_deref()),
                    cpu_usage,
                    memory_usage,
                    cluster_id: cluster_key.clone(),
                }
            })
            .collect();

        let mut pods = Vec::with_capacity(inventory.pods.len());
        let mut containers = Vec::new();
        for record in &inventory.pods {
            let pod_id = PodId::new(
                record.name.clone(),
                record.namespace.clone(),
                cluster_id.clone(),
            );
            let pod_key = pod_id.key();
            let pod_usage = overlay.pod(&record.namespace, &record.name);

            let mut pod = PodEntity {
                id: pod_key.clone(),
                name: record.name.clone(),
                namespace: record.namespace.clone(),
                status: record.status.clone(),
                node: record.node_name.clone(),
                node_id: node_ids.get(record.node_name.as_str()).cloned(),
                cluster_id: cluster_key.clone(),
                ..Default::default()
            };

            for container in &record.containers {
                let (cpu_usage, memory_usage) = pod_usage
                    .map(|usage| usage.container(&container.name))
                    .unwrap_or((0.0, 0.0));

                let entity = ContainerEntity {
                    id: ContainerId::new(container.name.clone(), pod_id.clone()).key(),
                    name: container.name.clone(),
                    image: container.image.clone(),
                    status: container.status.clone(),
                    cpu_usage,
                    memory_usage,
                    cpu_request: parse_cpu_opt(container.requests.cpu.as_deref()),
                    memory_request: parse_memory_opt(container.requests.memory.as_deref()),
                    cpu_limit: parse_cpu_opt(container.limits.cpu.as_deref()),
                    memory_limit: parse_memory_opt(container.limits.memory.as_deref()),
                    pod_id: pod_key.clone(),
                };

                pod.cpu_requests += entity.cpu_request;
                pod.memory_requests += entity.memory_request;
                pod.cpu_limits += entity.cpu_limit;
                pod.memory_limits += entity.memory_limit;
                containers.push(entity);
            }

            if let Some(usage) = pod_usage {
                pod.cpu_usage = usage.cpu_total;
                pod.memory_usage = usage.memory_total;
            }
            pods.push(pod);
        }

        let services: Vec<ServiceEntity> = inventory
            .services
            .iter()
            .map(|record| ServiceEntity {
                id: ServiceId::new(
                    record.name.clone(),
                    record.namespace.clone(),
                    cluster_id.clone(),
                )
                .key(),
                name: record.name.clone(),
                namespace: record.namespace.clone(),
                service_type: record.service_type.clone(),
                cluster_ip: record.cluster_ip.clone(),
                external_ip: record.external_ip.clone(),
                ports: record.ports.clone(),
                selector: record.selector.clone(),
                cluster_id: cluster_key.clone(),
            })
            .collect();

        let metrics = aggregate_metrics(
            ClusterMetricsId::new(cluster_id.clone()).key(),
            &cluster_key,
            &nodes,
            &pods,
            services.len(),
        );

        let resource_usage = usage.map(|report| ResourceUsageEntity {
            id: ResourceUsageId::new(cluster_id.clone()).key(),
            cluster_id: cluster_key.clone(),
            node_metrics: report.raw_node_metrics.clone(),
            pod_metrics: report.raw_pod_metrics.clone(),
            captured_at: captured.clone(),
        });

        Snapshot {
            captured_at,
            vm,
            cluster,
            nodes,
            pods,
            services,
            containers,
            metrics,
            resource_usage,
        }
    }
}

fn aggregate_metrics(
    id: String,
    cluster_id: &str,
    nodes: &[NodeEntity],
    pods: &[PodEntity],
    service_count: usize,
) -> ClusterMetricsEntity {
    let pods_in = |phase: &str| pods.iter().filter(|p| p.status == phase).count() as i64;

    ClusterMetricsEntity {
        id,
        cluster_id: cluster_id.to_string(),
        total_pods: pods.len() as i64,
        running_pods: pods_in("Running"),
        pending_pods: pods_in("Pending"),
        failed_pods: pods_in("Failed"),
        total_services: service_count as i64,
        total_nodes: nodes.len() as i64,
        ready_nodes: nodes.iter().filter(|n| n.status == "Ready").count() as i64,
        total_cpu_usage: nodes.iter().map(|n| n.cpu_usage).sum(),
        total_memory_usage: nodes.iter().map(|n| n.memory_usage).sum(),
    }
}

/// Usage overlay indexed for lookup; missing entries read as zero
struct UsageOverlay {
    nodes: HashMap<String, (f64, f64)>,
    pods: HashMap<(String, String), PodOverlay>,
}

struct PodOverlay {
    cpu_total: f64,
    memory_total: f64,
    containers: HashMap<String, (f64, f64)>,
}

impl PodOverlay {
    fn from_usage(usage: &PodUsage) -> Self {
        let containers: HashMap<String, (f64, f64)> = usage
            .containers
            .iter()
            .map(|c| (c.name.clone(), (parse_cpu(&c.cpu), parse_memory(&c.memory))))
            .collect();

        Self {
            cpu_total: containers.values().map(|(cpu, _)| cpu).sum(),
            memory_total: containers.values().map(|(_, mem)| mem).sum(),
            containers,
        }
    }

    fn container(&self, name: &str) -> (f64, f64) {
        self.containers.get(name).copied().unwrap_or((0.0, 0.0))
    }
}

impl UsageOverlay {
    fn new(report: Option<&UsageReport>) -> Self {
        let Some(report) = report else {
            return Self {
                nodes: HashMap::new(),
                pods: HashMap::new(),
            };
        };

        Self {
            nodes: report
                .nodes
                .iter()
                .map(|n| (n.name.clone(), (parse_cpu(&n.cpu), parse_memory(&n.memory))))
                .collect(),
            pods: report
                .pods
                .iter()
                .map(|p| {
                    (
                        (p.namespace.clone(), p.name.clone()),
                        PodOverlay::from_usage(p),
                    )
                })
                .collect(),
        }
    }

    fn node(&self, name: &str) -> (f64, f64) {
        self.nodes.get(name).copied().unwrap_or((0.0, 0.0))
    }

    fn pod(&self, namespace: &str, name: &str) -> Option<&PodOverlay> {
        self.pods.get(&(namespace.to_string(), name.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    pub fn host() -> HostInfo {
        HostInfo {
            hostname: "host-a".into(),
            ip_addresses: vec!["10.0.0.5".into()],
            platform: "linux-x86_64".into(),
        }
    }

    pub fn container(name: &str, cpu_req: &str, mem_limit: &str) -> ContainerRecord {
        ContainerRecord {
            name: name.into(),
            image: format!("{}:latest", name),
            status: "Running".into(),
            requests: Quantities {
                cpu: Some(cpu_req.into()),
                memory: None,
            },
            limits: Quantities {
                cpu: None,
                memory: Some(mem_limit.into()),
            },
        }
    }

    pub fn inventory() -> Inventory {
        Inventory {
            context: "kind-dev".into(),
            available_contexts: vec!["kind-dev".into(), "prod".into()],
            cluster_info: ClusterInfoRecord {
                server_version: Some("v1.28.0".into()),
                platform: Some("linux/amd64".into()),
                raw: json!({"gitVersion": "v1.28.0"}),
            },
            nodes: vec![
                NodeRecord {
                    name: "worker-1".into(),
                    status: "Ready".into(),
                    roles: vec!["worker".into()],
                    capacity: Quantities::new("4", "8Gi"),
                    allocatable: Quantities::new("3800m", "7Gi"),
                },
                NodeRecord {
                    name: "worker-2".into(),
                    status: "NotReady".into(),
                    roles: vec![],
                    capacity: Quantities::new("2", "4Gi"),
                    allocatable: Quantities::new("2", "4Gi"),
                },
            ],
            pods: vec![
                PodRecord {
                    name: "web-0".into(),
                    namespace: "default".into(),
                    status: "Running".into(),
                    node_name: "worker-1".into(),
                    containers: vec![
                        container("nginx", "250m", "256Mi"),
                        container("sidecar", "50m", "64Mi"),
                    ],
                },
                PodRecord {
                    name: "batch-0".into(),
                    namespace: "jobs".into(),
                    status: "Pending".into(),
                    node_name: String::new(),
                    containers: vec![container("job", "1", "1Gi")],
                },
            ],
            services: vec![ServiceRecord {
                name: "web".into(),
                namespace: "default".into(),
                service_type: "ClusterIP".into(),
                cluster_ip: "10.96.0.10".into(),
                external_ip: None,
                ports: vec![ServicePort {
                    name: "http".into(),
                    port: 80,
                    target_port: "8080".into(),
                    protocol: "TCP".into(),
                }],
                selector: BTreeMap::from([("app".to_string(), "web".to_string())]),
            }],
        }
    }

    pub fn usage() -> UsageReport {
        UsageReport {
            nodes: vec![NodeUsage {
                name: "worker-1".into(),
                cpu: "1200m".into(),
                memory: "2Gi".into(),
            }],
            pods: vec![PodUsage {
                name: "web-0".into(),
                namespace: "default".into(),
                containers: vec![
                    ContainerUsage {
                        name: "nginx".into(),
                        cpu: "100m".into(),
                        memory: "64Mi".into(),
                    },
                    ContainerUsage {
                        name: "sidecar".into(),
                        cpu: "5000000n".into(),
                        memory: "16Mi".into(),
                    },
                ],
            }],
            raw_node_metrics: json!({"items": [{"metadata": {"name": "worker-1"}}]}),
            raw_pod_metrics: json!({"items": []}),
        }
    }
}
