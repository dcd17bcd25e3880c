//! Inventory source backed by the Kubernetes API

use super::InventorySource;
use crate::error::{GraphError, Result};
use crate::models::{
    ClusterInfoRecord, ContainerRecord, ContainerUsage, NodeRecord, NodeUsage, PodRecord,
    PodUsage, Quantities, ServicePort, ServiceRecord, UsageReport,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ContainerStatus, Node, NodeStatus, Pod, ResourceRequirements, Service,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ApiResource, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";
const IN_CLUSTER_CONTEXT: &str = "in-cluster";

/// Usage overlay from the two metrics listings; either one failing means
/// the metrics API is unusable and the cycle proceeds without usage
fn usage_report(
    nodes: kube::Result<Vec<DynamicObject>>,
    pods: kube::Result<Vec<DynamicObject>>,
) -> Option<UsageReport> {
    let (nodes, pods) = match (nodes, pods) {
        (Ok(nodes), Ok(pods)) => (nodes, pods),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Metrics API unavailable, skipping usage overlay");
            return None;
        }
    };

    Some(UsageReport {
        nodes: nodes.iter().map(node_usage).collect(),
        pods: pods.iter().map(pod_usage).collect(),
        raw_node_metrics: json!({ "items": nodes }),
        raw_pod_metrics: json!({ "items": pods }),
    })
}

pub struct KubeInventorySource {
    client: Client,
    context: String,
    contexts: Vec<String>,
}

impl KubeInventorySource {
    /// Connect using the local kubeconfig, selecting `context` or the current
    /// context. Falls back to in-cluster configuration when no kubeconfig exists.
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let kubeconfig = match Kubeconfig::read() {
            Ok(kubeconfig) => kubeconfig,
            Err(e) => {
                debug!(error = %e, "No kubeconfig, trying in-cluster configuration");
                let config = Config::infer()
                    .await
                    .map_err(|e| GraphError::Collection(format!("kube config: {}", e)))?;
                return Ok(Self {
                    client: Client::try_from(config)?,
                    context: IN_CLUSTER_CONTEXT.to_string(),
                    contexts: vec![IN_CLUSTER_CONTEXT.to_string()],
                });
            }
        };

        let contexts: Vec<String> = kubeconfig.contexts.iter().map(|c| c.name.clone()).collect();
        let selected = context
            .map(str::to_string)
            .or_else(|| kubeconfig.current_context.clone())
            .ok_or_else(|| GraphError::Config("no kubeconfig context selected".to_string()))?;

        let options = KubeConfigOptions {
            context: Some(selected.clone()),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| GraphError::Collection(format!("context {}: {}", selected, e)))?;

        info!(context = %selected, "Using kubeconfig context");
        Ok(Self {
            client: Client::try_from(config)?,
            context: selected,
            contexts,
        })
    }

    fn metrics_api(&self, plural: &str, kind: &str, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: "metrics.k8s.io".to_string(),
            version: "v1beta1".to_string(),
            api_version: "metrics.k8s.io/v1beta1".to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        };
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

fn quantities(source: Option<&BTreeMap<String, Quantity>>) -> Quantities {
    let get = |key: &str| source.and_then(|m| m.get(key)).map(|q| q.0.clone());
    Quantities {
        cpu: get("cpu"),
        memory: get("memory"),
    }
}

fn node_readiness(status: Option<&NodeStatus>) -> String {
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"));

    match ready.map(|c| c.status.as_str()) {
        Some("True") => "Ready",
        Some("False") => "NotReady",
        _ => "Unknown",
    }
    .to_string()
}

fn node_record(node: &Node) -> NodeRecord {
    let roles = node
        .metadata
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .keys()
                .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    NodeRecord {
        name: node.metadata.name.clone().unwrap_or_default(),
        status: node_readiness(node.status.as_ref()),
        roles,
        capacity: quantities(node.status.as_ref().and_then(|s| s.capacity.as_ref())),
        allocatable: quantities(node.status.as_ref().and_then(|s| s.allocatable.as_ref())),
    }
}

fn container_state(status: Option<&ContainerStatus>) -> String {
    let state = status.and_then(|s| s.state.as_ref());
    match state {
        Some(s) if s.running.is_some() => "Running",
        Some(s) if s.waiting.is_some() => "Waiting",
        Some(s) if s.terminated.is_some() => "Terminated",
        _ => "Unknown",
    }
    .to_string()
}

fn pod_record(pod: &Pod) -> PodRecord {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref());

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|c| {
                    let status = statuses.and_then(|all| all.iter().find(|s| s.name == c.name));
                    let resources: Option<&ResourceRequirements> = c.resources.as_ref();
                    ContainerRecord {
                        name: c.name.clone(),
                        image: c.image.clone().unwrap_or_default(),
                        status: container_state(status),
                        requests: quantities(resources.and_then(|r| r.requests.as_ref())),
                        limits: quantities(resources.and_then(|r| r.limits.as_ref())),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    PodRecord {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        status: pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        node_name: pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .unwrap_or_default(),
        containers,
    }
}

fn service_record(service: &Service) -> ServiceRecord {
    let spec = service.spec.as_ref();
    let ports = spec
        .and_then(|s| s.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| ServicePort {
                    name: p.name.clone().unwrap_or_default(),
                    port: p.port,
                    target_port: match &p.target_port {
                        Some(IntOrString::Int(port)) => port.to_string(),
                        Some(IntOrString::String(name)) => name.clone(),
                        None => p.port.to_string(),
                    },
                    protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    let external_ip = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|i| i.ip.clone().or_else(|| i.hostname.clone()));

    ServiceRecord {
        name: service.metadata.name.clone().unwrap_or_default(),
        namespace: service.metadata.namespace.clone().unwrap_or_default(),
        service_type: spec
            .and_then(|s| s.type_.clone())
            .unwrap_or_else(|| "ClusterIP".to_string()),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()).unwrap_or_default(),
        external_ip,
        ports,
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
    }
}

fn text(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn node_usage(object: &DynamicObject) -> NodeUsage {
    NodeUsage {
        name: object.metadata.name.clone().unwrap_or_default(),
        cpu: text(&object.data, "/usage/cpu"),
        memory: text(&object.data, "/usage/memory"),
    }
}

fn pod_usage(object: &DynamicObject) -> PodUsage {
    let containers = object
        .data
        .get("containers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|c| ContainerUsage {
                    name: text(c, "/name"),
                    cpu: text(c, "/usage/cpu"),
                    memory: text(c, "/usage/memory"),
                })
                .collect()
        })
        .unwrap_or_default();

    PodUsage {
        name: object.metadata.name.clone().unwrap_or_default(),
        namespace: object.metadata.namespace.clone().unwrap_or_default(),
        containers,
    }
}

#[async_trait]
impl InventorySource for KubeInventorySource {
    fn context_name(&self) -> &str {
        &self.context
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(node_record).collect())
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodRecord>> {
        let pods: Api<Pod> = self.scoped(namespace);
        let list = pods.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(pod_record).collect())
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<ServiceRecord>> {
        let services: Api<Service> = self.scoped(namespace);
        let list = services.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(service_record).collect())
    }

    async fn cluster_info(&self) -> Result<ClusterInfoRecord> {
        let info = self.client.apiserver_version().await?;
        Ok(ClusterInfoRecord {
            server_version: Some(info.git_version.clone()),
            platform: Some(info.platform.clone()),
            raw: serde_json::to_value(&info)?,
        })
    }

    async fn resource_usage(&self, namespace: Option<&str>) -> Result<Option<UsageReport>> {
        // Node metrics are cluster scoped
        let nodes = self
            .metrics_api("nodes", "NodeMetrics", None)
            .list(&ListParams::default())
            .await
            .map(|list| list.items);
        let pods = self
            .metrics_api("pods", "PodMetrics", namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items);

        Ok(usage_report(nodes, pods))
    }

    async fn available_contexts(&self) -> Result<Vec<String>> {
        Ok(self.contexts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, ContainerState, ContainerStateRunning, LoadBalancerIngress,
        LoadBalancerStatus, NodeCondition, PodSpec, PodStatus, ServicePort as KubeServicePort,
        ServiceSpec, ServiceStatus,
    };
    use kube::api::ObjectMeta;

    fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_record_readiness_and_roles() {
        let mut metadata = meta("cp-1", None);
        metadata.labels = Some(BTreeMap::from([
            (format!("{}control-plane", ROLE_LABEL_PREFIX), String::new()),
            ("kubernetes.io/os".to_string(), "linux".to_string()),
        ]));

        let node = Node {
            metadata,
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".into(),
                    status: "True".into(),
                    ..Default::default()
                }]),
                capacity: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("4".into())),
                    ("memory".to_string(), Quantity("8Gi".into())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let record = node_record(&node);
        assert_eq!(record.status, "Ready");
        assert_eq!(record.roles, vec!["control-plane".to_string()]);
        assert_eq!(record.capacity, Quantities::new("4", "8Gi"));
        assert_eq!(record.allocatable, Quantities::default());
    }

    #[test]
    fn test_node_without_conditions_is_unknown() {
        let node = Node {
            metadata: meta("n", None),
            ..Default::default()
        };
        assert_eq!(node_record(&node).status, "Unknown");
    }

    #[test]
    fn test_pod_record_containers() {
        let pod = Pod {
            metadata: meta("web-0", Some("default")),
            spec: Some(PodSpec {
                node_name: Some("worker-1".into()),
                containers: vec![Container {
                    name: "nginx".into(),
                    image: Some("nginx:1.25".into()),
                    resources: Some(ResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "cpu".to_string(),
                            Quantity("250m".into()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".into()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "nginx".into(),
                    state: Some(ContainerState {
                        running: Some(ContainerStateRunning::default()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        let record = pod_record(&pod);
        assert_eq!(record.node_name, "worker-1");
        assert_eq!(record.status, "Running");
        assert_eq!(record.containers[0].status, "Running");
        assert_eq!(record.containers[0].requests.cpu.as_deref(), Some("250m"));
        assert_eq!(record.containers[0].limits.memory, None);
    }

    #[test]
    fn test_service_record_defaults_and_external_ip() {
        let service = Service {
            metadata: meta("web", Some("default")),
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.96.0.10".into()),
                ports: Some(vec![KubeServicePort {
                    name: Some("http".into()),
                    port: 80,
                    target_port: Some(IntOrString::Int(8080)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some("34.1.2.3".into()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
        };

        let record = service_record(&service);
        assert_eq!(record.service_type, "ClusterIP");
        assert_eq!(record.external_ip.as_deref(), Some("34.1.2.3"));
        assert_eq!(record.ports[0].target_port, "8080");
        assert_eq!(record.ports[0].protocol, "TCP");
    }

    #[test]
    fn test_metrics_objects() {
        let mut node = DynamicObject::new(
            "worker-1",
            &ApiResource {
                group: "metrics.k8s.io".into(),
                version: "v1beta1".into(),
                api_version: "metrics.k8s.io/v1beta1".into(),
                kind: "NodeMetrics".into(),
                plural: "nodes".into(),
            },
        );
        node.data = json!({"usage": {"cpu": "250m", "memory": "1024Ki"}});

        let usage = node_usage(&node);
        assert_eq!(usage.name, "worker-1");
        assert_eq!(usage.cpu, "250m");
        assert_eq!(usage.memory, "1024Ki");
    }

    fn metrics_object(kind: &str, plural: &str, name: &str, data: Value) -> DynamicObject {
        let mut object = DynamicObject::new(
            name,
            &ApiResource {
                group: "metrics.k8s.io".into(),
                version: "v1beta1".into(),
                api_version: "metrics.k8s.io/v1beta1".into(),
                kind: kind.into(),
                plural: plural.into(),
            },
        );
        object.data = data;
        object
    }

    fn unavailable() -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "the server could not find the requested resource".into(),
            reason: "NotFound".into(),
            code: 404,
        })
    }

    #[test]
    fn test_usage_report_from_both_listings() {
        let node = metrics_object(
            "NodeMetrics",
            "nodes",
            "worker-1",
            json!({"usage": {"cpu": "250m", "memory": "1Gi"}}),
        );
        let report = usage_report(Ok(vec![node]), Ok(vec![])).unwrap();

        assert_eq!(report.nodes.len(), 1);
        assert!(report.pods.is_empty());
        assert_eq!(report.raw_node_metrics["items"][0]["metadata"]["name"], json!("worker-1"));
    }

    #[test]
    fn test_either_metrics_failure_skips_usage() {
        let node = metrics_object("NodeMetrics", "nodes", "worker-1", json!({}));

        assert!(usage_report(Err(unavailable()), Ok(vec![])).is_none());
        assert!(usage_report(Ok(vec![node]), Err(unavailable())).is_none());
    }
}
