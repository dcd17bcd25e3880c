//! Inventory records as returned by the cluster-inventory source
//!
//! Quantities are kept as the raw strings the cluster reports; normalization
//! into cores and MiB happens once, during snapshot assembly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw CPU/memory quantity pair, e.g. `{"cpu": "500m", "memory": "128Mi"}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantities {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl Quantities {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: Some(cpu.into()),
            memory: Some(memory.into()),
        }
    }
}

/// Compute node record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    /// `Ready`, `NotReady` or `Unknown`
    pub status: String,
    pub roles: Vec<String>,
    pub capacity: Quantities,
    pub allocatable: Quantities,
}

/// Container as declared in a pod spec and reported in its status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    /// `Running`, `Waiting`, `Terminated` or `Unknown`
    pub status: String,
    pub requests: Quantities,
    pub limits: Quantities,
}

/// Pod record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    /// Pod phase
    pub status: String,
    /// Name of the hosting node; empty while unscheduled
    pub node_name: String,
    pub containers: Vec<ContainerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
    pub target_port: String,
    pub protocol: String,
}

/// Network service record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub namespace: String,
    pub service_type: String,
    pub cluster_ip: String,
    pub external_ip: Option<String>,
    pub ports: Vec<ServicePort>,
    pub selector: BTreeMap<String, String>,
}

/// Cluster-level metadata reported by the API server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInfoRecord {
    pub server_version: Option<String>,
    pub platform: Option<String>,
    /// Anything else the source reported, kept verbatim
    pub raw: serde_json::Value,
}

/// Usage sample for a node from the metrics source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

/// Usage sample for a pod, broken down per container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodUsage {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerUsage>,
}

/// Usage overlay from the metrics source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageReport {
    pub nodes: Vec<NodeUsage>,
    pub pods: Vec<PodUsage>,
    /// Source payloads stored verbatim on the ResourceUsage entity
    pub raw_node_metrics: serde_json::Value,
    pub raw_pod_metrics: serde_json::Value,
}

/// Host the monitor runs on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub ip_addresses: Vec<String>,
    pub platform: String,
}

/// One round of inventory calls against a single context
#[derive(Debug, Clone)]
pub struct Inventory {
    pub context: String,
    pub available_contexts: Vec<String>,
    pub cluster_info: ClusterInfoRecord,
    pub nodes: Vec<NodeRecord>,
    pub pods: Vec<PodRecord>,
    pub services: Vec<ServiceRecord>,
}
