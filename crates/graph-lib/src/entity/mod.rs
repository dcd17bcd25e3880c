//! Typed graph entities
//!
//! The graph holds a closed set of entity kinds. Each kind has a typed record
//! whose serde form is exactly the property map persisted on the graph node,
//! and [`Entity`] is the sum type over all of them. Nested values (service
//! ports, selectors, raw payloads) are stored as JSON text so every persisted
//! property is a scalar or a list of scalars.

mod decoration;

pub use decoration::{decorate, decorate_unrecognized, edge_color, node_color, Decoration};

use crate::error::Result;
use crate::models::ServicePort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property map of a persisted entity or edge
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Store-managed property: last upsert time, ISO-8601 UTC
pub const LAST_UPDATED: &str = "last_updated";
/// Store-managed property: first upsert time, ISO-8601 UTC
pub const CREATED_AT: &str = "created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "VM")]
    Vm,
    Cluster,
    Node,
    Pod,
    Service,
    Container,
    ClusterMetrics,
    ResourceUsage,
}

impl EntityKind {
    /// All kinds, in write order
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Vm,
        EntityKind::Cluster,
        EntityKind::Node,
        EntityKind::Pod,
        EntityKind::Service,
        EntityKind::Container,
        EntityKind::ClusterMetrics,
        EntityKind::ResourceUsage,
    ];

    /// Graph label
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Vm => "VM",
            EntityKind::Cluster => "Cluster",
            EntityKind::Node => "Node",
            EntityKind::Pod => "Pod",
            EntityKind::Service => "Service",
            EntityKind::Container => "Container",
            EntityKind::ClusterMetrics => "ClusterMetrics",
            EntityKind::ResourceUsage => "ResourceUsage",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    Hosts,
    Contains,
    HasResourceUsage,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Hosts => "HOSTS",
            RelationshipKind::Contains => "CONTAINS",
            RelationshipKind::HasResourceUsage => "HAS_RESOURCE_USAGE",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmEntity {
    pub id: String,
    pub hostname: String,
    pub ip_addresses: Vec<String>,
    pub platform: String,
    /// ISO-8601 time the snapshot was captured
    pub captured_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterEntity {
    pub id: String,
    pub context: String,
    pub vm_id: String,
    pub server_version: Option<String>,
    #[serde(with = "json_text")]
    pub cluster_info: serde_json::Value,
    pub available_contexts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeEntity {
    pub id: String,
    pub name: String,
    pub status: String,
    pub roles: Vec<String>,
    pub cpu_capacity: f64,
    pub memory_capacity: f64,
    pub cpu_allocatable: f64,
    pub memory_allocatable: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub cluster_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodEntity {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub status: String,
    /// Hosting node name as reported by the cluster
    pub node: String,
    /// Identifier of the hosting node entity, when it was part of the same snapshot
    pub node_id: Option<String>,
    pub cpu_requests: f64,
    pub memory_requests: f64,
    pub cpu_limits: f64,
    pub memory_limits: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub cluster_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEntity {
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub cluster_ip: String,
    pub external_ip: Option<String>,
    #[serde(with = "json_text")]
    pub ports: Vec<ServicePort>,
    #[serde(with = "json_text")]
    pub selector: BTreeMap<String, String>,
    pub cluster_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerEntity {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub cpu_request: f64,
    pub memory_request: f64,
    pub cpu_limit: f64,
    pub memory_limit: f64,
    pub pod_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMetricsEntity {
    pub id: String,
    pub cluster_id: String,
    pub total_pods: i64,
    pub running_pods: i64,
    pub pending_pods: i64,
    pub failed_pods: i64,
    pub total_services: i64,
    pub total_nodes: i64,
    pub ready_nodes: i64,
    pub total_cpu_usage: f64,
    pub total_memory_usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsageEntity {
    pub id: String,
    pub cluster_id: String,
    #[serde(with = "json_text")]
    pub node_metrics: serde_json::Value,
    #[serde(with = "json_text")]
    pub pod_metrics: serde_json::Value,
    pub captured_at: String,
}

/// Any graph entity
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Vm(VmEntity),
    Cluster(ClusterEntity),
    Node(NodeEntity),
    Pod(PodEntity),
    Service(ServiceEntity),
    Container(ContainerEntity),
    ClusterMetrics(ClusterMetricsEntity),
    ResourceUsage(ResourceUsageEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Vm(_) => EntityKind::Vm,
            Entity::Cluster(_) => EntityKind::Cluster,
            Entity::Node(_) => EntityKind::Node,
            Entity::Pod(_) => EntityKind::Pod,
            Entity::Service(_) => EntityKind::Service,
            Entity::Container(_) => EntityKind::Container,
            Entity::ClusterMetrics(_) => EntityKind::ClusterMetrics,
            Entity::ResourceUsage(_) => EntityKind::ResourceUsage,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Vm(e) => &e.id,
            Entity::Cluster(e) => &e.id,
            Entity::Node(e) => &e.id,
            Entity::Pod(e) => &e.id,
            Entity::Service(e) => &e.id,
            Entity::Container(e) => &e.id,
            Entity::ClusterMetrics(e) => &e.id,
            Entity::ResourceUsage(e) => &e.id,
        }
    }

    /// Property map persisted for this entity
    pub fn properties(&self) -> Result<Properties> {
        let value = match self {
            Entity::Vm(e) => serde_json::to_value(e)?,
            Entity::Cluster(e) => serde_json::to_value(e)?,
            Entity::Node(e) => serde_json::to_value(e)?,
            Entity::Pod(e) => serde_json::to_value(e)?,
            Entity::Service(e) => serde_json::to_value(e)?,
            Entity::Container(e) => serde_json::to_value(e)?,
            Entity::ClusterMetrics(e) => serde_json::to_value(e)?,
            Entity::ResourceUsage(e) => serde_json::to_value(e)?,
        };

        match value {
            serde_json::Value::Object(map) => Ok(map),
            // Every entity record is a struct
            other => Ok(Properties::from_iter([("value".to_string(), other)])),
        }
    }

    /// Rebuild a typed entity from a stored property map.
    ///
    /// Missing properties take their defaults; store-managed properties are ignored.
    pub fn from_properties(kind: EntityKind, properties: &Properties) -> Result<Entity> {
        let value = serde_json::Value::Object(properties.clone());
        let entity = match kind {
            EntityKind::Vm => Entity::Vm(serde_json::from_value(value)?),
            EntityKind::Cluster => Entity::Cluster(serde_json::from_value(value)?),
            EntityKind::Node => Entity::Node(serde_json::from_value(value)?),
            EntityKind::Pod => Entity::Pod(serde_json::from_value(value)?),
            EntityKind::Service => Entity::Service(serde_json::from_value(value)?),
            EntityKind::Container => Entity::Container(serde_json::from_value(value)?),
            EntityKind::ClusterMetrics => Entity::ClusterMetrics(serde_json::from_value(value)?),
            EntityKind::ResourceUsage => Entity::ResourceUsage(serde_json::from_value(value)?),
        };
        Ok(entity)
    }
}

/// Serialize a nested value as JSON text so it fits in a scalar graph property
mod json_text {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        let text = serde_json::to_string(value).map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}
