//! Deterministic entity identity
//!
//! Every entity kind has its own identity value object built only from stable
//! fields, so the same real-world object maps to the same graph node on every
//! snapshot cycle. Equality is structural: two identities are equal when their
//! parts are equal, never because two different field combinations happen to
//! concatenate to the same string. The string key (`name:parent`) is what the
//! store merges on; uniqueness of that key is scoped to the entity kind.

use crate::entity::EntityKind;
use chrono::{DateTime, Utc};
use std::fmt;

/// Separator between key segments
pub const KEY_SEPARATOR: &str = ":";

/// Identity of one entity kind
pub trait Identity: fmt::Display {
    /// The entity kind this identity belongs to
    const KIND: EntityKind;

    /// Store key for the entity
    fn key(&self) -> String {
        self.to_string()
    }
}

/// Host the monitor runs on, keyed by hostname plus the monitor's start time.
///
/// The start time is fixed for the lifetime of the process so repeated cycles
/// land on one VM node; a restarted process registers a new VM.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VmId {
    hostname: String,
    started_at: String,
}

impl VmId {
    pub fn new(hostname: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            hostname: hostname.into(),
            started_at: started_at.format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.hostname, KEY_SEPARATOR, self.started_at)
    }
}

impl Identity for VmId {
    const KIND: EntityKind = EntityKind::Vm;
}

/// Cluster as seen through one context from one VM
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterId {
    context: String,
    vm: VmId,
}

impl ClusterId {
    pub fn new(context: impl Into<String>, vm: VmId) -> Self {
        Self {
            context: context.into(),
            vm,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn vm(&self) -> &VmId {
        &self.vm
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.context, KEY_SEPARATOR, self.vm)
    }
}

impl Identity for ClusterId {
    const KIND: EntityKind = EntityKind::Cluster;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    name: String,
    cluster: ClusterId,
}

impl NodeId {
    pub fn new(name: impl Into<String>, cluster: ClusterId) -> Self {
        Self {
            name: name.into(),
            cluster,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.cluster
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, KEY_SEPARATOR, self.cluster)
    }
}

impl Identity for NodeId {
    const KIND: EntityKind = EntityKind::Node;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodId {
    name: String,
    namespace: String,
    cluster: ClusterId,
}

impl PodId {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, cluster: ClusterId) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.name,
            self.namespace,
            self.cluster,
            sep = KEY_SEPARATOR
        )
    }
}

impl Identity for PodId {
    const KIND: EntityKind = EntityKind::Pod;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    name: String,
    namespace: String,
    cluster: ClusterId,
}

impl ServiceId {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, cluster: ClusterId) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster,
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.name,
            self.namespace,
            self.cluster,
            sep = KEY_SEPARATOR
        )
    }
}

impl Identity for ServiceId {
    const KIND: EntityKind = EntityKind::Service;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId {
    name: String,
    pod: PodId,
}

impl ContainerId {
    pub fn new(name: impl Into<String>, pod: PodId) -> Self {
        Self {
            name: name.into(),
            pod,
        }
    }

    pub fn pod(&self) -> &PodId {
        &self.pod
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, KEY_SEPARATOR, self.pod)
    }
}

impl Identity for ContainerId {
    const KIND: EntityKind = EntityKind::Container;
}

/// Singleton aggregate metrics of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterMetricsId(ClusterId);

impl ClusterMetricsId {
    pub fn new(cluster: ClusterId) -> Self {
        Self(cluster)
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.0
    }
}

impl fmt::Display for ClusterMetricsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metrics{}{}", KEY_SEPARATOR, self.0)
    }
}

impl Identity for ClusterMetricsId {
    const KIND: EntityKind = EntityKind::ClusterMetrics;
}

/// Singleton raw usage payload of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUsageId(ClusterId);

impl ResourceUsageId {
    pub fn new(cluster: ClusterId) -> Self {
        Self(cluster)
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.0
    }
}

impl fmt::Display for ResourceUsageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usage{}{}", KEY_SEPARATOR, self.0)
    }
}

impl Identity for ResourceUsageId {
    const KIND: EntityKind = EntityKind::ResourceUsage;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vm() -> VmId {
        VmId::new("host-a", Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn cluster() -> ClusterId {
        ClusterId::new("kind-dev", vm())
    }

    #[test]
    fn test_vm_key_uses_hostname_and_start_time() {
        assert_eq!(vm().key(), "host-a:20240501T120000Z");
    }

    #[test]
    fn test_composite_keys() {
        let cluster = cluster();
        assert_eq!(cluster.key(), "kind-dev:host-a:20240501T120000Z");

        let node = NodeId::new("worker-1", cluster.clone());
        assert_eq!(node.key(), "worker-1:kind-dev:host-a:20240501T120000Z");

        let pod = PodId::new("web-0", "default", cluster.clone());
        assert_eq!(pod.key(), "web-0:default:kind-dev:host-a:20240501T120000Z");

        let svc = ServiceId::new("web", "default", cluster.clone());
        assert_eq!(svc.key(), "web:default:kind-dev:host-a:20240501T120000Z");

        let container = ContainerId::new("nginx", pod);
        assert_eq!(
            container.key(),
            "nginx:web-0:default:kind-dev:host-a:20240501T120000Z"
        );
    }

    #[test]
    fn test_singletons_keyed_by_cluster() {
        let metrics = ClusterMetricsId::new(cluster());
        let usage = ResourceUsageId::new(cluster());
        assert_eq!(metrics.key(), "metrics:kind-dev:host-a:20240501T120000Z");
        assert_eq!(usage.key(), "usage:kind-dev:host-a:20240501T120000Z");
        assert_eq!(metrics, ClusterMetricsId::new(cluster()));
    }

    #[test]
    fn test_same_inputs_same_identity() {
        let a = PodId::new("web-0", "default", cluster());
        let b = PodId::new("web-0", "default", cluster());
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_structural_equality_distinguishes_split_points() {
        // Both concatenate to "a:b:c:<cluster>" but are different pods
        let left = PodId::new("a:b", "c", cluster());
        let right = PodId::new("a", "b:c", cluster());
        assert_eq!(left.key(), right.key());
        assert_ne!(left, right);
    }

    #[test]
    fn test_identity_kinds() {
        assert_eq!(<NodeId as Identity>::KIND, EntityKind::Node);
        assert_eq!(<ResourceUsageId as Identity>::KIND, EntityKind::ResourceUsage);
    }
}
