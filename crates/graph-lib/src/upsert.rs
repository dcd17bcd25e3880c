//! Snapshot persistence
//!
//! [`GraphUpsertEngine::store_snapshot`] writes one snapshot as one batch:
//! every entity merged by identifier, then every relationship implied by
//! structural containment. Relationships are derived by exact field joins
//! (a pod's `node_id`, a container's `pod_id`, ...), never by string matching
//! on composite identifiers.

use crate::entity::{EntityKind, RelationshipKind};
use crate::error::Result;
use crate::observability::MonitorMetrics;
use crate::snapshot::Snapshot;
use crate::store::{EntityUpsert, GraphStore, NodeRef, RelationshipUpsert, WriteBatch, WriteSummary};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub struct GraphUpsertEngine {
    store: Arc<dyn GraphStore>,
    metrics: MonitorMetrics,
}

impl GraphUpsertEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            metrics: MonitorMetrics::new(),
        }
    }

    /// Persist a snapshot in a single transaction.
    ///
    /// Returns `false` when the transaction failed and was rolled back; the
    /// caller skips the cycle and does not retry.
    pub async fn store_snapshot(&self, snapshot: &Snapshot) -> bool {
        let start = Instant::now();
        let result = self.write(snapshot).await;
        self.metrics
            .observe_store_latency(start.elapsed().as_secs_f64());

        match result {
            Ok(summary) => {
                self.metrics.set_last_write(
                    summary.entities_written as i64,
                    summary.relationships_written as i64,
                );
                info!(
                    cluster_id = %snapshot.cluster().id,
                    entities = summary.entities_written,
                    relationships = summary.relationships_written,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Snapshot stored"
                );
                true
            }
            Err(e) => {
                self.metrics.inc_transaction_failures();
                error!(
                    cluster_id = %snapshot.cluster().id,
                    error = %e,
                    kind = e.kind(),
                    "Snapshot write rolled back"
                );
                false
            }
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<WriteSummary> {
        let batch = plan(snapshot)?;
        self.store.apply(&batch).await
    }
}

/// Build the write batch for a snapshot: entities parent-first, then the
/// deduplicated set of relationships between them
pub fn plan(snapshot: &Snapshot) -> Result<WriteBatch> {
    let entities = snapshot
        .entities()
        .iter()
        .map(|entity| {
            Ok(EntityUpsert {
                kind: entity.kind(),
                id: entity.id().to_string(),
                properties: entity.properties()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(WriteBatch {
        entities,
        relationships: relationships(snapshot).into_iter().collect(),
    })
}

fn relationships(snapshot: &Snapshot) -> BTreeSet<RelationshipUpsert> {
    let mut rels = BTreeSet::new();
    let mut link = |kind, from: NodeRef, to: NodeRef| {
        rels.insert(RelationshipUpsert { kind, from, to });
    };

    let vm = snapshot.vm();
    let cluster = snapshot.cluster();
    let cluster_ref = || NodeRef::new(EntityKind::Cluster, cluster.id.clone());

    if cluster.vm_id == vm.id {
        link(
            RelationshipKind::Hosts,
            NodeRef::new(EntityKind::Vm, vm.id.clone()),
            cluster_ref(),
        );
    }

    for node in snapshot.nodes().iter().filter(|n| n.cluster_id == cluster.id) {
        link(
            RelationshipKind::Contains,
            cluster_ref(),
            NodeRef::new(EntityKind::Node, node.id.clone()),
        );
    }

    for pod in snapshot.pods().iter().filter(|p| p.cluster_id == cluster.id) {
        link(
            RelationshipKind::Contains,
            cluster_ref(),
            NodeRef::new(EntityKind::Pod, pod.id.clone()),
        );
    }

    for service in snapshot.services().iter().filter(|s| s.cluster_id == cluster.id) {
        link(
            RelationshipKind::Contains,
            cluster_ref(),
            NodeRef::new(EntityKind::Service, service.id.clone()),
        );
    }

    if let Some(usage) = snapshot.resource_usage() {
        if usage.cluster_id == cluster.id {
            link(
                RelationshipKind::HasResourceUsage,
                cluster_ref(),
                NodeRef::new(EntityKind::ResourceUsage, usage.id.clone()),
            );
        }
    }

    for pod in snapshot.pods() {
        let Some(node_id) = &pod.node_id else {
            continue;
        };
        if snapshot.nodes().iter().any(|n| &n.id == node_id) {
            link(
                RelationshipKind::Hosts,
                NodeRef::new(EntityKind::Node, node_id.clone()),
                NodeRef::new(EntityKind::Pod, pod.id.clone()),
            );
        }
    }

    for container in snapshot.containers() {
        if snapshot.pods().iter().any(|p| p.id == container.pod_id) {
            link(
                RelationshipKind::Contains,
                NodeRef::new(EntityKind::Pod, container.pod_id.clone()),
                NodeRef::new(EntityKind::Container, container.id.clone()),
            );
        }
    }

    rels
}
