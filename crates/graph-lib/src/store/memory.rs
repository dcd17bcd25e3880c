//! In-memory graph store
//!
//! Holds the whole graph behind one lock. A batch is applied to a staged copy
//! and swapped in only when both phases succeed, which gives readers the same
//! all-or-nothing visibility a transactional database does.

use super::{
    sweep_kinds, validate_field, ClusterSummary, GraphStore, NodeRef, StoredEdge, StoredNode,
    SweepReport, WriteBatch, WriteSummary,
};
use crate::entity::{
    ClusterMetricsEntity, EntityKind, Properties, RelationshipKind, CREATED_AT, LAST_UPDATED,
};
use crate::error::{GraphError, Result};
use crate::snapshot::iso_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct NodeEntry {
    kind: EntityKind,
    id: String,
    properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeEntry {
    kind: RelationshipKind,
    from: NodeRef,
    to: NodeRef,
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: Vec<NodeEntry>,
    index: HashMap<NodeRef, usize>,
    edges: Vec<EdgeEntry>,
    edge_index: HashSet<EdgeEntry>,
}

impl GraphState {
    fn upsert_node(&mut self, kind: EntityKind, id: &str, properties: &Properties, now: DateTime<Utc>) {
        let key = NodeRef::new(kind, id);
        match self.index.get(&key) {
            Some(&slot) => {
                let entry = &mut self.nodes[slot];
                let created_at = entry.properties.get(CREATED_AT).cloned();
                let previous = entry
                    .properties
                    .get(LAST_UPDATED)
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc));

                // last_updated never moves backwards
                let updated = previous.map_or(now, |prev| prev.max(now));

                entry.properties = properties.clone();
                if let Some(created_at) = created_at {
                    entry.properties.insert(CREATED_AT.to_string(), created_at);
                }
                entry
                    .properties
                    .insert(LAST_UPDATED.to_string(), Value::String(iso_timestamp(updated)));
            }
            None => {
                let mut properties = properties.clone();
                let stamp = Value::String(iso_timestamp(now));
                properties.insert(CREATED_AT.to_string(), stamp.clone());
                properties.insert(LAST_UPDATED.to_string(), stamp);

                self.index.insert(key, self.nodes.len());
                self.nodes.push(NodeEntry {
                    kind,
                    id: id.to_string(),
                    properties,
                });
            }
        }
    }

    fn merge_edge(&mut self, edge: EdgeEntry) -> Result<()> {
        for end in [&edge.from, &edge.to] {
            if !self.index.contains_key(end) {
                return Err(GraphError::Transaction(format!(
                    "{} endpoint {} not found for {}",
                    end.kind, end.id, edge.kind
                )));
            }
        }

        if self.edge_index.insert(edge.clone()) {
            self.edges.push(edge);
        }
        Ok(())
    }

    fn stored(&self, entry: &NodeEntry) -> StoredNode {
        StoredNode {
            label: entry.kind.label().to_string(),
            id: entry.id.clone(),
            properties: entry.properties.clone(),
        }
    }

    fn rebuild_indexes(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(slot, n)| (NodeRef::new(n.kind, n.id.clone()), slot))
            .collect();
        self.edge_index = self.edges.iter().cloned().collect();
    }
}

/// Graph store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
    fail_relationships: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every relationship upsert fail until switched off
    pub fn fail_relationship_phase(&self, fail: bool) {
        self.fail_relationships.store(fail, Ordering::SeqCst);
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.read().await.edges.len()
    }
}

fn number(properties: &Properties, field: &str) -> Option<f64> {
    properties.get(field).and_then(Value::as_f64)
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<WriteSummary> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let now = Utc::now();

        for upsert in &batch.entities {
            staged.upsert_node(upsert.kind, &upsert.id, &upsert.properties, now);
        }

        for rel in &batch.relationships {
            if self.fail_relationships.load(Ordering::SeqCst) {
                return Err(GraphError::Transaction(format!(
                    "injected failure merging {} {} -> {}",
                    rel.kind, rel.from.id, rel.to.id
                )));
            }
            staged.merge_edge(EdgeEntry {
                kind: rel.kind,
                from: rel.from.clone(),
                to: rel.to.clone(),
            })?;
        }

        *state = staged;
        Ok(WriteSummary {
            entities_written: batch.entities.len(),
            relationships_written: batch.relationships.len(),
        })
    }

    async fn all_nodes(&self) -> Result<Vec<StoredNode>> {
        let state = self.state.read().await;
        Ok(state.nodes.iter().map(|n| state.stored(n)).collect())
    }

    async fn all_edges(&self) -> Result<Vec<StoredEdge>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .map(|e| StoredEdge {
                source: e.from.id.clone(),
                target: e.to.id.clone(),
                rel_type: e.kind.as_str().to_string(),
            })
            .collect())
    }

    async fn find_node(&self, id: &str) -> Result<Option<StoredNode>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| state.stored(n)))
    }

    async fn nodes_with_label(&self, label: &str) -> Result<Vec<StoredNode>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.kind.label() == label)
            .map(|n| state.stored(n))
            .collect())
    }

    async fn count_by_label(&self) -> Result<Vec<(String, i64)>> {
        let state = self.state.read().await;
        let mut counts: Vec<(String, i64)> = Vec::new();
        for kind in EntityKind::ALL {
            let count = state.nodes.iter().filter(|n| n.kind == kind).count() as i64;
            if count > 0 {
                counts.push((kind.label().to_string(), count));
            }
        }
        Ok(counts)
    }

    async fn nodes_above(
        &self,
        label: &str,
        field: &str,
        threshold: f64,
    ) -> Result<Vec<StoredNode>> {
        validate_field(field)?;
        let mut matches = self
            .nodes_with_label(label)
            .await?
            .into_iter()
            .filter_map(|n| number(&n.properties, field).map(|v| (v, n)))
            .filter(|(v, _)| *v > threshold)
            .collect::<Vec<_>>();

        matches.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(matches.into_iter().map(|(_, n)| n).collect())
    }

    async fn cluster_summaries(&self, cluster_id: Option<&str>) -> Result<Vec<ClusterSummary>> {
        let state = self.state.read().await;
        let mut summaries = Vec::new();

        for cluster in state.nodes.iter().filter(|n| n.kind == EntityKind::Cluster) {
            if cluster_id.is_some_and(|wanted| wanted != cluster.id) {
                continue;
            }

            let children = |kind: EntityKind| {
                state
                    .edges
                    .iter()
                    .filter(|e| {
                        e.kind == RelationshipKind::Contains
                            && e.from.kind == EntityKind::Cluster
                            && e.from.id == cluster.id
                            && e.to.kind == kind
                    })
                    .count() as i64
            };

            let metrics = state
                .nodes
                .iter()
                .find(|n| {
                    n.kind == EntityKind::ClusterMetrics
                        && n.properties.get("cluster_id").and_then(Value::as_str)
                            == Some(cluster.id.as_str())
                })
                .map(|n| {
                    serde_json::from_value::<ClusterMetricsEntity>(Value::Object(
                        n.properties.clone(),
                    ))
                })
                .transpose()?;

            let text = |key: &str| {
                cluster
                    .properties
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };

            summaries.push(ClusterSummary {
                cluster_id: cluster.id.clone(),
                context: text("context"),
                vm_id: text("vm_id"),
                node_count: children(EntityKind::Node),
                pod_count: children(EntityKind::Pod),
                service_count: children(EntityKind::Service),
                metrics,
            });
        }

        summaries.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        Ok(summaries)
    }

    async fn sweep(&self, cutoff: DateTime<Utc>, kinds: &[EntityKind]) -> Result<SweepReport> {
        let kinds = sweep_kinds(kinds);
        let mut state = self.state.write().await;

        let expired: HashSet<NodeRef> = state
            .nodes
            .iter()
            .filter(|n| kinds.contains(&n.kind))
            .filter(|n| {
                n.properties
                    .get(LAST_UPDATED)
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .is_some_and(|t| t.with_timezone(&Utc) < cutoff)
            })
            .map(|n| NodeRef::new(n.kind, n.id.clone()))
            .collect();

        if expired.is_empty() {
            return Ok(SweepReport::default());
        }

        // Detach first, then delete
        let edges_before = state.edges.len();
        state
            .edges
            .retain(|e| !expired.contains(&e.from) && !expired.contains(&e.to));
        let relationships_deleted = (edges_before - state.edges.len()) as u64;

        let nodes_before = state.nodes.len();
        state
            .nodes
            .retain(|n| !expired.contains(&NodeRef::new(n.kind, n.id.clone())));
        let nodes_deleted = (nodes_before - state.nodes.len()) as u64;

        state.rebuild_indexes();

        Ok(SweepReport {
            nodes_deleted,
            relationships_deleted,
        })
    }

    async fn raw_query(&self, _query: &str) -> Result<Vec<Value>> {
        Err(GraphError::Query(
            "raw queries are not supported by the in-memory store".to_string(),
        ))
    }
}
