//! Graph readback
//!
//! Rebuilds consumer views from the store: the decorated, deduplicated
//! node/edge payload for visualization plus the aggregate and lookup queries
//! behind the read API. Every operation takes the store handle it was built
//! with; nothing here holds process-wide state.

use crate::entity::{
    decorate, decorate_unrecognized, edge_color, Entity, EntityKind, Properties,
    ResourceUsageEntity, VmEntity,
};
use crate::error::{GraphError, Result};
use crate::store::{ClusterSummary, GraphStore, StoredEdge, StoredNode};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Clauses that make a raw query write to the store
const WRITE_CLAUSES: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "LOAD", "FOREACH", "CALL",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub group: String,
    pub color: &'static str,
    pub title: String,
    pub properties: Properties,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub label: String,
    pub arrows: &'static str,
    pub color: &'static str,
}

/// Visualization payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDetail {
    pub id: String,
    pub labels: Vec<String>,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub count: i64,
}

/// Entity that passed a threshold filter, with the value it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredEntity {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub properties: Properties,
}

pub struct GraphReadback {
    store: Arc<dyn GraphStore>,
    raw_query_enabled: bool,
}

impl GraphReadback {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            raw_query_enabled: false,
        }
    }

    /// Allow read-only raw queries to pass through to the store
    pub fn with_raw_query(mut self, enabled: bool) -> Self {
        self.raw_query_enabled = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Decorated node/edge payload.
    ///
    /// Nodes are deduplicated by identifier with the first occurrence kept.
    /// Edges are kept only between nodes in that set and deduplicated by
    /// `(source, target, type)`.
    pub async fn get_full_graph(&self) -> Result<GraphPayload> {
        let stored = self.store.all_nodes().await?;
        let edges = self.store.all_edges().await?;

        let payload = build_payload(stored, edges);
        debug!(nodes = payload.nodes.len(), edges = payload.edges.len(), "Graph payload built");
        Ok(payload)
    }

    /// Payload restricted to what one VM reaches by following relationships
    /// downward: its clusters, their nodes, pods, services, containers,
    /// metrics and usage samples
    pub async fn get_vm_graph(&self, vm_id: &str) -> Result<GraphPayload> {
        let vm_exists = self
            .store
            .find_node(vm_id)
            .await?
            .map(|node| node.label == EntityKind::Vm.label())
            .unwrap_or(false);
        if !vm_exists {
            return Err(GraphError::NotFound(vm_id.to_string()));
        }

        let edges = self.store.all_edges().await?;
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &edges {
            children
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }

        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([vm_id]);
        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id.to_string()) {
                continue;
            }
            if let Some(targets) = children.get(id) {
                queue.extend(targets.iter().copied());
            }
        }

        let stored: Vec<StoredNode> = self
            .store
            .all_nodes()
            .await?
            .into_iter()
            .filter(|node| reachable.contains(&node.id))
            .collect();

        let payload = build_payload(stored, edges);
        debug!(
            vm_id,
            nodes = payload.nodes.len(),
            edges = payload.edges.len(),
            "VM graph payload built"
        );
        Ok(payload)
    }

    pub async fn get_entity_detail(&self, id: &str) -> Result<EntityDetail> {
        let node = self
            .store
            .find_node(id)
            .await?
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;

        Ok(EntityDetail {
            id: node.id,
            labels: vec![node.label.clone()],
            entity_type: node.label,
            properties: node.properties,
        })
    }

    pub async fn get_counts_by_type(&self) -> Result<Vec<TypeCount>> {
        Ok(self
            .store
            .count_by_label()
            .await?
            .into_iter()
            .map(|(entity_type, count)| TypeCount { entity_type, count })
            .collect())
    }

    /// Entities of `kind` whose numeric `field` strictly exceeds `threshold`,
    /// highest first
    pub async fn get_filtered(
        &self,
        kind: EntityKind,
        field: &str,
        threshold: f64,
    ) -> Result<Vec<FilteredEntity>> {
        let nodes = self
            .store
            .nodes_above(kind.label(), field, threshold)
            .await?;

        Ok(nodes
            .into_iter()
            .map(|node| {
                let value = node
                    .properties
                    .get(field)
                    .and_then(Value::as_f64)
                    .unwrap_or_default();
                let name = node
                    .properties
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                FilteredEntity {
                    id: node.id,
                    name,
                    value,
                    properties: node.properties,
                }
            })
            .collect())
    }

    pub async fn get_cluster_summary(&self, cluster_id: Option<&str>) -> Result<Vec<ClusterSummary>> {
        self.store.cluster_summaries(cluster_id).await
    }

    /// VMs, most recently captured first
    pub async fn get_vm_summary(&self) -> Result<Vec<VmEntity>> {
        let mut vms: Vec<VmEntity> = self
            .typed(EntityKind::Vm)
            .await?
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Vm(vm) => Some(vm),
                _ => None,
            })
            .collect();

        vms.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(vms)
    }

    pub async fn get_resource_usage(&self) -> Result<Vec<ResourceUsageEntity>> {
        Ok(self
            .typed(EntityKind::ResourceUsage)
            .await?
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::ResourceUsage(usage) => Some(usage),
                _ => None,
            })
            .collect())
    }

    /// Pass a read-only query through to the store
    pub async fn raw_query(&self, query: &str) -> Result<Vec<Value>> {
        if !self.raw_query_enabled {
            return Err(GraphError::RawQueryDisabled);
        }
        check_read_only(query)?;
        self.store.raw_query(query).await
    }

    async fn typed(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.store
            .nodes_with_label(kind.label())
            .await?
            .iter()
            .map(|node| Entity::from_properties(kind, &node.properties))
            .collect()
    }
}

fn build_payload(stored: Vec<StoredNode>, stored_edges: Vec<StoredEdge>) -> GraphPayload {
    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(stored.len());
    for node in stored {
        if seen.insert(node.id.clone()) {
            nodes.push(graph_node(node));
        }
    }

    let mut edge_keys = HashSet::new();
    let mut edges = Vec::new();
    for edge in stored_edges {
        if !seen.contains(&edge.source) || !seen.contains(&edge.target) {
            continue;
        }
        if !edge_keys.insert((edge.source.clone(), edge.target.clone(), edge.rel_type.clone())) {
            continue;
        }
        edges.push(GraphEdge {
            color: edge_color(&edge.rel_type),
            from: edge.source,
            to: edge.target,
            label: edge.rel_type,
            arrows: "to",
        });
    }

    GraphPayload { nodes, edges }
}

fn graph_node(node: StoredNode) -> GraphNode {
    let decoration = EntityKind::from_label(&node.label)
        .and_then(|kind| Entity::from_properties(kind, &node.properties).ok())
        .map(|entity| decorate(&entity))
        .unwrap_or_else(|| decorate_unrecognized(&node.label, &node.id, &node.properties));

    GraphNode {
        id: node.id,
        label: decoration.label,
        group: node.label.clone(),
        color: decoration.color,
        title: decoration.title,
        properties: node.properties,
        node_type: node.label,
    }
}

fn check_read_only(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(GraphError::InvalidQuery("No query provided".to_string()));
    }

    let upper = query.to_ascii_uppercase();
    let clause = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .find(|word| WRITE_CLAUSES.contains(word));

    match clause {
        Some(clause) => Err(GraphError::InvalidQuery(format!(
            "{} is not allowed in a read-only query",
            clause
        ))),
        None => Ok(()),
    }
}
