//! Graph store abstraction
//!
//! The upsert engine and the readback path talk to the store only through
//! [`GraphStore`]. A store must provide merge-by-identifier for entities,
//! merge-by-(endpoints, type) for relationships and all-or-nothing commit of a
//! [`WriteBatch`]. Readers never observe a partially applied batch.

mod memory;
mod neo4j;

pub use memory::MemoryGraphStore;
pub use neo4j::{Neo4jConfig, Neo4jGraphStore};

use crate::entity::{ClusterMetricsEntity, EntityKind, Properties, RelationshipKind};
use crate::error::{GraphError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Entity as persisted: graph label, identifier and property map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredNode {
    pub label: String,
    pub id: String,
    pub properties: Properties,
}

/// Directed relationship between two persisted entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StoredEdge {
    pub source: String,
    pub target: String,
    pub rel_type: String,
}

/// Typed reference to an entity by kind and identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub kind: EntityKind,
    pub id: String,
}

impl NodeRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpsert {
    pub kind: EntityKind,
    pub id: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipUpsert {
    pub kind: RelationshipKind,
    pub from: NodeRef,
    pub to: NodeRef,
}

/// Everything one snapshot writes, applied as a single transaction:
/// entities first, then relationships
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub entities: Vec<EntityUpsert>,
    pub relationships: Vec<RelationshipUpsert>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Outcome of a committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub entities_written: usize,
    pub relationships_written: usize,
}

/// Outcome of a retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub nodes_deleted: u64,
    pub relationships_deleted: u64,
}

/// Per-cluster aggregate; clusters with no children report zero counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: String,
    pub context: String,
    pub vm_id: String,
    pub node_count: i64,
    pub pod_count: i64,
    pub service_count: i64,
    pub metrics: Option<ClusterMetricsEntity>,
}

/// Transactional property-graph store
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    /// Check the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Apply a batch atomically. Any failure rolls back the whole batch and
    /// surfaces as [`GraphError::Transaction`].
    async fn apply(&self, batch: &WriteBatch) -> Result<WriteSummary>;

    async fn all_nodes(&self) -> Result<Vec<StoredNode>>;

    async fn all_edges(&self) -> Result<Vec<StoredEdge>>;

    async fn find_node(&self, id: &str) -> Result<Option<StoredNode>>;

    async fn nodes_with_label(&self, label: &str) -> Result<Vec<StoredNode>>;

    /// `(label, count)` per entity label
    async fn count_by_label(&self) -> Result<Vec<(String, i64)>>;

    /// Nodes of `label` whose numeric `field` strictly exceeds `threshold`,
    /// highest first
    async fn nodes_above(&self, label: &str, field: &str, threshold: f64)
        -> Result<Vec<StoredNode>>;

    async fn cluster_summaries(&self, cluster_id: Option<&str>) -> Result<Vec<ClusterSummary>>;

    /// Detach and delete entities of the given kinds (all kinds when empty)
    /// whose last update precedes `cutoff`
    async fn sweep(&self, cutoff: DateTime<Utc>, kinds: &[EntityKind]) -> Result<SweepReport>;

    /// Pass a read query through to the store, one JSON object per row
    async fn raw_query(&self, query: &str) -> Result<Vec<serde_json::Value>>;
}

/// Property names are interpolated into store queries, so only plain
/// identifiers are accepted
pub(crate) fn validate_field(field: &str) -> Result<()> {
    let mut chars = field.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(GraphError::InvalidQuery(format!(
            "invalid property name '{}'",
            field
        )))
    }
}

/// Resolve the kinds a sweep applies to
pub(crate) fn sweep_kinds(kinds: &[EntityKind]) -> Vec<EntityKind> {
    if kinds.is_empty() {
        EntityKind::ALL.to_vec()
    } else {
        kinds.to_vec()
    }
}
