//! Graph library for cluster inventory monitoring
//!
//! This crate provides the core functionality for:
//! - Collecting cluster inventory and resource usage
//! - Assembling inventory into typed graph snapshots
//! - Transactional upserts into a property graph store
//! - Reading the graph back for visualization and summaries
//! - Health checks and observability

pub mod entity;
pub mod error;
pub mod health;
pub mod host;
pub mod identity;
pub mod inventory;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod readback;
pub mod snapshot;
pub mod store;
pub mod units;
pub mod upsert;

pub use entity::{Entity, EntityKind, RelationshipKind};
pub use error::{GraphError, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inventory::{InventorySource, KubeInventorySource};
pub use monitor::{LoopReport, MonitorConfig, MonitorLoop};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use readback::GraphReadback;
pub use snapshot::{Snapshot, SnapshotAssembler};
pub use store::{GraphStore, MemoryGraphStore, Neo4jConfig, Neo4jGraphStore};
pub use upsert::GraphUpsertEngine;
