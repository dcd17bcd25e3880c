//! Neo4j-backed graph store
//!
//! Entities are merged on `(label, id)` and relationships on
//! `(endpoints, type)`. A batch runs inside one explicit transaction; any
//! failed statement rolls the whole batch back. Timestamps are generated by
//! the server and stored as ISO-8601 strings.

use super::{
    sweep_kinds, validate_field, ClusterSummary, EntityUpsert, GraphStore, RelationshipUpsert,
    StoredEdge, StoredNode, SweepReport, WriteBatch, WriteSummary,
};
use crate::entity::{ClusterMetricsEntity, EntityKind, Properties};
use crate::error::{GraphError, Result};
use crate::snapshot::iso_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph, Query, Row};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Connection settings for the Neo4j store
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect, verify the server answers and create per-kind uniqueness
    /// constraints on `id`
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| GraphError::Connection(format!("{}: {}", config.uri, e)))?;

        let store = Self { graph };
        store.ping().await?;
        store.ensure_schema().await?;

        info!(uri = %config.uri, "Connected to Neo4j");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            let statement = format!(
                "CREATE CONSTRAINT {}_id IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE",
                kind.label().to_ascii_lowercase(),
                kind.label()
            );
            self.graph
                .run(query(&statement))
                .await
                .map_err(|e| GraphError::Connection(format!("schema setup failed: {}", e)))?;
        }
        debug!("Uniqueness constraints in place");
        Ok(())
    }

    async fn fetch(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_nodes(&self, q: Query) -> Result<Vec<StoredNode>> {
        let rows = self.fetch(q).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(node) = stored_node(&row)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: &Row, column: &str) -> Result<T> {
    row.get::<T>(column)
        .map_err(|e| GraphError::Query(format!("column '{}': {}", column, e)))
}

/// Rows without an `id` property are not entities this system wrote
fn stored_node(row: &Row) -> Result<Option<StoredNode>> {
    let labels: Vec<String> = decode(row, "labels")?;
    let properties: Properties = decode(row, "props")?;

    let Some(id) = properties.get("id").and_then(Value::as_str).map(str::to_string) else {
        return Ok(None);
    };

    Ok(Some(StoredNode {
        label: labels.into_iter().next().unwrap_or_else(|| "Unknown".to_string()),
        id,
        properties,
    }))
}

fn bolt_value(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => BoltType::from(s.clone()),
        Value::Array(items) => BoltType::List(BoltList {
            value: items.iter().map(bolt_value).collect(),
        }),
        // Entity records store nested values as text already
        Value::Object(_) => BoltType::from(value.to_string()),
    }
}

fn bolt_map(properties: &Properties) -> BoltType {
    let value: HashMap<BoltString, BoltType> = properties
        .iter()
        .map(|(k, v)| (BoltString::from(k.as_str()), bolt_value(v)))
        .collect();
    BoltType::Map(BoltMap { value })
}

fn entity_query(upsert: &EntityUpsert) -> Query {
    let statement = format!(
        "MERGE (n:{label} {{id: $id}})
         WITH n, n.created_at AS created, n.last_updated AS previous, datetime() AS now
         SET n = $props
         SET n.id = $id,
             n.created_at = coalesce(created, toString(now)),
             n.last_updated = CASE
                 WHEN previous IS NOT NULL AND datetime(previous) > now THEN previous
                 ELSE toString(now)
             END",
        label = upsert.kind.label()
    );
    query(&statement)
        .param("id", upsert.id.clone())
        .param("props", bolt_map(&upsert.properties))
}

fn relationship_query(rel: &RelationshipUpsert) -> Query {
    let statement = format!(
        "MATCH (a:{from} {{id: $from_id}}), (b:{to} {{id: $to_id}})
         MERGE (a)-[:{rel}]->(b)",
        from = rel.from.kind.label(),
        to = rel.to.kind.label(),
        rel = rel.kind.as_str()
    );
    query(&statement)
        .param("from_id", rel.from.id.clone())
        .param("to_id", rel.to.id.clone())
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    async fn ping(&self) -> Result<()> {
        self.graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<WriteSummary> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| GraphError::Transaction(format!("begin: {}", e)))?;

        let entities: Vec<Query> = batch.entities.iter().map(entity_query).collect();
        if let Err(e) = txn.run_queries(entities).await {
            if let Err(rollback) = txn.rollback().await {
                warn!(error = %rollback, "Rollback after entity phase failure failed");
            }
            return Err(GraphError::Transaction(format!("entity phase: {}", e)));
        }

        let relationships: Vec<Query> = batch.relationships.iter().map(relationship_query).collect();
        if let Err(e) = txn.run_queries(relationships).await {
            if let Err(rollback) = txn.rollback().await {
                warn!(error = %rollback, "Rollback after relationship phase failure failed");
            }
            return Err(GraphError::Transaction(format!("relationship phase: {}", e)));
        }

        txn.commit()
            .await
            .map_err(|e| GraphError::Transaction(format!("commit: {}", e)))?;

        Ok(WriteSummary {
            entities_written: batch.entities.len(),
            relationships_written: batch.relationships.len(),
        })
    }

    async fn all_nodes(&self) -> Result<Vec<StoredNode>> {
        self.fetch_nodes(query(
            "MATCH (n) RETURN labels(n) AS labels, properties(n) AS props",
        ))
        .await
    }

    async fn all_edges(&self) -> Result<Vec<StoredEdge>> {
        let rows = self
            .fetch(query(
                "MATCH (a)-[r]->(b)
                 WHERE a.id IS NOT NULL AND b.id IS NOT NULL
                 RETURN a.id AS source, b.id AS target, type(r) AS rel_type",
            ))
            .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredEdge {
                    source: decode(row, "source")?,
                    target: decode(row, "target")?,
                    rel_type: decode(row, "rel_type")?,
                })
            })
            .collect()
    }

    async fn find_node(&self, id: &str) -> Result<Option<StoredNode>> {
        let nodes = self
            .fetch_nodes(
                query("MATCH (n {id: $id}) RETURN labels(n) AS labels, properties(n) AS props LIMIT 1")
                    .param("id", id.to_string()),
            )
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn nodes_with_label(&self, label: &str) -> Result<Vec<StoredNode>> {
        validate_field(label)?;
        let statement = format!(
            "MATCH (n:{}) RETURN labels(n) AS labels, properties(n) AS props",
            label
        );
        self.fetch_nodes(query(&statement)).await
    }

    async fn count_by_label(&self) -> Result<Vec<(String, i64)>> {
        let rows = self
            .fetch(query(
                "MATCH (n) WHERE size(labels(n)) > 0
                 RETURN head(labels(n)) AS label, count(*) AS count
                 ORDER BY label",
            ))
            .await?;

        rows.iter()
            .map(|row| Ok((decode(row, "label")?, decode(row, "count")?)))
            .collect()
    }

    async fn nodes_above(
        &self,
        label: &str,
        field: &str,
        threshold: f64,
    ) -> Result<Vec<StoredNode>> {
        validate_field(label)?;
        validate_field(field)?;
        let statement = format!(
            "MATCH (n:{label}) WHERE n.{field} > $threshold
             RETURN labels(n) AS labels, properties(n) AS props
             ORDER BY n.{field} DESC",
            label = label,
            field = field
        );
        self.fetch_nodes(query(&statement).param("threshold", threshold))
            .await
    }

    async fn cluster_summaries(&self, cluster_id: Option<&str>) -> Result<Vec<ClusterSummary>> {
        let rows = self
            .fetch(
                query(
                    "MATCH (c:Cluster)
                     WHERE $cluster_id = '' OR c.id = $cluster_id
                     OPTIONAL MATCH (c)-[:CONTAINS]->(n:Node)
                     WITH c, count(DISTINCT n) AS nodes
                     OPTIONAL MATCH (c)-[:CONTAINS]->(p:Pod)
                     WITH c, nodes, count(DISTINCT p) AS pods
                     OPTIONAL MATCH (c)-[:CONTAINS]->(s:Service)
                     WITH c, nodes, pods, count(DISTINCT s) AS services
                     OPTIONAL MATCH (m:ClusterMetrics {cluster_id: c.id})
                     WITH c, nodes, pods, services, head(collect(properties(m))) AS metrics
                     RETURN c.id AS cluster_id,
                            coalesce(c.context, '') AS context,
                            coalesce(c.vm_id, '') AS vm_id,
                            nodes, pods, services, metrics
                     ORDER BY cluster_id",
                )
                .param("cluster_id", cluster_id.unwrap_or_default().to_string()),
            )
            .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let metrics: Option<Properties> = decode(row, "metrics")?;
            let metrics = metrics
                .map(|m| serde_json::from_value::<ClusterMetricsEntity>(Value::Object(m)))
                .transpose()?;

            summaries.push(ClusterSummary {
                cluster_id: decode(row, "cluster_id")?,
                context: decode(row, "context")?,
                vm_id: decode(row, "vm_id")?,
                node_count: decode(row, "nodes")?,
                pod_count: decode(row, "pods")?,
                service_count: decode(row, "services")?,
                metrics,
            });
        }
        Ok(summaries)
    }

    async fn sweep(&self, cutoff: DateTime<Utc>, kinds: &[EntityKind]) -> Result<SweepReport> {
        let labels: Vec<String> = sweep_kinds(kinds)
            .iter()
            .map(|k| k.label().to_string())
            .collect();

        // One statement, so detach and delete commit together
        let rows = self
            .fetch(
                query(
                    "MATCH (n)
                     WHERE any(label IN labels(n) WHERE label IN $labels)
                       AND n.last_updated IS NOT NULL
                       AND datetime(n.last_updated) < datetime($cutoff)
                     OPTIONAL MATCH (n)-[r]-()
                     WITH collect(DISTINCT n) AS doomed, collect(DISTINCT r) AS rels
                     FOREACH (rel IN rels | DELETE rel)
                     FOREACH (node IN doomed | DELETE node)
                     RETURN size(doomed) AS nodes, size(rels) AS relationships",
                )
                .param("labels", labels)
                .param("cutoff", iso_timestamp(cutoff)),
            )
            .await
            .map_err(|e| GraphError::Transaction(format!("sweep: {}", e)))?;

        let Some(row) = rows.first() else {
            return Ok(SweepReport::default());
        };
        let nodes: i64 = decode(row, "nodes")?;
        let relationships: i64 = decode(row, "relationships")?;

        Ok(SweepReport {
            nodes_deleted: nodes.max(0) as u64,
            relationships_deleted: relationships.max(0) as u64,
        })
    }

    async fn raw_query(&self, statement: &str) -> Result<Vec<Value>> {
        let rows = self.fetch(query(statement)).await?;
        rows.iter()
            .map(|row| {
                row.to_strict::<BoltMap>()
                    .map(|columns| bolt_object(&columns))
                    .map_err(|e| GraphError::Query(format!("row conversion: {}", e)))
            })
            .collect()
    }
}

fn bolt_object(map: &BoltMap) -> Value {
    Value::Object(
        map.value
            .iter()
            .map(|(key, value)| (key.value.clone(), bolt_json(value)))
            .collect(),
    )
}

/// JSON rendering of a returned value. Temporal values become ISO-8601
/// strings; values chrono cannot represent become null.
fn bolt_json(value: &BoltType) -> Value {
    match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => serde_json::Number::from_f64(f.value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        BoltType::String(s) => Value::String(s.value.clone()),
        BoltType::Bytes(b) => Value::from(b.value.to_vec()),
        BoltType::List(list) => Value::Array(list.value.iter().map(bolt_json).collect()),
        BoltType::Map(map) => bolt_object(map),
        BoltType::Node(node) => bolt_object(&node.properties),
        BoltType::Relation(rel) => bolt_object(&rel.properties),
        BoltType::UnboundedRelation(rel) => bolt_object(&rel.properties),
        BoltType::Path(path) => serde_json::json!({
            "nodes": path.nodes.value.iter().map(bolt_json).collect::<Vec<_>>(),
            "relationships": path.rels.value.iter().map(bolt_json).collect::<Vec<_>>(),
        }),
        BoltType::Point2D(p) => serde_json::json!({
            "srid": p.sr_id.value, "x": p.x.value, "y": p.y.value,
        }),
        BoltType::Point3D(p) => serde_json::json!({
            "srid": p.sr_id.value, "x": p.x.value, "y": p.y.value, "z": p.z.value,
        }),
        BoltType::Duration(d) => Value::String(iso_duration(std::time::Duration::from(d.clone()))),
        BoltType::Date(d) => temporal(NaiveDate::try_from(d).map(|d| d.format("%Y-%m-%d").to_string())),
        BoltType::Time(t) => {
            let (time, offset) = <(NaiveTime, FixedOffset)>::from(t);
            Value::String(format!("{}{}", time.format("%H:%M:%S%.f"), offset))
        }
        BoltType::LocalTime(t) => Value::String(NaiveTime::from(t).format("%H:%M:%S%.f").to_string()),
        BoltType::DateTime(dt) => temporal(DateTime::<FixedOffset>::try_from(dt).map(|dt| dt.to_rfc3339())),
        BoltType::LocalDateTime(dt) => temporal(
            NaiveDateTime::try_from(dt).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        ),
        BoltType::DateTimeZoneId(dt) => {
            temporal(DateTime::<FixedOffset>::try_from(dt).map(|dt| dt.to_rfc3339()))
        }
    }
}

fn temporal<E: std::fmt::Display>(converted: std::result::Result<String, E>) -> Value {
    match converted {
        Ok(text) => Value::String(text),
        Err(e) => {
            warn!(error = %e, "Temporal value out of range");
            Value::Null
        }
    }
}

fn iso_duration(duration: std::time::Duration) -> String {
    match duration.subsec_nanos() {
        0 => format!("PT{}S", duration.as_secs()),
        nanos => format!("PT{}.{:09}S", duration.as_secs(), nanos)
            .trim_end_matches('0')
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bolt_value_conversion() {
        assert!(matches!(bolt_value(&json!(null)), BoltType::Null(_)));
        assert!(matches!(bolt_value(&json!(3)), BoltType::Integer(_)));
        assert!(matches!(bolt_value(&json!(0.5)), BoltType::Float(_)));
        assert!(matches!(bolt_value(&json!("x")), BoltType::String(_)));
        assert!(matches!(bolt_value(&json!(["a", "b"])), BoltType::List(_)));
        assert!(matches!(bolt_value(&json!({"k": 1})), BoltType::String(_)));
    }

    #[test]
    fn test_bolt_map_keeps_every_property() {
        let mut props = Properties::new();
        props.insert("name".into(), json!("web-0"));
        props.insert("cpu_usage".into(), json!(0.25));

        match bolt_map(&props) {
            BoltType::Map(map) => assert_eq!(map.value.len(), 2),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_temporal_values_become_iso_strings() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();

        let zoned = BoltType::from(at.and_local_timezone(offset).unwrap());
        assert_eq!(bolt_json(&zoned), json!("2024-05-01T12:30:00+02:00"));

        assert_eq!(bolt_json(&BoltType::from(at)), json!("2024-05-01T12:30:00"));
        assert_eq!(bolt_json(&BoltType::from(at.date())), json!("2024-05-01"));
        assert_eq!(bolt_json(&BoltType::from(at.time())), json!("12:30:00"));
        assert_eq!(
            bolt_json(&BoltType::from(std::time::Duration::from_millis(1500))),
            json!("PT1.5S")
        );
    }

    #[test]
    fn test_row_columns_keep_nested_temporals() {
        let mut columns = BoltMap::new();
        columns.put(BoltString::from("n"), BoltType::from(3_i64));
        columns.put(
            BoltString::from("seen"),
            BoltType::from(vec![NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()]),
        );

        assert_eq!(bolt_object(&columns), json!({"n": 3, "seen": ["2024-01-02"]}));
    }
}
