//! Graph inspection commands

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::{ApiClient, CountsResponse, EntityDetail, GraphPayload, QueryResponse};
use crate::output::{format_value, print_heading, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Type")]
    node_type: String,
    #[tabled(rename = "Name")]
    label: String,
    #[tabled(rename = "ID")]
    id: String,
}

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Property")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Type")]
    entity_type: String,
    #[tabled(rename = "Count")]
    count: i64,
}

/// Show the graph, or one VM's part of it, with a per-relationship edge tally
pub async fn show_graph(
    client: &ApiClient,
    kind: Option<String>,
    vm: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let query: Vec<(&str, String)> = vm.map(|id| vec![("vm_id", id)]).unwrap_or_default();
    let mut graph: GraphPayload = client.get("api/graph", &query).await?;

    if let Some(kind) = &kind {
        graph.nodes.retain(|n| n.node_type.eq_ignore_ascii_case(kind));
    }

    if format == OutputFormat::Json {
        return print_json(&graph);
    }

    print_heading("Graph");
    let rows: Vec<NodeRow> = graph
        .nodes
        .iter()
        .map(|n| NodeRow {
            node_type: n.node_type.clone(),
            label: n.label.clone(),
            id: n.id.clone(),
        })
        .collect();
    print_rows(rows, "No entities stored yet");

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for edge in &graph.edges {
        *by_type.entry(edge.label.as_str()).or_default() += 1;
    }
    println!();
    println!("{} {}", "Relationships:".bold(), graph.edges.len());
    for (rel, count) in by_type {
        println!("  {:<20} {}", rel.cyan(), count);
    }

    Ok(())
}

/// Show one entity's properties
pub async fn show_node(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let detail: EntityDetail = client.get_item("api/node", id).await?;

    if format == OutputFormat::Json {
        return print_json(&detail);
    }

    print_heading(&format!("{} {}", detail.entity_type, detail.id));
    let rows: Vec<PropertyRow> = detail
        .properties
        .iter()
        .map(|(key, value)| PropertyRow {
            key: key.clone(),
            value: format_value(value),
        })
        .collect();
    print_rows(rows, "Entity has no properties");
    Ok(())
}

pub async fn show_counts(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let counts = client.get::<CountsResponse>("api/nodes", &[]).await?.summary;

    if format == OutputFormat::Json {
        return print_json(&counts);
    }

    print_heading("Entities by Type");
    let rows: Vec<CountRow> = counts
        .into_iter()
        .map(|c| CountRow {
            entity_type: c.entity_type,
            count: c.count,
        })
        .collect();
    print_rows(rows, "No entities stored yet");
    Ok(())
}

/// Run a read-only query; the monitor must have raw queries enabled
pub async fn run_query(client: &ApiClient, query: &str, format: OutputFormat) -> Result<()> {
    let rows = client
        .get::<QueryResponse>("api/query", &[("query", query.to_string())])
        .await?
        .result;

    if format == OutputFormat::Json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        crate::output::print_warning("Query returned no rows");
        return Ok(());
    }
    for (i, row) in rows.iter().enumerate() {
        println!("{} {}", format!("[{}]", i + 1).dimmed(), row);
    }
    println!();
    println!("{} rows", rows.len());
    Ok(())
}
