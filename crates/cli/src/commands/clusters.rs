//! Cluster, VM, usage and health commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ApiHealth, ClusterSummary, ResourceUsage, VmSummary};
use crate::output::{
    color_status, format_cores, format_mib, format_timestamp, print_error, print_heading,
    print_json, print_rows, print_success, OutputFormat,
};

#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "Context")]
    context: String,
    #[tabled(rename = "Nodes")]
    nodes: String,
    #[tabled(rename = "Pods")]
    pods: String,
    #[tabled(rename = "Services")]
    services: i64,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Cluster ID")]
    cluster_id: String,
}

#[derive(Tabled)]
struct VmRow {
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Captured")]
    captured_at: String,
}

#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Cluster ID")]
    cluster_id: String,
    #[tabled(rename = "Node Samples")]
    node_samples: usize,
    #[tabled(rename = "Pod Samples")]
    pod_samples: usize,
    #[tabled(rename = "Captured")]
    captured_at: String,
}

fn cluster_row(summary: ClusterSummary) -> ClusterRow {
    let metrics = summary.metrics.unwrap_or_default();
    ClusterRow {
        context: summary.context,
        nodes: format!("{}/{} ready", metrics.ready_nodes, summary.node_count),
        pods: format!("{} ({} running)", summary.pod_count, metrics.running_pods),
        services: summary.service_count,
        cpu: format_cores(metrics.total_cpu_usage),
        memory: format_mib(metrics.total_memory_usage),
        cluster_id: summary.cluster_id,
    }
}

pub async fn show_clusters(
    client: &ApiClient,
    cluster_id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let query: Vec<(&str, String)> = cluster_id
        .map(|id| vec![("cluster_id", id)])
        .unwrap_or_default();
    let clusters: Vec<ClusterSummary> = client.get("api/cluster-summary", &query).await?;

    if format == OutputFormat::Json {
        return print_json(&clusters);
    }

    print_heading("Clusters");
    print_rows(
        clusters.into_iter().map(cluster_row).collect(),
        "No clusters stored yet",
    );
    Ok(())
}

pub async fn show_vms(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let vms: Vec<VmSummary> = client.get("api/vm-summary", &[]).await?;

    if format == OutputFormat::Json {
        return print_json(&vms);
    }

    print_heading("Monitoring Hosts");
    let rows: Vec<VmRow> = vms
        .into_iter()
        .map(|vm| VmRow {
            hostname: vm.hostname,
            ip: vm.ip_addresses.join(", "),
            platform: vm.platform,
            captured_at: format_timestamp(&vm.captured_at),
        })
        .collect();
    print_rows(rows, "No monitoring hosts recorded");
    Ok(())
}

/// Number of `items` in a stored metrics document
fn sample_count(document: &str) -> usize {
    serde_json::from_str::<serde_json::Value>(document)
        .ok()
        .and_then(|v| v.get("items").and_then(|i| i.as_array()).map(Vec::len))
        .unwrap_or(0)
}

pub async fn show_usage(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let usage: Vec<ResourceUsage> = client.get("api/resource-usage", &[]).await?;

    if format == OutputFormat::Json {
        return print_json(&usage);
    }

    print_heading("Resource Usage Samples");
    let rows: Vec<UsageRow> = usage
        .into_iter()
        .map(|u| UsageRow {
            node_samples: sample_count(&u.node_metrics),
            pod_samples: sample_count(&u.pod_metrics),
            captured_at: format_timestamp(&u.captured_at),
            cluster_id: u.cluster_id,
        })
        .collect();
    print_rows(rows, "No usage recorded; is metrics-server installed?");
    Ok(())
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (status, health): (_, ApiHealth) = client.probe("api/health").await?;

    if format == OutputFormat::Json {
        return print_json(&health);
    }

    println!(
        "{} {}  store: {}",
        "API:".bold(),
        color_status(&health.status),
        health.store.cyan()
    );
    if status.is_success() {
        print_success("Graph store reachable");
    } else {
        print_error(health.error.as_deref().unwrap_or("Graph store unreachable"));
        anyhow::bail!("read API unhealthy ({})", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClusterMetrics;

    #[test]
    fn test_cluster_row_without_metrics() {
        let row = cluster_row(ClusterSummary {
            cluster_id: "idle:vm".into(),
            context: "idle".into(),
            vm_id: "vm".into(),
            node_count: 0,
            pod_count: 0,
            service_count: 0,
            metrics: None,
        });
        assert_eq!(row.nodes, "0/0 ready");
        assert_eq!(row.cpu, "0m");
    }

    #[test]
    fn test_cluster_row_with_metrics() {
        let row = cluster_row(ClusterSummary {
            cluster_id: "c".into(),
            context: "kind-dev".into(),
            vm_id: "vm".into(),
            node_count: 2,
            pod_count: 5,
            service_count: 1,
            metrics: Some(ClusterMetrics {
                ready_nodes: 1,
                running_pods: 4,
                total_cpu_usage: 1.2,
                total_memory_usage: 2048.0,
                ..Default::default()
            }),
        });
        assert_eq!(row.nodes, "1/2 ready");
        assert_eq!(row.pods, "5 (4 running)");
        assert_eq!(row.memory, "2.00Gi");
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(r#"{"items":[{},{}]}"#), 2);
        assert_eq!(sample_count("not json"), 0);
    }
}
