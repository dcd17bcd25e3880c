//! High CPU listings

use anyhow::Result;
use clap::ValueEnum;
use tabled::Tabled;

use crate::client::{ApiClient, FilteredEntity};
use crate::output::{format_cores, print_heading, print_json, print_rows, OutputFormat};

/// Entity kind ranked by CPU usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CpuTarget {
    Nodes,
    Containers,
}

impl CpuTarget {
    fn path(&self) -> &'static str {
        match self {
            CpuTarget::Nodes => "api/nodes-high-cpu",
            CpuTarget::Containers => "api/containers-high-cpu",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            CpuTarget::Nodes => "Nodes by CPU Usage",
            CpuTarget::Containers => "Containers by CPU Usage",
        }
    }
}

#[derive(Tabled)]
struct CpuRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// List entities above `threshold` cores; the server default applies when unset
pub async fn show_high_cpu(
    client: &ApiClient,
    target: CpuTarget,
    threshold: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    let query: Vec<(&str, String)> = threshold
        .map(|t| vec![("threshold", t.to_string())])
        .unwrap_or_default();
    let entities: Vec<FilteredEntity> = client.get(target.path(), &query).await?;

    if format == OutputFormat::Json {
        return print_json(&entities);
    }

    print_heading(target.title());
    let rows: Vec<CpuRow> = entities
        .into_iter()
        .map(|e| CpuRow {
            name: e.name,
            cpu: format_cores(e.value),
            id: e.id,
        })
        .collect();
    print_rows(rows, "Nothing above the threshold");
    Ok(())
}
