//! kgctl - query the kubegraph read API
//!
//! Lists the stored inventory graph, cluster summaries and CPU hot spots
//! from a running kubegraph monitor.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{clusters, cpu, graph};

/// kubegraph CLI
#[derive(Parser)]
#[command(name = "kgctl")]
#[command(author, version, about = "CLI for the kubegraph inventory graph", long_about = None)]
pub struct Cli {
    /// Monitor API URL (can also be set via KUBEGRAPH_API_URL env var)
    #[arg(long, env = "KUBEGRAPH_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every entity in the graph
    Graph {
        /// Only show entities of this type (e.g. Pod, Node)
        #[arg(long, short)]
        kind: Option<String>,

        /// Only show what this VM hosts
        #[arg(long)]
        vm: Option<String>,
    },

    /// Show one entity's properties
    Node {
        /// Entity identifier
        id: String,
    },

    /// Count entities by type
    Counts,

    /// List nodes or containers above a CPU threshold
    HighCpu {
        #[arg(value_enum)]
        target: cpu::CpuTarget,

        /// Threshold in cores (server default when omitted)
        #[arg(long, short)]
        threshold: Option<f64>,
    },

    /// Summarize monitored clusters
    Clusters {
        /// Restrict to one cluster identifier
        #[arg(long)]
        cluster_id: Option<String>,
    },

    /// List monitoring hosts, most recent first
    Vms,

    /// Show stored resource usage samples
    Usage,

    /// Run a read-only graph query
    Query {
        /// Query text
        query: String,
    },

    /// Check the read API and its graph store
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Graph { kind, vm } => graph::show_graph(&client, kind, vm, cli.format).await?,
        Commands::Node { id } => graph::show_node(&client, &id, cli.format).await?,
        Commands::Counts => graph::show_counts(&client, cli.format).await?,
        Commands::HighCpu { target, threshold } => {
            cpu::show_high_cpu(&client, target, threshold, cli.format).await?
        }
        Commands::Clusters { cluster_id } => {
            clusters::show_clusters(&client, cluster_id, cli.format).await?
        }
        Commands::Vms => clusters::show_vms(&client, cli.format).await?,
        Commands::Usage => clusters::show_usage(&client, cli.format).await?,
        Commands::Query { query } => graph::run_query(&client, &query, cli.format).await?,
        Commands::Health => clusters::show_health(&client, cli.format).await?,
    }

    Ok(())
}
