//! Kubegraph - cluster inventory graph monitor
//!
//! Periodically snapshots a Kubernetes cluster into a property graph and
//! serves the graph over HTTP.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use graph_lib::{
    health::{Component, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    store::{GraphStore, MemoryGraphStore, Neo4jGraphStore},
    EntityKind, GraphReadback, GraphUpsertEngine, InventorySource, KubeInventorySource,
    MonitorLoop, SnapshotAssembler,
};
use kubegraph_monitor::{
    api,
    config::{AppConfig, StoreBackend},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "kubegraph")]
#[command(author, version, about = "Cluster inventory graph monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring loop and the HTTP API (default)
    Run,

    /// Delete entities not refreshed within the retention window
    Sweep {
        /// Age in days; defaults to KUBEGRAPH_RETENTION_DAYS
        #[arg(long)]
        days: Option<i64>,

        /// Restrict to these entity kinds (repeatable); all kinds when omitted
        #[arg(long = "kind", value_parser = parse_kind)]
        kinds: Vec<EntityKind>,
    },
}

fn parse_kind(label: &str) -> std::result::Result<EntityKind, String> {
    EntityKind::from_label(label).ok_or_else(|| {
        let known: Vec<&str> = EntityKind::ALL.iter().map(|k| k.label()).collect();
        format!("unknown kind '{}', expected one of {}", label, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Sweep { days, kinds } => {
            sweep(&config, days.unwrap_or(config.retention_days), &kinds).await
        }
    }
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn GraphStore>> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(MemoryGraphStore::new())),
        StoreBackend::Neo4j => {
            let store = Neo4jGraphStore::connect(&config.neo4j())
                .await
                .map_err(|e| {
                    error!(error = %e, uri = %config.neo4j_uri, "Graph store connection failed");
                    e
                })
                .context(
                    "Cannot reach the graph store; check KUBEGRAPH_NEO4J_URI, \
                     KUBEGRAPH_NEO4J_USER and KUBEGRAPH_NEO4J_PASSWORD",
                )?;
            Ok(Arc::new(store))
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let host = graph_lib::host::detect();
    info!(hostname = %host.hostname, "Starting kubegraph monitor");

    let health_registry = HealthRegistry::new();

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(host.hostname.clone());

    let store = connect_store(&config).await?;
    health_registry.mark_store_connected().await;

    let source = KubeInventorySource::connect(config.context.as_deref())
        .await
        .context("Failed to load cluster configuration")?;
    logger.log_startup(MONITOR_VERSION, source.context_name(), store.name());

    let readback =
        Arc::new(GraphReadback::new(store.clone()).with_raw_query(config.enable_raw_query));
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        readback,
    ));
    let api_port = config.api_port;
    let api_health = health_registry.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server stopped");
            api_health
                .set_unhealthy(Component::Api, e.to_string())
                .await;
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, finishing current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    let monitor = MonitorLoop::new(
        Arc::new(source),
        SnapshotAssembler::new(host, Utc::now()),
        GraphUpsertEngine::new(store),
        health_registry,
        config.monitor(),
    );
    let report = monitor.run(shutdown_rx).await;

    let limit_reached = config.iterations > 0 && report.cycles >= config.iterations;
    logger.log_shutdown(if limit_reached {
        "iteration limit reached"
    } else {
        "SIGINT received"
    });
    info!(
        cycles = report.cycles,
        stored = report.stored,
        skipped = report.skipped,
        "Shutting down"
    );

    Ok(())
}

async fn sweep(config: &AppConfig, days: i64, kinds: &[EntityKind]) -> Result<()> {
    let store = connect_store(config).await?;
    let cutoff = Utc::now() - chrono::Duration::days(days);
    info!(cutoff = %cutoff.to_rfc3339(), kinds = ?kinds, "Starting retention sweep");

    let report = store
        .sweep(cutoff, kinds)
        .await
        .context("Retention sweep failed")?;

    StructuredLogger::new(graph_lib::host::detect().hostname).log_sweep(
        days,
        report.nodes_deleted,
        report.relationships_deleted,
    );
    Ok(())
}
