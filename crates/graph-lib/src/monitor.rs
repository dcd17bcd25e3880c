//! Monitoring loop
//!
//! One cycle collects the inventory, assembles a snapshot and stores it.
//! Cycles run back to back with a sleep in between; a failed collection or a
//! rolled-back write skips the cycle without retrying it.

use crate::health::{Component, HealthRegistry};
use crate::inventory::{self, InventorySource};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::snapshot::SnapshotAssembler;
use crate::upsert::GraphUpsertEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for the monitoring loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between cycles (default: 10 seconds, minimum 1 second)
    pub interval: Duration,
    /// Cycles to run; 0 runs until shutdown
    pub iterations: u64,
    /// Bound on each inventory call
    pub collection_timeout: Duration,
    /// Namespace filter for pods, services and usage
    pub namespace: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            iterations: 0,
            collection_timeout: Duration::from_secs(30),
            namespace: None,
        }
    }
}

/// Outcome counts of a finished loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub cycles: u64,
    pub stored: u64,
    pub skipped: u64,
}

pub struct MonitorLoop {
    source: Arc<dyn InventorySource>,
    assembler: SnapshotAssembler,
    engine: GraphUpsertEngine,
    health: HealthRegistry,
    config: MonitorConfig,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MonitorLoop {
    pub fn new(
        source: Arc<dyn InventorySource>,
        assembler: SnapshotAssembler,
        engine: GraphUpsertEngine,
        health: HealthRegistry,
        config: MonitorConfig,
    ) -> Self {
        let logger = StructuredLogger::new(assembler.vm_id().hostname());
        Self {
            source,
            assembler,
            engine,
            health,
            config,
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    fn interval(&self) -> Duration {
        self.config.interval.max(Duration::from_secs(1))
    }

    /// Run cycles until `iterations` is reached or `shutdown` flips to true.
    ///
    /// Shutdown is observed between cycles only; a cycle in progress always
    /// completes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> LoopReport {
        info!(
            context = self.source.context_name(),
            interval_secs = self.interval().as_secs(),
            iterations = self.config.iterations,
            "Starting monitoring loop"
        );

        let mut report = LoopReport::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            report.cycles += 1;
            if self.run_cycle(report.cycles).await {
                report.stored += 1;
            } else {
                report.skipped += 1;
            }

            if self.config.iterations > 0 && report.cycles >= self.config.iterations {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval()) => {}
                changed = shutdown.changed() => {
                    // Sender dropped counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            cycles = report.cycles,
            stored = report.stored,
            skipped = report.skipped,
            "Monitoring loop stopped"
        );
        report
    }

    /// One collect, assemble, store pass. Returns whether the snapshot was stored.
    pub async fn run_cycle(&self, cycle: u64) -> bool {
        self.metrics.inc_cycles();
        let start = Instant::now();

        let collected = inventory::collect(
            self.source.as_ref(),
            self.config.namespace.as_deref(),
            self.config.collection_timeout,
        )
        .await;
        self.metrics
            .observe_collection_latency(start.elapsed().as_secs_f64());

        let (inventory, usage) = match collected {
            Ok(collected) => collected,
            Err(e) => {
                self.metrics.inc_cycles_skipped();
                self.health
                    .set_degraded(Component::Collector, e.to_string())
                    .await;
                self.logger.log_cycle_skipped(cycle, &e.to_string());
                return false;
            }
        };
        self.health.set_healthy(Component::Collector).await;

        let snapshot = self.assembler.assemble(&inventory, usage.as_ref());
        debug!(
            cycle = cycle,
            entities = snapshot.entity_count(),
            "Snapshot assembled"
        );

        if !self.engine.store_snapshot(&snapshot).await {
            self.metrics.inc_cycles_skipped();
            self.health
                .set_degraded(Component::Store, "last snapshot write rolled back")
                .await;
            self.logger
                .log_cycle_skipped(cycle, "snapshot transaction rolled back");
            return false;
        }
        self.health.set_healthy(Component::Store).await;

        self.logger.log_cycle_stored(
            cycle,
            snapshot.entity_count(),
            start.elapsed().as_millis() as u64,
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::inventory::testing::FixtureSource;
    use crate::snapshot::fixtures;
    use crate::store::{GraphStore, MemoryGraphStore};
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn monitor(
        source: Arc<FixtureSource>,
        store: Arc<MemoryGraphStore>,
        health: HealthRegistry,
        iterations: u64,
    ) -> MonitorLoop {
        MonitorLoop::new(
            source,
            SnapshotAssembler::new(fixtures::host(), Utc::now()),
            GraphUpsertEngine::new(store),
            health,
            MonitorConfig {
                interval: Duration::from_millis(10),
                iterations,
                collection_timeout: Duration::from_secs(1),
                namespace: None,
            },
        )
    }

    #[test]
    fn test_monitor_config_default() {
        let config = MonitorConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.iterations, 0);
        assert_eq!(config.collection_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_interval_has_one_second_floor() {
        let source = Arc::new(FixtureSource::default());
        let store = Arc::new(MemoryGraphStore::new());
        let monitor = monitor(source, store, HealthRegistry::new(), 1);
        assert_eq!(monitor.interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_single_iteration_stores_snapshot() {
        let source = Arc::new(FixtureSource::default());
        let store = Arc::new(MemoryGraphStore::new());
        let (_tx, rx) = watch::channel(false);

        let report = monitor(source, store.clone(), HealthRegistry::new(), 1)
            .run(rx)
            .await;

        assert_eq!(
            report,
            LoopReport {
                cycles: 1,
                stored: 1,
                skipped: 0
            }
        );
        assert!(store.node_count().await > 0);
    }

    #[tokio::test]
    async fn test_repeated_cycles_are_idempotent() {
        let source = Arc::new(FixtureSource::default());
        let store = Arc::new(MemoryGraphStore::new());
        let health = HealthRegistry::new();
        let monitor = monitor(source, store.clone(), health, 0);

        assert!(monitor.run_cycle(1).await);
        let nodes = store.node_count().await;
        let edges = store.edge_count().await;

        assert!(monitor.run_cycle(2).await);
        assert_eq!(store.node_count().await, nodes);
        assert_eq!(store.edge_count().await, edges);
    }

    #[tokio::test]
    async fn test_collection_failure_skips_cycle() {
        let source = Arc::new(FixtureSource::default());
        source.fail_nodes.store(true, Ordering::SeqCst);
        let store = Arc::new(MemoryGraphStore::new());
        let health = HealthRegistry::new();
        let (_tx, rx) = watch::channel(false);

        let report = monitor(source.clone(), store.clone(), health.clone(), 2)
            .run(rx)
            .await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.stored, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(store.all_nodes().await.unwrap().is_empty());

        let status = health.health().await;
        assert_eq!(
            status.components[&Component::Collector].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_rolled_back_write_skips_cycle() {
        let source = Arc::new(FixtureSource::default());
        let store = Arc::new(MemoryGraphStore::new());
        store.fail_relationship_phase(true);
        let health = HealthRegistry::new();

        let monitor = monitor(source, store.clone(), health.clone(), 1);
        assert!(!monitor.run_cycle(1).await);
        assert_eq!(store.node_count().await, 0);

        let status = health.health().await;
        assert_eq!(
            status.components[&Component::Store].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_first_cycle() {
        let source = Arc::new(FixtureSource::default());
        let store = Arc::new(MemoryGraphStore::new());
        let (_tx, rx) = watch::channel(true);

        let report = monitor(source.clone(), store, HealthRegistry::new(), 0)
            .run(rx)
            .await;

        assert_eq!(report, LoopReport::default());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let source = Arc::new(FixtureSource::default());
        let store = Arc::new(MemoryGraphStore::new());
        let (tx, rx) = watch::channel(false);

        let mut config_monitor = monitor(source, store, HealthRegistry::new(), 0);
        config_monitor.config.interval = Duration::from_secs(60);

        let handle = tokio::spawn(config_monitor.run(rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(report.cycles, 1);
        assert_eq!(report.stored, 1);
    }
}
