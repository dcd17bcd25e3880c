//! Observability infrastructure for the graph monitor
//!
//! Provides:
//! - Prometheus metrics (collection and store latency, cycle outcomes, write sizes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    collection_latency_seconds: Histogram,
    store_latency_seconds: Histogram,
    cycles_total: IntCounter,
    cycles_skipped_total: IntCounter,
    transaction_failures_total: IntCounter,
    entities_written: IntGauge,
    relationships_written: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "kubegraph_collection_latency_seconds",
                "Time spent collecting inventory from the cluster",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            store_latency_seconds: register_histogram!(
                "kubegraph_store_latency_seconds",
                "Time spent writing one snapshot to the graph store",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register store_latency_seconds"),

            cycles_total: register_int_counter!(
                "kubegraph_cycles_total",
                "Monitoring cycles started"
            )
            .expect("Failed to register cycles_total"),

            cycles_skipped_total: register_int_counter!(
                "kubegraph_cycles_skipped_total",
                "Monitoring cycles skipped after a collection or store failure"
            )
            .expect("Failed to register cycles_skipped_total"),

            transaction_failures_total: register_int_counter!(
                "kubegraph_transaction_failures_total",
                "Snapshot transactions rolled back"
            )
            .expect("Failed to register transaction_failures_total"),

            entities_written: register_int_gauge!(
                "kubegraph_entities_written",
                "Entities upserted by the last stored snapshot"
            )
            .expect("Failed to register entities_written"),

            relationships_written: register_int_gauge!(
                "kubegraph_relationships_written",
                "Relationships upserted by the last stored snapshot"
            )
            .expect("Failed to register relationships_written"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_store_latency(&self, duration_secs: f64) {
        self.inner().store_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles(&self) {
        self.inner().cycles_total.inc();
    }

    pub fn inc_cycles_skipped(&self) {
        self.inner().cycles_skipped_total.inc();
    }

    pub fn inc_transaction_failures(&self) {
        self.inner().transaction_failures_total.inc();
    }

    /// Record the size of the last committed write
    pub fn set_last_write(&self, entities: i64, relationships: i64) {
        self.inner().entities_written.set(entities);
        self.inner().relationships_written.set(relationships);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Structured logger for monitor lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn log_startup(&self, version: &str, context: &str, store: &str) {
        info!(
            event = "monitor_started",
            host = %self.host,
            monitor_version = %version,
            context = %context,
            store = %store,
            "Graph monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            host = %self.host,
            reason = %reason,
            "Graph monitor shutting down"
        );
    }

    pub fn log_cycle_stored(&self, cycle: u64, entities: usize, elapsed_ms: u64) {
        info!(
            event = "cycle_stored",
            host = %self.host,
            cycle = cycle,
            entities = entities,
            elapsed_ms = elapsed_ms,
            "Monitoring cycle stored"
        );
    }

    pub fn log_cycle_skipped(&self, cycle: u64, reason: &str) {
        warn!(
            event = "cycle_skipped",
            host = %self.host,
            cycle = cycle,
            reason = %reason,
            "Monitoring cycle skipped"
        );
    }

    pub fn log_sweep(&self, retention_days: i64, nodes_deleted: u64, relationships_deleted: u64) {
        info!(
            event = "retention_sweep",
            host = %self.host,
            retention_days = retention_days,
            nodes_deleted = nodes_deleted,
            relationships_deleted = relationships_deleted,
            "Retention sweep finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        let metrics = MonitorMetrics::new();

        metrics.observe_collection_latency(0.2);
        metrics.observe_store_latency(0.05);
        metrics.inc_cycles();
        metrics.inc_cycles_skipped();
        metrics.inc_transaction_failures();
        metrics.set_last_write(12, 11);

        let text = metrics.render();
        assert!(text.contains("kubegraph_cycles_total"));
        assert!(text.contains("kubegraph_entities_written"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("host-a");
        assert_eq!(logger.host, "host-a");
    }
}
