//! Cluster inventory source
//!
//! The monitor reads inventory through [`InventorySource`]. Every call is
//! bounded by a timeout; a timeout or error fails only the current cycle.

mod kubernetes;

pub use self::kubernetes::KubeInventorySource;

use crate::error::{GraphError, Result};
use crate::models::{
    ClusterInfoRecord, Inventory, NodeRecord, PodRecord, ServiceRecord, UsageReport,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Read access to a cluster's inventory under one context
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Context the source queries
    fn context_name(&self) -> &str;

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodRecord>>;

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<ServiceRecord>>;

    async fn cluster_info(&self) -> Result<ClusterInfoRecord>;

    /// Usage samples from the metrics source; `None` when none is installed
    async fn resource_usage(&self, namespace: Option<&str>) -> Result<Option<UsageReport>>;

    async fn available_contexts(&self) -> Result<Vec<String>>;
}

async fn bounded<T, F>(call: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(GraphError::Collection(format!(
            "{} timed out after {}s",
            call,
            timeout.as_secs_f64()
        ))),
    }
}

/// Run one round of inventory calls, each bounded by `timeout`
pub async fn collect(
    source: &dyn InventorySource,
    namespace: Option<&str>,
    timeout: Duration,
) -> Result<(Inventory, Option<UsageReport>)> {
    let available_contexts = bounded("list contexts", timeout, source.available_contexts()).await?;
    let cluster_info = bounded("cluster info", timeout, source.cluster_info()).await?;
    let nodes = bounded("list nodes", timeout, source.list_nodes()).await?;
    let pods = bounded("list pods", timeout, source.list_pods(namespace)).await?;
    let services = bounded("list services", timeout, source.list_services(namespace)).await?;
    let usage = bounded("resource usage", timeout, source.resource_usage(namespace)).await?;

    debug!(
        context = source.context_name(),
        nodes = nodes.len(),
        pods = pods.len(),
        services = services.len(),
        usage = usage.is_some(),
        "Inventory collected"
    );

    Ok((
        Inventory {
            context: source.context_name().to_string(),
            available_contexts,
            cluster_info,
            nodes,
            pods,
            services,
        },
        usage,
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::snapshot::fixtures;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Source serving the snapshot fixtures, with switchable failure modes
    #[derive(Default)]
    pub struct FixtureSource {
        pub calls: AtomicUsize,
        pub fail_nodes: AtomicBool,
        pub slow_pods: AtomicBool,
        pub no_usage: AtomicBool,
    }

    #[async_trait]
    impl InventorySource for FixtureSource {
        fn context_name(&self) -> &str {
            "kind-dev"
        }

        async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_nodes.load(Ordering::SeqCst) {
                return Err(GraphError::Collection("connection refused".into()));
            }
            Ok(fixtures::inventory().nodes)
        }

        async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodRecord>> {
            if self.slow_pods.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(fixtures::inventory()
                .pods
                .into_iter()
                .filter(|p| namespace.map_or(true, |ns| p.namespace == ns))
                .collect())
        }

        async fn list_services(&self, _namespace: Option<&str>) -> Result<Vec<ServiceRecord>> {
            Ok(fixtures::inventory().services)
        }

        async fn cluster_info(&self) -> Result<ClusterInfoRecord> {
            Ok(fixtures::inventory().cluster_info)
        }

        async fn resource_usage(&self, _namespace: Option<&str>) -> Result<Option<UsageReport>> {
            if self.no_usage.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(fixtures::usage()))
        }

        async fn available_contexts(&self) -> Result<Vec<String>> {
            Ok(fixtures::inventory().available_contexts)
        }
    }
}
