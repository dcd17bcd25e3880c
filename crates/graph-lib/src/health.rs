//! Liveness and readiness state for the graph monitor
//!
//! The monitor loop reports collector and store outcomes after every cycle;
//! the API reports its own listener. Readiness additionally waits for the
//! first successful store connection.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the monitor whose state is reported on `/healthz`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Inventory and usage collection
    Collector,
    /// Graph store writes and pings
    Store,
    /// HTTP listener
    Api,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Collector, Component::Store, Component::Api];
}

/// Ordered from best to worst so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// A cycle was skipped but the monitor keeps running
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    store_connected: bool,
}

/// Shared handle; clones observe the same state
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; the store is not yet connected
    pub fn new() -> Self {
        let components = Component::ALL
            .iter()
            .map(|c| (*c, checked(ComponentStatus::Healthy, None)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(HealthState {
                components,
                store_connected: false,
            })),
        }
    }

    async fn report(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(component, checked(status, message));
    }

    pub async fn set_healthy(&self, component: Component) {
        self.report(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.report(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.report(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn mark_store_connected(&self) {
        self.state.write().await.store_connected = true;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: overall(&state.components),
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if !state.store_connected {
            Some("Graph store not yet connected")
        } else if overall(&state.components) == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

fn checked(status: ComponentStatus, message: Option<String>) -> ComponentHealth {
    ComponentHealth {
        status,
        message,
        last_check_timestamp: chrono::Utc::now().timestamp(),
    }
}

fn overall(components: &BTreeMap<Component, ComponentHealth>) -> ComponentStatus {
    components
        .values()
        .map(|health| health.status)
        .max()
        .unwrap_or(ComponentStatus::Healthy)
}
