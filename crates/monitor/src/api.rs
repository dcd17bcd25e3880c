//! HTTP API: graph read surface, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use graph_lib::{
    health::{Component, ComponentStatus, HealthRegistry},
    observability::MonitorMetrics,
    EntityKind, GraphError, GraphReadback,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Default threshold for `/api/nodes-high-cpu`, in cores
pub const NODE_CPU_THRESHOLD: f64 = 0.5;
/// Default threshold for `/api/containers-high-cpu`, in cores
pub const CONTAINER_CPU_THRESHOLD: f64 = 0.1;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub readback: Arc<GraphReadback>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
        readback: Arc<GraphReadback>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            readback,
        }
    }
}

/// Library error rendered as `{"error", "kind"}`
pub struct ApiError(GraphError);

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GraphError::NotFound(_) => StatusCode::NOT_FOUND,
            GraphError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            GraphError::RawQueryDisabled => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, kind = self.0.kind(), "Request failed");
        }

        (
            status,
            Json(json!({ "error": self.0.to_string(), "kind": self.0.kind() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Threshold kept as text so a malformed value gets the JSON error body
#[derive(Debug, Deserialize)]
pub struct ThresholdParams {
    pub threshold: Option<String>,
}

impl ThresholdParams {
    fn resolve(&self, default: f64) -> Result<f64, ApiError> {
        match self.threshold.as_deref().map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse::<f64>().map_err(|_| {
                ApiError(GraphError::InvalidQuery(format!(
                    "threshold must be a number, got '{}'",
                    raw
                )))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphParams {
    pub vm_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClusterParams {
    pub cluster_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawQueryParams {
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountsResponse {
    pub summary: Vec<graph_lib::readback::TypeCount>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub result: Vec<serde_json::Value>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", prometheus::TEXT_FORMAT)],
        state.metrics.render(),
    )
}

/// Read API health, including a round trip to the store
async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.readback.store();
    match store.ping().await {
        Ok(()) => {
            state.health_registry.set_healthy(Component::Store).await;
            (
                StatusCode::OK,
                Json(json!({ "status": "healthy", "store": store.name() })),
            )
        }
        Err(e) => {
            state
                .health_registry
                .set_unhealthy(Component::Store, e.to_string())
                .await;
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "store": store.name(),
                    "error": e.to_string(),
                })),
            )
        }
    }
}

async fn graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GraphParams>,
) -> ApiResult<graph_lib::readback::GraphPayload> {
    let payload = match params.vm_id.as_deref() {
        Some(vm_id) if !vm_id.is_empty() => state.readback.get_vm_graph(vm_id).await?,
        _ => state.readback.get_full_graph().await?,
    };
    Ok(Json(payload))
}

async fn node_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<graph_lib::readback::EntityDetail> {
    Ok(Json(state.readback.get_entity_detail(&id).await?))
}

async fn node_counts(State(state): State<Arc<AppState>>) -> ApiResult<CountsResponse> {
    let summary = state.readback.get_counts_by_type().await?;
    Ok(Json(CountsResponse { summary }))
}

async fn raw_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RawQueryParams>,
) -> ApiResult<QueryResponse> {
    let query = params.query.unwrap_or_default();
    let result = state.readback.raw_query(&query).await?;
    Ok(Json(QueryResponse { result }))
}

async fn resource_usage(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<graph_lib::entity::ResourceUsageEntity>> {
    Ok(Json(state.readback.get_resource_usage().await?))
}

async fn nodes_high_cpu(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ThresholdParams>,
) -> ApiResult<Vec<graph_lib::readback::FilteredEntity>> {
    let threshold = params.resolve(NODE_CPU_THRESHOLD)?;
    Ok(Json(
        state
            .readback
            .get_filtered(EntityKind::Node, "cpu_usage", threshold)
            .await?,
    ))
}

async fn containers_high_cpu(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ThresholdParams>,
) -> ApiResult<Vec<graph_lib::readback::FilteredEntity>> {
    let threshold = params.resolve(CONTAINER_CPU_THRESHOLD)?;
    Ok(Json(
        state
            .readback
            .get_filtered(EntityKind::Container, "cpu_usage", threshold)
            .await?,
    ))
}

async fn cluster_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClusterParams>,
) -> ApiResult<Vec<graph_lib::store::ClusterSummary>> {
    Ok(Json(
        state
            .readback
            .get_cluster_summary(params.cluster_id.as_deref())
            .await?,
    ))
}

async fn vm_summary(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<graph_lib::entity::VmEntity>> {
    Ok(Json(state.readback.get_vm_summary().await?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/health", get(api_health))
        .route("/api/graph", get(graph))
        .route("/api/node/:id", get(node_detail))
        .route("/api/nodes", get(node_counts))
        .route("/api/query", get(raw_query))
        .route("/api/resource-usage", get(resource_usage))
        .route("/api/nodes-high-cpu", get(nodes_high_cpu))
        .route("/api/containers-high-cpu", get(containers_high_cpu))
        .route("/api/cluster-summary", get(cluster_summary))
        .route("/api/vm-summary", get(vm_summary))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
