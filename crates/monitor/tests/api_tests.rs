//! Integration tests for the monitor API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use graph_lib::{
    health::{Component, HealthRegistry},
    models::{
        ClusterInfoRecord, ContainerRecord, ContainerUsage, HostInfo, Inventory, NodeRecord,
        NodeUsage, PodRecord, PodUsage, Quantities, UsageReport,
    },
    observability::MonitorMetrics,
    GraphReadback, GraphUpsertEngine, MemoryGraphStore, SnapshotAssembler,
};
use kubegraph_monitor::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn inventory() -> Inventory {
    Inventory {
        context: "kind-dev".into(),
        available_contexts: vec!["kind-dev".into()],
        cluster_info: ClusterInfoRecord::default(),
        nodes: vec![
            NodeRecord {
                name: "worker-1".into(),
                status: "Ready".into(),
                roles: vec!["worker".into()],
                capacity: Quantities::new("4", "8Gi"),
                allocatable: Quantities::new("4", "8Gi"),
            },
            NodeRecord {
                name: "worker-2".into(),
                status: "Ready".into(),
                roles: vec![],
                capacity: Quantities::new("2", "4Gi"),
                allocatable: Quantities::new("2", "4Gi"),
            },
        ],
        pods: vec![PodRecord {
            name: "web-0".into(),
            namespace: "default".into(),
            status: "Running".into(),
            node_name: "worker-1".into(),
            containers: vec![
                ContainerRecord {
                    name: "nginx".into(),
                    image: "nginx:1.25".into(),
                    status: "Running".into(),
                    requests: Quantities::new("250m", "128Mi"),
                    limits: Quantities::new("500m", "256Mi"),
                },
                ContainerRecord {
                    name: "sidecar".into(),
                    image: "envoy:1.29".into(),
                    status: "Running".into(),
                    requests: Quantities::default(),
                    limits: Quantities::default(),
                },
            ],
        }],
        services: vec![],
    }
}

fn usage() -> UsageReport {
    UsageReport {
        nodes: vec![NodeUsage {
            name: "worker-1".into(),
            cpu: "1200m".into(),
            memory: "2Gi".into(),
        }],
        pods: vec![PodUsage {
            name: "web-0".into(),
            namespace: "default".into(),
            containers: vec![
                ContainerUsage {
                    name: "nginx".into(),
                    cpu: "100m".into(),
                    memory: "64Mi".into(),
                },
                ContainerUsage {
                    name: "sidecar".into(),
                    cpu: "5m".into(),
                    memory: "16Mi".into(),
                },
            ],
        }],
        raw_node_metrics: json!({"items": []}),
        raw_pod_metrics: json!({"items": []}),
    }
}

async fn setup_test_app(raw_query: bool) -> (Router, HealthRegistry) {
    let health_registry = HealthRegistry::new();

    let store = Arc::new(MemoryGraphStore::new());
    let assembler = SnapshotAssembler::new(
        HostInfo {
            hostname: "host-a".into(),
            ip_addresses: vec!["10.0.0.5".into()],
            platform: "linux-x86_64".into(),
        },
        Utc::now(),
    );
    let snapshot = assembler.assemble(&inventory(), Some(&usage()));
    assert!(GraphUpsertEngine::new(store.clone()).store_snapshot(&snapshot).await);

    let readback = Arc::new(GraphReadback::new(store).with_raw_query(raw_query));
    let state = Arc::new(AppState::new(
        health_registry.clone(),
        MonitorMetrics::new(),
        readback,
    ));
    (create_router(state), health_registry)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, health) = setup_test_app(false).await;
    health
        .set_degraded(Component::Collector, "inventory call timed out")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, health) = setup_test_app(false).await;
    health
        .set_unhealthy(Component::Store, "connection refused")
        .await;

    let (status, _) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_waits_for_store_connection() {
    let (app, health) = setup_test_app(false).await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    health.mark_store_connected().await;
    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup_test_app(false).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("kubegraph_store_latency_seconds"));
}

#[tokio::test]
async fn test_api_health_pings_store() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_graph_payload() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app, "/api/graph").await;
    assert_eq!(status, StatusCode::OK);

    // VM, Cluster, 2 Nodes, 1 Pod, 2 Containers, ClusterMetrics, ResourceUsage
    let nodes = body["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 9);
    // VM->Cluster, Cluster->{2 nodes, pod, usage}, Node->Pod, Pod->{2 containers}
    let edges = body["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 8);
    assert!(edges.iter().all(|e| e["arrows"] == "to"));

    let pod = nodes.iter().find(|n| n["type"] == "Pod").unwrap();
    assert_eq!(pod["color"], "#96CEB4");
    assert_eq!(pod["label"], "web-0");
}

#[tokio::test]
async fn test_graph_scoped_to_vm() {
    let (app, _) = setup_test_app(false).await;

    let (_, vms) = get(app.clone(), "/api/vm-summary").await;
    let vm_id = vms[0]["id"].as_str().unwrap().to_string();

    let (status, body) = get(app.clone(), &format!("/api/graph?vm_id={}", vm_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"].as_array().unwrap().len(), 9);
    assert_eq!(body["edges"].as_array().unwrap().len(), 8);

    let (status, body) = get(app, "/api/graph?vm_id=other-host").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_node_detail_and_not_found() {
    let (app, _) = setup_test_app(false).await;

    let (_, graph) = get(app.clone(), "/api/graph").await;
    let container = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["label"] == "nginx")
        .unwrap()
        .clone();
    let id = container["id"].as_str().unwrap();

    let (status, detail) = get(app.clone(), &format!("/api/node/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["type"], "Container");
    assert_eq!(detail["properties"]["image"], "nginx:1.25");

    let (status, body) = get(app, "/api/node/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_counts_by_type() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app, "/api/nodes").await;
    assert_eq!(status, StatusCode::OK);

    let counts = body["summary"].as_array().unwrap();
    let count_of = |kind: &str| {
        counts
            .iter()
            .find(|c| c["type"] == kind)
            .map(|c| c["count"].as_i64().unwrap())
    };
    assert_eq!(count_of("Node"), Some(2));
    assert_eq!(count_of("Container"), Some(2));
    assert_eq!(count_of("Service"), None);
}

#[tokio::test]
async fn test_nodes_high_cpu_default_threshold() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app, "/api/nodes-high-cpu").await;
    assert_eq!(status, StatusCode::OK);

    let nodes = body.as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["name"], "worker-1");
    assert!((nodes[0]["value"].as_f64().unwrap() - 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_containers_high_cpu_threshold_is_strict() {
    let (app, _) = setup_test_app(false).await;

    // nginx uses exactly 0.1 cores
    let (_, body) = get(app.clone(), "/api/containers-high-cpu").await;
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = get(app, "/api/containers-high-cpu?threshold=0.001").await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["nginx", "sidecar"]);
}

#[tokio::test]
async fn test_malformed_threshold_returns_json_error() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app.clone(), "/api/nodes-high-cpu?threshold=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_query");
    assert!(body["error"].as_str().unwrap().contains("abc"));

    let (status, body) = get(app, "/api/containers-high-cpu?threshold=").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_summary() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app.clone(), "/api/cluster-summary").await;
    assert_eq!(status, StatusCode::OK);

    let summaries = body.as_array().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["node_count"], 2);
    assert_eq!(summaries[0]["pod_count"], 1);
    assert_eq!(summaries[0]["service_count"], 0);
    assert_eq!(summaries[0]["metrics"]["running_pods"], 1);

    let (_, body) = get(app, "/api/cluster-summary?cluster_id=unknown").await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_resource_usage_and_vm_summary() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app.clone(), "/api/resource-usage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = get(app, "/api/vm-summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["hostname"], "host-a");
}

#[tokio::test]
async fn test_raw_query_forbidden_by_default() {
    let (app, _) = setup_test_app(false).await;

    let (status, body) = get(app, "/api/query?query=MATCH%20(n)%20RETURN%20n").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn test_raw_query_rejects_writes() {
    let (app, _) = setup_test_app(true).await;

    let (status, body) = get(app, "/api/query?query=MATCH%20(n)%20DETACH%20DELETE%20n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_query");
}

#[tokio::test]
async fn test_raw_query_without_query_parameter() {
    let (app, _) = setup_test_app(true).await;

    let (status, body) = get(app, "/api/query").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_query");
    assert!(body["error"].as_str().unwrap().contains("No query provided"));
}

#[tokio::test]
async fn test_raw_query_unsupported_by_memory_store() {
    let (app, _) = setup_test_app(true).await;

    let (status, body) = get(app, "/api/query?query=MATCH%20(n)%20RETURN%20n").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "query_failure");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _) = setup_test_app(false).await;

    let (status, _) = get(app, "/nonexistent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
