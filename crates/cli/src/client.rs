//! HTTP client for the kubegraph read API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// API client for the monitor's read surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    kind: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, url: Url, query: &[(&str, String)]) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")
    }

    /// GET `path`, failing on any non-success status
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path.split('/'))?;
        self.fetch(url, query).await
    }

    /// GET `path/<id>`; the identifier may hold `/`, `#` or `?`
    pub async fn get_item<T: DeserializeOwned>(&self, path: &str, id: &str) -> Result<T> {
        let url = self.endpoint(path.split('/').chain(std::iter::once(id)))?;
        self.fetch(url, &[]).await
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        let response = self.send(url, query).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => anyhow::bail!("API error ({}): {} [{}]", status, err.error, err.kind),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET a probe endpoint that reports failure through its status code
    /// while still returning a body
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let response = self.send(self.endpoint(path.split('/'))?, &[]).await?;
        let status = response.status();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetail {
    pub id: String,
    pub labels: Vec<String>,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub count: i64,
}

/// `/api/nodes` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountsResponse {
    pub summary: Vec<TypeCount>,
}

/// `/api/query` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub result: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredEntity {
    pub id: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMetrics {
    pub total_pods: i64,
    pub running_pods: i64,
    pub pending_pods: i64,
    pub failed_pods: i64,
    pub total_services: i64,
    pub total_nodes: i64,
    pub ready_nodes: i64,
    pub total_cpu_usage: f64,
    pub total_memory_usage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: String,
    pub context: String,
    pub vm_id: String,
    pub node_count: i64,
    pub pod_count: i64,
    pub service_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ClusterMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    pub id: String,
    pub hostname: String,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    pub platform: String,
    pub captured_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub id: String,
    pub cluster_id: String,
    /// Raw metrics document, as JSON text
    pub node_metrics: String,
    pub pod_metrics: String,
    pub captured_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    pub status: String,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
