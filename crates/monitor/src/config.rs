//! Monitor configuration

use anyhow::{Context, Result};
use graph_lib::store::Neo4jConfig;
use graph_lib::MonitorConfig;
use serde::Deserialize;
use std::time::Duration;

/// Graph store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Neo4j,
    /// Process-local store, lost on exit
    Memory,
}

/// Monitor configuration, read from `KUBEGRAPH_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Port for the read API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Sleep between cycles in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Cycles to run, 0 runs until stopped
    #[serde(default)]
    pub iterations: u64,

    #[serde(default = "default_collection_timeout")]
    pub collection_timeout_secs: u64,

    /// Kubeconfig context; the current context when unset
    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_store")]
    pub store: StoreBackend,

    #[serde(default = "default_neo4j_uri")]
    pub neo4j_uri: String,

    #[serde(default = "default_neo4j_user")]
    pub neo4j_user: String,

    #[serde(default = "default_neo4j_password")]
    pub neo4j_password: String,

    /// Allow `/api/query`
    #[serde(default)]
    pub enable_raw_query: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_interval() -> u64 {
    10
}

fn default_collection_timeout() -> u64 {
    30
}

fn default_store() -> StoreBackend {
    StoreBackend::Neo4j
}

fn default_neo4j_uri() -> String {
    "127.0.0.1:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_neo4j_password() -> String {
    "password".to_string()
}

fn default_retention_days() -> i64 {
    7
}

/// `KUBEGRAPH_*` variables, with numbers and booleans parsed from text
fn env_source() -> config::Environment {
    config::Environment::with_prefix("KUBEGRAPH").try_parsing(true)
}

impl AppConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(env_source())
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid KUBEGRAPH_* configuration")
    }

    pub fn neo4j(&self) -> Neo4jConfig {
        Neo4jConfig {
            uri: self.neo4j_uri.clone(),
            user: self.neo4j_user.clone(),
            password: self.neo4j_password.clone(),
        }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            iterations: self.iterations,
            collection_timeout: Duration::from_secs(self.collection_timeout_secs),
            namespace: self.namespace.clone(),
        }
    }
}
