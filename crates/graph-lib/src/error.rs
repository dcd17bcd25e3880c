//! Error types for the snapshot graph library

use thiserror::Error;

/// Errors raised while collecting, persisting or reading back the cluster graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Inventory source unreachable, failed, or timed out
    #[error("collection failed: {0}")]
    Collection(String),

    /// Graph store unreachable
    #[error("connection failed: {0}")]
    Connection(String),

    /// Entity or relationship upsert failed; the whole transaction was rolled back
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Ad hoc or aggregate query failed
    #[error("query failed: {0}")]
    Query(String),

    /// Raw query refused before reaching the store
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("raw query execution is disabled")]
    RawQueryDisabled,

    /// No entity with the given identifier
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GraphError {
    /// Stable snake_case kind used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::Collection(_) => "collection_failure",
            GraphError::Connection(_) => "connection_failure",
            GraphError::Transaction(_) => "transaction_failure",
            GraphError::Query(_) => "query_failure",
            GraphError::InvalidQuery(_) => "invalid_query",
            GraphError::RawQueryDisabled => "forbidden",
            GraphError::NotFound(_) => "not_found",
            GraphError::Serialization(_) => "serialization",
            GraphError::Config(_) => "config",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound(_))
    }
}

impl From<neo4rs::Error> for GraphError {
    fn from(err: neo4rs::Error) -> Self {
        GraphError::Query(err.to_string())
    }
}

impl From<kube::Error> for GraphError {
    fn from(err: kube::Error) -> Self {
        GraphError::Collection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(GraphError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            GraphError::Transaction("rollback".into()).kind(),
            "transaction_failure"
        );
        assert_eq!(GraphError::Query("bad".into()).kind(), "query_failure");
        assert_eq!(GraphError::RawQueryDisabled.kind(), "forbidden");
    }

    #[test]
    fn test_error_display_includes_message() {
        let err = GraphError::NotFound("pod-a:default:ctx:vm".into());
        assert_eq!(err.to_string(), "entity not found: pod-a:default:ctx:vm");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json")
            .err()
            .unwrap();
        let err: GraphError = json_err.into();
        assert_eq!(err.kind(), "serialization");
    }
}
