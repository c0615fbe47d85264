//! Response DTOs for the operational API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of one query inside a batch search
#[derive(Debug, Clone, Serialize)]
pub struct BatchSearchItem {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchSearchItem {
    pub fn success(query: impl Into<String>, result: Value) -> Self {
        Self {
            query: query.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Response body for POST /search/batch, one item per query in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchSearchResponse {
    pub results: Vec<BatchSearchItem>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSearchResponse {
    pub fn new(results: Vec<BatchSearchItem>) -> Self {
        let failed = results.iter().filter(|item| item.error.is_some()).count();
        Self {
            succeeded: results.len() - failed,
            failed,
            results,
        }
    }
}

/// Response body for POST /cache/clear and POST /cache/prune
#[derive(Debug, Clone, Serialize)]
pub struct CacheMaintenanceResponse {
    /// Success message
    pub message: String,
    /// Entries removed by the operation
    pub removed: usize,
}

impl CacheMaintenanceResponse {
    pub fn cleared(removed: usize) -> Self {
        Self {
            message: "Cache cleared".to_string(),
            removed,
        }
    }

    pub fn pruned(removed: usize) -> Self {
        Self {
            message: format!("Pruned {} expired entries", removed),
            removed,
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_batch_response_counts() {
        let resp = BatchSearchResponse::new(vec![
            BatchSearchItem::success("Dune", json!([])),
            BatchSearchItem::failure("", "query cannot be empty"),
            BatchSearchItem::success("Severance", json!([])),
        ]);
        assert_eq!(resp.succeeded, 2);
        assert_eq!(resp.failed, 1);

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["results"][0].get("error").is_none());
        assert!(json["results"][1].get("result").is_none());
    }

    #[test]
    fn test_cache_maintenance_messages() {
        assert_eq!(CacheMaintenanceResponse::pruned(3).message, "Pruned 3 expired entries");
        assert_eq!(CacheMaintenanceResponse::cleared(7).removed, 7);
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
