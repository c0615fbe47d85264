//! Request DTOs for the operational API
//!
//! Defines query strings and bodies accepted by the HTTP surface.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::request_log::LogFilter;

/// Most entries a single debug query may return.
pub const MAX_DEBUG_LIMIT: usize = 1000;

/// Default number of entries returned by the debug endpoint.
pub const DEFAULT_DEBUG_LIMIT: usize = 10;

/// Most queries accepted by one batch search.
pub const MAX_BATCH_QUERIES: usize = 50;

/// Query string for `GET /search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Content type, e.g. `movie` or `show`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub year: Option<u16>,
}

impl SearchQuery {
    /// Returns an error message if the query is unusable.
    pub fn validate(&self) -> Option<String> {
        if self.query.trim().is_empty() {
            return Some("query cannot be empty".to_string());
        }
        None
    }
}

/// Body for `POST /search/batch`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSearchRequest {
    pub queries: Vec<SearchQuery>,
}

impl BatchSearchRequest {
    pub fn validate(&self) -> Option<String> {
        if self.queries.is_empty() {
            return Some("queries cannot be empty".to_string());
        }
        if self.queries.len() > MAX_BATCH_QUERIES {
            return Some(format!(
                "at most {} queries per batch, got {}",
                MAX_BATCH_QUERIES,
                self.queries.len()
            ));
        }
        None
    }
}

/// Query string for `GET /debug/requests`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugQuery {
    pub limit: Option<usize>,
    pub operation: Option<String>,
    pub method: Option<String>,
    pub status: Option<u16>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DebugQuery {
    /// Requested limit, defaulted and capped.
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_DEBUG_LIMIT)
            .clamp(1, MAX_DEBUG_LIMIT)
    }

    pub fn filter(&self) -> LogFilter {
        LogFilter {
            operation_name: self.operation.clone(),
            method: self.method.clone(),
            status_code: self.status,
            since: self.since,
            until: self.until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_deserialize() {
        let json = r#"{"query": "Dune", "type": "movie", "year": 2021}"#;
        let query: SearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.query, "Dune");
        assert_eq!(query.kind.as_deref(), Some("movie"));
        assert_eq!(query.year, Some(2021));
        assert!(query.validate().is_none());
    }

    #[test]
    fn test_search_query_blank_is_invalid() {
        let query: SearchQuery = serde_json::from_str(r#"{"query": "  "}"#).unwrap();
        assert!(query.validate().is_some());
    }

    #[test]
    fn test_batch_request_validation() {
        let empty: BatchSearchRequest = serde_json::from_str(r#"{"queries": []}"#).unwrap();
        assert!(empty.validate().is_some());

        let one: BatchSearchRequest =
            serde_json::from_str(r#"{"queries": [{"query": "Dune"}]}"#).unwrap();
        assert!(one.validate().is_none());
    }

    #[test]
    fn test_debug_query_limit_and_filter() {
        assert_eq!(DebugQuery::default().limit(), DEFAULT_DEBUG_LIMIT);

        let query = DebugQuery {
            limit: Some(5000),
            operation: Some("search".to_string()),
            status: Some(429),
            ..Default::default()
        };
        assert_eq!(query.limit(), MAX_DEBUG_LIMIT);

        let filter = query.filter();
        assert_eq!(filter.operation_name.as_deref(), Some("search"));
        assert_eq!(filter.status_code, Some(429));
        assert!(filter.method.is_none());
    }
}
