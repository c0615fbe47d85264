//! API Handlers
//!
//! HTTP request handlers for each operational endpoint.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::Value;

use crate::cache::CacheMetrics;
use crate::client::{run_batch, ApiClient, BatchOptions, DebugSnapshot};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::{
    BatchSearchItem, BatchSearchRequest, BatchSearchResponse, CacheMaintenanceResponse,
    DebugQuery, HealthResponse, SearchQuery,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Client shared by every request
    pub client: Arc<ApiClient>,
    /// Fan-out bounds for batch searches
    pub batch: BatchOptions,
}

impl AppState {
    /// Creates a new AppState around an existing client.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client: Arc::new(client),
            batch: BatchOptions::default(),
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(ApiClient::from_config(config)?))
    }

    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }
}

/// Handler for GET /search
///
/// Runs a cache-backed search against the remote API.
pub async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>> {
    if let Some(error_msg) = query.validate() {
        return Err(ClientError::InvalidRequest(error_msg));
    }

    let result = state
        .client
        .search(&query.query, query.kind.as_deref(), query.year)
        .await?;

    Ok(Json(result))
}

/// Handler for POST /search/batch
///
/// Runs every query through the batch helper. Individual failures are
/// reported per item; the request itself only fails on invalid input.
pub async fn batch_search_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchSearchRequest>,
) -> Result<Json<BatchSearchResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ClientError::InvalidRequest(error_msg));
    }

    let client = state.client.clone();
    let results = run_batch(req.queries, state.batch, move |query: SearchQuery| {
        let client = client.clone();
        async move {
            match client
                .search(&query.query, query.kind.as_deref(), query.year)
                .await
            {
                Ok(result) => BatchSearchItem::success(query.query, result),
                Err(e) => BatchSearchItem::failure(query.query, e.to_string()),
            }
        }
    })
    .await?;

    Ok(Json(BatchSearchResponse::new(results)))
}

/// Handler for GET /debug/requests
///
/// Returns recent request log entries with metrics and limiter state.
pub async fn debug_requests_handler(
    State(state): State<AppState>,
    Query(query): Query<DebugQuery>,
) -> Json<DebugSnapshot> {
    Json(
        state
            .client
            .debug_last_request(query.limit(), &query.filter()),
    )
}

/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheMetrics> {
    Json(state.client.cache_metrics())
}

/// Handler for POST /cache/clear
pub async fn cache_clear_handler(State(state): State<AppState>) -> Json<CacheMaintenanceResponse> {
    Json(CacheMaintenanceResponse::cleared(state.client.clear_cache()))
}

/// Handler for POST /cache/prune
pub async fn cache_prune_handler(State(state): State<AppState>) -> Json<CacheMaintenanceResponse> {
    Json(CacheMaintenanceResponse::pruned(state.client.prune_cache()))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
