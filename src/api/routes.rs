//! API Routes
//!
//! Configures the Axum router with all operational endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    batch_search_handler, cache_clear_handler, cache_prune_handler, cache_stats_handler,
    debug_requests_handler, health_handler, search_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /search` - Cache-backed search
/// - `POST /search/batch` - Several searches with bounded concurrency
/// - `GET /debug/requests` - Recent request log entries and metrics
/// - `GET /cache/stats` - Response cache metrics
/// - `POST /cache/clear` - Empty the response cache
/// - `POST /cache/prune` - Drop expired cache entries
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/search/batch", post(batch_search_handler))
        .route("/debug/requests", get(debug_requests_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/clear", post(cache_clear_handler))
        .route("/cache/prune", post(cache_prune_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
