//! API Module
//!
//! HTTP handlers and routing for the operational surface over the client.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /search` - Cache-backed search
//! - `POST /search/batch` - Batched searches
//! - `GET /debug/requests` - Request log inspection
//! - `GET /cache/stats`, `POST /cache/clear`, `POST /cache/prune` - Cache maintenance

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
