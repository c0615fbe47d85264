//! Request and Response models for the operational API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{BatchSearchRequest, DebugQuery, SearchQuery};
pub use responses::{
    BatchSearchItem, BatchSearchResponse, CacheMaintenanceResponse, ErrorResponse, HealthResponse,
};
