//! Client Module
//!
//! The resilient API client and the pieces it is assembled from: bearer
//! token supply, per-request options, the backoff schedule and bounded
//! batch fan-out.

mod api;
mod auth;
mod batch;
mod options;
mod retry;

pub use api::{
    shared_cache, ApiClient, DebugSnapshot, SharedCache, API_KEY_HEADER, API_VERSION_HEADER,
    DEFAULT_SEARCH_TYPES,
};
pub use auth::{StaticToken, TokenSource};
pub use batch::{run_batch, BatchOptions};
pub use options::RequestOptions;
pub use retry::RetryPolicy;
