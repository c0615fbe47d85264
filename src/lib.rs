//! Watchlog Client - a resilient client layer for a watch-tracking REST API
//!
//! Combines sliding-window admission control, an LRU/TTL response cache and
//! a redacting request log around a retrying HTTP client.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limiter;
pub mod request_log;
pub mod tasks;

pub use api::AppState;
pub use client::{ApiClient, RequestOptions, SharedCache};
pub use config::Config;
pub use error::{ClientError, Result};
pub use rate_limiter::RateLimiter;
pub use request_log::{LogFilter, RequestLogger};
pub use tasks::spawn_cleanup_task;
