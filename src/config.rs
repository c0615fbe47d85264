//! Configuration Module
//!
//! Handles loading and managing client and server configuration from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::{DEFAULT_MAX_SIZE, DEFAULT_MEMORY_WARNING_THRESHOLD, DEFAULT_TTL_MS};

/// Top-level configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Remote API connection settings
    pub api: ApiConfig,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Outbound admission control settings
    pub rate_limit: RateLimitConfig,
    /// Request log settings
    pub logger: LoggerConfig,
    /// Operational HTTP surface settings
    pub server: ServerConfig,
}

/// Remote API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Application key sent with every request
    pub api_key: String,
    /// Value of the API version header
    pub api_version: String,
    /// Bearer token, when the auth collaborator has one
    pub access_token: Option<String>,
    /// Transport timeout per attempt, in seconds
    pub timeout_secs: u64,
    /// Retries after a throttled response
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub base_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.trakt.tv".to_string(),
            api_key: String::new(),
            api_version: "2".to_string(),
            access_token: None,
            timeout_secs: 30,
            max_retries: 3,
            base_backoff_ms: 1000,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    pub max_size: usize,
    /// Entry lifetime in milliseconds
    pub ttl_ms: u64,
    /// Optional ceiling on the estimated size of cached values
    pub max_memory_bytes: Option<usize>,
    /// Fraction of the ceiling at which a warning is logged
    pub memory_warning_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl_ms: DEFAULT_TTL_MS,
            max_memory_bytes: None,
            memory_warning_threshold: DEFAULT_MEMORY_WARNING_THRESHOLD,
        }
    }
}

/// Sliding-window admission settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub max_requests: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window_ms: 5 * 60 * 1000,
        }
    }
}

/// Request log settings.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Entries kept in the in-memory ring buffer
    pub max_buffer_size: usize,
    /// Size in bytes after which the active log file is rotated
    pub max_file_size: u64,
    /// Directory holding the JSON-lines log files
    pub log_directory: PathBuf,
    /// Whether entries are mirrored to disk at all
    pub enable_file_logging: bool,
    /// Files older than this many days are deleted
    pub max_log_age_days: u64,
    /// Number of newest files kept
    pub max_log_files: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            max_file_size: 10 * 1024 * 1024,
            log_directory: PathBuf::from("logs"),
            enable_file_logging: false,
            max_log_age_days: 7,
            max_log_files: 10,
        }
    }
}

/// Operational HTTP surface settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub port: u16,
    /// Background cache prune interval in seconds
    pub cleanup_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cleanup_interval: 60,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `API_BASE_URL`, `API_KEY`, `API_VERSION`, `API_ACCESS_TOKEN`
    /// - `API_TIMEOUT_SECS` (30), `API_MAX_RETRIES` (3), `API_BASE_BACKOFF_MS` (1000)
    /// - `CACHE_MAX_SIZE` (500), `CACHE_TTL_MS` (3600000), `CACHE_MAX_MEMORY_BYTES` (unset),
    ///   `CACHE_MEMORY_WARNING_THRESHOLD` (0.9)
    /// - `RATE_LIMIT_MAX_REQUESTS` (1000), `RATE_LIMIT_WINDOW_MS` (300000)
    /// - `LOG_MAX_BUFFER_SIZE` (1000), `LOG_MAX_FILE_SIZE` (10 MiB), `LOG_DIRECTORY` (logs),
    ///   `LOG_ENABLE_FILE` (false), `LOG_MAX_AGE_DAYS` (7), `LOG_MAX_FILES` (10)
    /// - `SERVER_PORT` (3000), `CLEANUP_INTERVAL` (60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api: ApiConfig {
                base_url: env::var("API_BASE_URL").unwrap_or(defaults.api.base_url),
                api_key: env::var("API_KEY").unwrap_or(defaults.api.api_key),
                api_version: env::var("API_VERSION").unwrap_or(defaults.api.api_version),
                access_token: env::var("API_ACCESS_TOKEN")
                    .ok()
                    .filter(|token| !token.is_empty()),
                timeout_secs: env_or("API_TIMEOUT_SECS", defaults.api.timeout_secs),
                max_retries: env_or("API_MAX_RETRIES", defaults.api.max_retries),
                base_backoff_ms: env_or("API_BASE_BACKOFF_MS", defaults.api.base_backoff_ms),
            },
            cache: CacheConfig {
                max_size: env_or("CACHE_MAX_SIZE", defaults.cache.max_size),
                ttl_ms: env_or("CACHE_TTL_MS", defaults.cache.ttl_ms),
                max_memory_bytes: env_parse("CACHE_MAX_MEMORY_BYTES"),
                memory_warning_threshold: env_or(
                    "CACHE_MEMORY_WARNING_THRESHOLD",
                    defaults.cache.memory_warning_threshold,
                ),
            },
            rate_limit: RateLimitConfig {
                max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit.max_requests),
                window_ms: env_or("RATE_LIMIT_WINDOW_MS", defaults.rate_limit.window_ms),
            },
            logger: LoggerConfig {
                max_buffer_size: env_or("LOG_MAX_BUFFER_SIZE", defaults.logger.max_buffer_size),
                max_file_size: env_or("LOG_MAX_FILE_SIZE", defaults.logger.max_file_size),
                log_directory: env::var("LOG_DIRECTORY")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.logger.log_directory),
                enable_file_logging: env_or(
                    "LOG_ENABLE_FILE",
                    defaults.logger.enable_file_logging,
                ),
                max_log_age_days: env_or("LOG_MAX_AGE_DAYS", defaults.logger.max_log_age_days),
                max_log_files: env_or("LOG_MAX_FILES", defaults.logger.max_log_files),
            },
            server: ServerConfig {
                port: env_or("SERVER_PORT", defaults.server.port),
                cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.server.cleanup_interval),
            },
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_parse(name).unwrap_or(default)
}
