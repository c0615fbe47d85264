//! Watchlog Client - operational server
//!
//! Serves search, cache maintenance and request inspection endpoints over
//! the resilient API client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlog_client::api::{create_router, AppState};
use watchlog_client::client::{shared_cache, ApiClient};
use watchlog_client::{spawn_cleanup_task, Config, RateLimiter, RequestLogger};

/// Main entry point for the operational server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build rate limiter, response cache and request logger
/// 4. Build the API client over them
/// 5. Start background cache prune task
/// 6. Serve the Axum router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlog_client=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Watchlog Client server");

    let config = Config::from_env();
    info!(
        base_url = %config.api.base_url,
        cache_max_size = config.cache.max_size,
        cache_ttl_ms = config.cache.ttl_ms,
        rate_limit = config.rate_limit.max_requests,
        rate_window_ms = config.rate_limit.window_ms,
        file_logging = config.logger.enable_file_logging,
        port = config.server.port,
        "Configuration loaded"
    );
    if config.api.api_key.is_empty() {
        warn!("API_KEY is not set, requests will be sent without an application key");
    }

    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let cache = shared_cache(&config.cache);
    let logger = Arc::new(RequestLogger::new(&config.logger));

    let client = ApiClient::new(&config.api, rate_limiter, cache.clone(), logger.clone())
        .context("failed to build API client")?;
    info!("API client initialized");

    let cleanup_handle = spawn_cleanup_task(cache, config.server.cleanup_interval);
    info!("Background cache prune task started");

    let app = create_router(AppState::new(client));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    // Give the log writer a chance to drain before exit
    if tokio::time::timeout(Duration::from_secs(5), logger.flush())
        .await
        .is_err()
    {
        warn!("Timed out flushing request log");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the prune task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cache prune task aborted");
}
