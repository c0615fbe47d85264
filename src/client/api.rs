//! The resilient API client.
//!
//! Every call goes through the same steps: admission by the rate limiter, a
//! cache lookup for cacheable reads, then a bounded retry loop around the
//! HTTP transport. Each attempt is recorded in the request log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::auth::{StaticToken, TokenSource};
use super::options::RequestOptions;
use super::retry::RetryPolicy;
use crate::cache::{CacheMetrics, LruCache};
use crate::config::{ApiConfig, CacheConfig, Config};
use crate::error::{ClientError, Result};
use crate::rate_limiter::RateLimiter;
use crate::request_log::{
    truncate_body, LogFilter, OperationMetrics, RateLimitInfo, RequestLogEntry, RequestLogger,
};

/// Response cache shared by every clone of the client.
pub type SharedCache = Arc<Mutex<LruCache<String, Value>>>;

/// Creates an empty [`SharedCache`] from the `[cache]` configuration section.
pub fn shared_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(Mutex::new(LruCache::from_config(config)))
}

/// Header carrying the application key.
pub const API_KEY_HEADER: &str = "trakt-api-key";

/// Header carrying the API version.
pub const API_VERSION_HEADER: &str = "trakt-api-version";

/// Content types searched when the caller does not name one.
pub const DEFAULT_SEARCH_TYPES: &str = "movie,show";

// == Debug Snapshot ==
/// Everything needed to inspect recent client behaviour in one value.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    /// Matching log entries, most recent first
    pub logs: Vec<RequestLogEntry>,
    pub metrics: Vec<OperationMetrics>,
    pub cache_metrics: CacheMetrics,
    /// Admissions currently counted by the rate limiter
    pub requests_in_window: usize,
    /// File log lines dropped because the writer fell behind
    pub dropped_log_lines: u64,
}

// == Api Client ==
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    token_source: Arc<dyn TokenSource>,
    retry: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
    cache: SharedCache,
    logger: Arc<RequestLogger>,
}

impl ApiClient {
    /// Creates a client over already-constructed collaborators.
    pub fn new(
        config: &ApiConfig,
        rate_limiter: Arc<RateLimiter>,
        cache: SharedCache,
        logger: Arc<RequestLogger>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            token_source: Arc::new(StaticToken::from(config.access_token.clone())),
            retry: RetryPolicy::from_config(config),
            rate_limiter,
            cache,
            logger,
        })
    }

    /// Builds the client and all of its collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api,
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            shared_cache(&config.cache),
            Arc::new(RequestLogger::new(&config.logger)),
        )
    }

    pub fn with_token_source(mut self, token_source: Arc<dyn TokenSource>) -> Self {
        self.token_source = token_source;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // == Request Methods ==
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(Method::DELETE, path, options).await
    }

    /// Sends one logical request.
    ///
    /// Admission happens once per call; throttled attempts are retried with
    /// exponential backoff without being re-admitted. Authentication failures
    /// and other errors are returned after the first attempt.
    pub async fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<Value> {
        self.rate_limiter.admit().await;

        let cache_key = options.cache_key_for(&method, path);
        if let Some(key) = &cache_key {
            let cached = self.cache.lock().get(key);
            if let Some(value) = cached {
                debug!(key = %key, "Serving response from cache");
                return Ok(value);
            }
        }

        let url = self.url_for(path);
        let mut attempt = 0u32;

        let value = loop {
            match self.send_attempt(&method, &url, &options, attempt).await {
                Ok(value) => break value,
                Err(ClientError::Throttled { retry_after, .. }) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        %url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        retry_after = ?retry_after,
                        "Throttled by remote API, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_throttled() {
                        warn!(%url, attempts = attempt + 1, "Giving up after repeated throttling");
                    }
                    return Err(e);
                }
            }
        };

        if let Some(key) = cache_key {
            let stored = self.cache.lock().set(key.clone(), value.clone());
            if stored {
                debug!(key = %key, "Cached response");
            }
        }

        Ok(value)
    }

    /// Searches movies and shows.
    ///
    /// `kind` narrows the search to one content type. Results are cached under
    /// the normalized query, so differently cased or padded spellings of the
    /// same search share one entry.
    pub async fn search(&self, query: &str, kind: Option<&str>, year: Option<u16>) -> Result<Value> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidRequest(
                "search query must not be empty".to_string(),
            ));
        }

        let kind = kind
            .map(|kind| kind.trim().to_lowercase())
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| DEFAULT_SEARCH_TYPES.to_string());
        let year_key = year.map_or_else(|| "any".to_string(), |year| year.to_string());

        let mut options = RequestOptions::new()
            .query("query", trimmed)
            .operation("search")
            .cache_key(format!("search:{}:{}:{}", kind, trimmed.to_lowercase(), year_key));
        if let Some(year) = year {
            options = options.query("years", year.to_string());
        }

        self.get(&format!("/search/{}", kind), options).await
    }

    // == Cache and Diagnostics ==
    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.lock().metrics()
    }

    /// Empties the response cache, returning how many entries it held.
    pub fn clear_cache(&self) -> usize {
        let removed = {
            let mut cache = self.cache.lock();
            let removed = cache.len();
            cache.clear();
            removed
        };
        info!(removed, "Response cache cleared");
        removed
    }

    /// Removes expired cache entries, returning how many were dropped.
    pub fn prune_cache(&self) -> usize {
        self.cache.lock().prune()
    }

    /// Recent log entries plus the aggregates around them.
    pub fn debug_last_request(&self, limit: usize, filter: &LogFilter) -> DebugSnapshot {
        DebugSnapshot {
            logs: self.logger.query(limit, filter),
            metrics: self.logger.metrics(filter.operation_name.as_deref()),
            cache_metrics: self.cache_metrics(),
            requests_in_window: self.rate_limiter.requests_in_window(),
            dropped_log_lines: self.logger.dropped_file_lines(),
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn logger(&self) -> &Arc<RequestLogger> {
        &self.logger
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    // == Transport ==
    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(API_VERSION_HEADER),
            header_value(API_VERSION_HEADER, &self.api_version)?,
        );
        if !self.api_key.is_empty() {
            headers.insert(
                HeaderName::from_static(API_KEY_HEADER),
                header_value(API_KEY_HEADER, &self.api_key)?,
            );
        }
        if let Some(token) = self.token_source.access_token() {
            let mut value = header_value("authorization", &format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Sends a single attempt and logs its outcome.
    async fn send_attempt(
        &self,
        method: &Method,
        url: &str,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<Value> {
        let mut builder = self
            .http
            .request(method.clone(), url)
            .headers(self.headers()?);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }
        let request = builder.build()?;

        let pending = self.logger.record_request_start(
            method.as_str(),
            request.url().as_str(),
            request.headers(),
            options.body.as_ref(),
            self.logger.generate_correlation_id(),
            options.operation.as_deref(),
        );
        let started = Instant::now();

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let error = ClientError::Transport(e);
                let entry = self.logger.complete_with_error(pending, &error, None, started);
                self.logger.log(entry);
                return Err(error);
            }
        };

        let status = response.status();
        let response_headers = response.headers().clone();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let error = ClientError::Transport(e);
                let mut entry = self.logger.complete_with_error(
                    pending,
                    &error,
                    RateLimitInfo::from_headers(&response_headers),
                    started,
                );
                // The status line arrived even though the body did not
                entry.status_code = Some(status.as_u16());
                self.logger.log(entry);
                return Err(error);
            }
        };
        let body = parse_body(&text);

        if status.is_success() {
            let entry = self.logger.complete_with_success(
                pending,
                status.as_u16(),
                Some(body.clone()),
                &response_headers,
                started,
            );
            self.logger.log(entry);
            return Ok(body);
        }

        let rate_limit_info = RateLimitInfo::from_headers(&response_headers);
        let error = match status {
            StatusCode::TOO_MANY_REQUESTS => ClientError::Throttled {
                attempts: attempt + 1,
                retry_after: rate_limit_info.as_ref().and_then(|info| info.retry_after),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth {
                status: status.as_u16(),
            },
            _ => ClientError::Api {
                status: status.as_u16(),
                message: error_message(&body, status),
            },
        };

        let mut entry = self
            .logger
            .complete_with_error(pending, &error, rate_limit_info, started);
        if !body.is_null() {
            entry.response_body = Some(truncate_body(body));
        }
        self.logger.log(entry);

        if let ClientError::Auth { status } = &error {
            warn!(%url, status, "Authentication rejected, re-authentication required");
        }
        Err(error)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Internal(format!("invalid value for header {}", name)))
}

/// Empty bodies become `null`; bodies that are not JSON are kept as text.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn error_message(body: &Value, status: StatusCode) -> String {
    ["error_description", "error", "message"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .or_else(|| body.as_str().filter(|text| !text.is_empty()))
        .or_else(|| status.canonical_reason())
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_log::REDACTED;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            api_key: "client-id-123".to_string(),
            access_token: Some("secret-token".to_string()),
            timeout_secs: 5,
            base_backoff_ms: 10,
            ..ApiConfig::default()
        };
        ApiClient::new(
            &config,
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            shared_cache(&CacheConfig::default()),
            Arc::new(RequestLogger::in_memory(100)),
        )
        .unwrap()
    }

    fn dune() -> Value {
        json!([{"type": "movie", "movie": {"title": "Dune", "year": 2021}}])
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn test_error_message_prefers_body_fields() {
        let status = StatusCode::UNPROCESSABLE_ENTITY;
        assert_eq!(error_message(&json!({"error": "bad id"}), status), "bad id");
        assert_eq!(error_message(&Value::Null, status), "Unprocessable Entity");
    }

    #[tokio::test]
    async fn test_repeated_search_hits_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "Dune"))
            .and(query_param("years", "2021"))
            .respond_with(ResponseTemplate::new(200).set_body_json(dune()))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        for _ in 0..3 {
            let result = client.search("Dune", Some("movie"), Some(2021)).await.unwrap();
            assert_eq!(result, dune());
        }

        let metrics = client.cache_metrics();
        assert_eq!(metrics.hits, 2);
        assert_eq!(metrics.misses, 1);
        assert!((metrics.hit_rate - 2.0 / 3.0).abs() < 0.01);
        assert_eq!(client.rate_limiter().requests_in_window(), 3);
    }

    #[tokio::test]
    async fn test_search_normalizes_cache_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie,show"))
            .respond_with(ResponseTemplate::new(200).set_body_json(dune()))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.search("Dune", None, None).await.unwrap();
        client.search("  dune ", None, None).await.unwrap();

        assert_eq!(client.cache_metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_empty_search_is_rejected() {
        let client = test_client("http://127.0.0.1:9");
        let result = client.search("   ", None, None).await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
        assert!(client.logger().is_empty());
    }

    #[tokio::test]
    async fn test_sends_auth_and_version_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/history"))
            .and(header("trakt-api-key", "client-id-123"))
            .and(header("trakt-api-version", "2"))
            .and(header("authorization", "Bearer secret-token"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"movies": [{"ids": {"trakt": 1}}]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"added": {"movies": 1}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client
            .post(
                "/sync/history",
                RequestOptions::new()
                    .body(json!({"movies": [{"ids": {"trakt": 1}}]}))
                    .operation("history_add"),
            )
            .await
            .unwrap();

        assert_eq!(result["added"]["movies"], 1);
    }

    #[tokio::test]
    async fn test_log_entries_are_redacted_and_carry_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/settings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"user": {"username": "sean"}}))
                    .insert_header("x-ratelimit-limit", "1000")
                    .insert_header("x-ratelimit-remaining", "999"),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .get("/users/settings", RequestOptions::new().operation("settings"))
            .await
            .unwrap();

        let snapshot = client.debug_last_request(10, &LogFilter::default());
        assert_eq!(snapshot.logs.len(), 1);
        assert_eq!(snapshot.requests_in_window, 1);
        assert_eq!(snapshot.dropped_log_lines, 0);

        let entry = &snapshot.logs[0];
        assert_eq!(entry.status_code, Some(200));
        assert_eq!(entry.headers[API_KEY_HEADER], REDACTED);
        assert_eq!(entry.headers["authorization"], "Bearer [REDACTED]");
        assert_eq!(entry.headers[API_VERSION_HEADER], "2");
        let info = entry.rate_limit_info.as_ref().unwrap();
        assert_eq!(info.limit, Some(1000));
        assert_eq!(info.remaining, Some(999));

        assert_eq!(snapshot.metrics.len(), 1);
        assert_eq!(snapshot.metrics[0].operation_name, "settings");
        assert_eq!(snapshot.metrics[0].successful_calls, 1);
    }

    #[tokio::test]
    async fn test_throttling_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .expect(4)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let start = Instant::now();
        let result = client.search("Dune", Some("movie"), None).await;

        match result {
            Err(ClientError::Throttled { attempts, retry_after }) => {
                assert_eq!(attempts, 4);
                assert_eq!(retry_after, Some(1));
            }
            other => panic!("expected throttled error, got {:?}", other),
        }
        // 10 + 20 + 40 ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(70));

        let throttled = LogFilter {
            status_code: Some(429),
            ..Default::default()
        };
        assert_eq!(client.logger().query(10, &throttled).len(), 4);
        assert_eq!(client.cache_metrics().size, 0);
        // One admission covers every retry
        assert_eq!(client.rate_limiter().requests_in_window(), 1);
    }

    #[tokio::test]
    async fn test_throttling_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/show"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/show"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.search("Severance", Some("show"), None).await.unwrap();

        assert_eq!(result, json!([]));
        let metrics = client.logger().metrics(Some("search"));
        assert_eq!(metrics[0].total_calls, 2);
        assert_eq!(metrics[0].failed_calls, 1);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/watched/movies"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_token"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.get("/sync/watched/movies", RequestOptions::new()).await;

        assert!(matches!(result, Err(ClientError::Auth { status: 401 })));
        let logs = client.logger().query(10, &LogFilter::default());
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].response_body, Some(json!({"error": "invalid_token"})));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movies/dune-2021"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client
            .get("/movies/dune-2021", RequestOptions::new().cached())
            .await;

        match result {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("expected api error, got {:?}", other),
        }
        assert_eq!(client.cache_metrics().size, 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_logged() {
        // Nothing listens on the discard port
        let client = test_client("http://127.0.0.1:9");
        let result = client
            .get("/movies/trending", RequestOptions::new().operation("trending"))
            .await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        let logs = client.logger().query(10, &LogFilter::default());
        assert_eq!(logs.len(), 1);
        assert!(logs[0].error.is_some());
        assert_eq!(logs[0].status_code, None);
    }

    #[tokio::test]
    async fn test_custom_token_source() {
        struct Rotating;
        impl TokenSource for Rotating {
            fn access_token(&self) -> Option<String> {
                Some("fresh-token".to_string())
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer fresh-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri()).with_token_source(Arc::new(Rotating));
        let result = client.delete("/checkin", RequestOptions::new()).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_body_read_failure_keeps_status_in_log() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Announces more body than it sends, then hangs up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n{\"pa")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = test_client(&format!("http://{}", addr));
        let result = client
            .get("/movies/dune-2021", RequestOptions::new().operation("summary"))
            .await;
        assert!(matches!(result, Err(ClientError::Transport(_))));

        let logs = client.logger().query(10, &LogFilter::default());
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, Some(200));
        assert!(logs[0].error.is_some());
        assert!(!logs[0].is_success());
        assert_eq!(client.logger().metrics(Some("summary"))[0].failed_calls, 1);
    }

    #[tokio::test]
    async fn test_clear_and_prune_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(dune()))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.search("Dune", None, None).await.unwrap();
        assert_eq!(client.prune_cache(), 0);
        assert_eq!(client.cache_metrics().size, 1);

        assert_eq!(client.clear_cache(), 1);
        assert_eq!(client.cache_metrics().size, 0);
        client.search("Dune", None, None).await.unwrap();
    }
}
