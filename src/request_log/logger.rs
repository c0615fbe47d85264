//! In-memory request log with optional file mirroring.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::{redact_headers, PendingRequest, RateLimitInfo, RequestLogEntry};
use super::file::FileSink;
use super::metrics::{OperationMetrics, UNNAMED_OPERATION};
use crate::config::LoggerConfig;
use crate::error::ClientError;

/// Criteria for [`RequestLogger::query`]; unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub operation_name: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    /// Inclusive lower bound on the entry timestamp
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry timestamp
    pub until: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn matches(&self, entry: &RequestLogEntry) -> bool {
        self.operation_name
            .as_deref()
            .map_or(true, |name| entry.operation_name.as_deref() == Some(name))
            && self
                .method
                .as_deref()
                .map_or(true, |method| entry.method.eq_ignore_ascii_case(method))
            && self
                .status_code
                .map_or(true, |status| entry.status_code == Some(status))
            && self.since.map_or(true, |since| entry.timestamp >= since)
            && self.until.map_or(true, |until| entry.timestamp <= until)
    }
}

struct LogState {
    /// Ring buffer, oldest at the front
    entries: VecDeque<RequestLogEntry>,
    /// Aggregates keyed by operation name
    metrics: HashMap<String, OperationMetrics>,
}

/// Records every outbound attempt.
///
/// Buffer and metrics share one lock so an entry and its metric update are
/// applied together. File output, when enabled, is queued to a writer thread
/// under the same lock.
pub struct RequestLogger {
    state: Mutex<LogState>,
    sequence: AtomicU64,
    max_buffer_size: usize,
    sink: Option<FileSink>,
}

impl RequestLogger {
    /// Creates a logger from configuration.
    ///
    /// If file logging is enabled but the directory or writer cannot be set
    /// up, the logger falls back to memory only and says so once.
    pub fn new(config: &LoggerConfig) -> Self {
        let sink = if config.enable_file_logging {
            match FileSink::start(config) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    warn!(error = %e, "File request logging unavailable, logging in memory only");
                    None
                }
            }
        } else {
            None
        };

        Self::with_sink(config.max_buffer_size, sink)
    }

    /// Creates a logger that never touches the filesystem.
    pub fn in_memory(max_buffer_size: usize) -> Self {
        Self::with_sink(max_buffer_size, None)
    }

    fn with_sink(max_buffer_size: usize, sink: Option<FileSink>) -> Self {
        let max_buffer_size = max_buffer_size.max(1);
        Self {
            state: Mutex::new(LogState {
                entries: VecDeque::with_capacity(max_buffer_size.min(4096)),
                metrics: HashMap::new(),
            }),
            sequence: AtomicU64::new(0),
            max_buffer_size,
            sink,
        }
    }

    /// Returns `<unix millis>-<sequence>`, unique for this logger.
    pub fn generate_correlation_id(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", Utc::now().timestamp_millis(), sequence)
    }

    /// Captures the request half of an entry, with credentials redacted.
    pub fn record_request_start(
        &self,
        method: &str,
        url: &str,
        headers: &HeaderMap,
        body: Option<&Value>,
        correlation_id: String,
        operation_name: Option<&str>,
    ) -> PendingRequest {
        debug!(%correlation_id, method, url, operation = ?operation_name, "Request started");

        PendingRequest {
            correlation_id,
            timestamp: Utc::now(),
            operation_name: operation_name.map(str::to_string),
            method: method.to_string(),
            url: url.to_string(),
            headers: redact_headers(headers),
            request_body: body.cloned(),
        }
    }

    pub fn complete_with_success(
        &self,
        pending: PendingRequest,
        status_code: u16,
        response_body: Option<Value>,
        response_headers: &HeaderMap,
        started: Instant,
    ) -> RequestLogEntry {
        pending.finish(
            started,
            Some(status_code),
            response_body,
            None,
            RateLimitInfo::from_headers(response_headers),
        )
    }

    pub fn complete_with_error(
        &self,
        pending: PendingRequest,
        error: &ClientError,
        rate_limit_info: Option<RateLimitInfo>,
        started: Instant,
    ) -> RequestLogEntry {
        pending.finish(
            started,
            error.status(),
            None,
            Some(error.to_string()),
            rate_limit_info,
        )
    }

    /// Stores a completed entry, updates its operation metrics and mirrors it
    /// to the log file when enabled.
    pub fn log(&self, entry: RequestLogEntry) {
        let line = self
            .sink
            .as_ref()
            .and_then(|_| serde_json::to_string(&entry).ok());

        debug!(
            correlation_id = %entry.correlation_id,
            method = %entry.method,
            url = %entry.url,
            status = ?entry.status_code,
            duration_ms = entry.duration_ms,
            error = ?entry.error,
            "Request completed"
        );

        {
            let mut state = self.state.lock();

            let name = entry
                .operation_name
                .clone()
                .unwrap_or_else(|| UNNAMED_OPERATION.to_string());
            state
                .metrics
                .entry(name.clone())
                .or_insert_with(|| OperationMetrics::new(name))
                .record(&entry);

            if state.entries.len() >= self.max_buffer_size {
                state.entries.pop_front();
            }
            state.entries.push_back(entry);

            // Enqueued under the lock so file order matches buffer order
            if let (Some(sink), Some(line)) = (&self.sink, line) {
                sink.write_line(line);
            }
        }
    }

    /// Returns up to `limit` matching entries, most recent first.
    pub fn query(&self, limit: usize, filter: &LogFilter) -> Vec<RequestLogEntry> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns metrics for one operation, or for all of them sorted by name.
    pub fn metrics(&self, operation_name: Option<&str>) -> Vec<OperationMetrics> {
        let state = self.state.lock();
        match operation_name {
            Some(name) => state.metrics.get(name).cloned().into_iter().collect(),
            None => {
                let mut all: Vec<OperationMetrics> = state.metrics.values().cloned().collect();
                all.sort_by(|a, b| a.operation_name.cmp(&b.operation_name));
                all
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn file_logging_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Lines the file writer could not keep up with; 0 without file logging.
    pub fn dropped_file_lines(&self) -> u64 {
        self.sink.as_ref().map_or(0, FileSink::dropped_lines)
    }

    /// Waits until every entry logged so far has reached the log file.
    pub async fn flush(&self) {
        if let Some(sink) = &self.sink {
            sink.flush().await;
        }
    }
}
