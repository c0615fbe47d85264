//! Request log records.
//!
//! A [`PendingRequest`] is captured when an attempt starts and turned into an
//! immutable [`RequestLogEntry`] once the response or error is known.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::estimate_size;

/// Response bodies larger than this are replaced by a truncated preview.
pub const MAX_LOGGED_BODY_BYTES: usize = 5 * 1024;

/// Placeholder stored instead of secret header values.
pub const REDACTED: &str = "[REDACTED]";

// == Rate Limit Info ==
/// Quota information reported by the remote API in response headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<String>,
    /// Seconds the server asked us to wait, from `Retry-After`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts `x-ratelimit-*` and `retry-after` headers, `None` when absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        };
        let number = |name: &str| text(name).and_then(|value| value.parse().ok());

        let info = Self {
            limit: number("x-ratelimit-limit"),
            remaining: number("x-ratelimit-remaining"),
            reset: text("x-ratelimit-reset"),
            retry_after: number("retry-after"),
        };

        (info != Self::default()).then_some(info)
    }
}

// == Request Log Entry ==
/// One outbound HTTP attempt, as stored in memory and on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub method: String,
    pub url: String,
    /// Request headers with secrets redacted
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_info: Option<RateLimitInfo>,
}

impl RequestLogEntry {
    /// An attempt counts as successful when it produced no error and the
    /// status, if any, is below 400.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code.map_or(true, |status| status < 400)
    }
}

// == Pending Request ==
/// The request half of a log entry, captured before the attempt is sent.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_name: Option<String>,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub request_body: Option<Value>,
}

impl PendingRequest {
    pub(crate) fn finish(
        self,
        started: Instant,
        status_code: Option<u16>,
        response_body: Option<Value>,
        error: Option<String>,
        rate_limit_info: Option<RateLimitInfo>,
    ) -> RequestLogEntry {
        RequestLogEntry {
            correlation_id: self.correlation_id,
            timestamp: self.timestamp,
            operation_name: self.operation_name,
            method: self.method,
            url: self.url,
            headers: self.headers,
            request_body: self.request_body,
            status_code,
            response_body: response_body.map(truncate_body),
            error,
            duration_ms: started.elapsed().as_millis() as u64,
            rate_limit_info,
        }
    }
}

// == Redaction ==
/// Copies headers into a sorted map, masking credentials.
///
/// `Authorization` keeps its scheme (`Bearer [REDACTED]`) so the log still
/// shows which kind of credential was sent.
pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            let value = match value.to_str() {
                Ok(value) => redact_value(&name, value),
                Err(_) => "<binary>".to_string(),
            };
            (name, value)
        })
        .collect()
}

fn redact_value(name: &str, value: &str) -> String {
    match name {
        "authorization" | "proxy-authorization" => match value.split_once(' ') {
            Some((scheme, _)) => format!("{} {}", scheme, REDACTED),
            None => REDACTED.to_string(),
        },
        "cookie" | "set-cookie" => REDACTED.to_string(),
        _ if is_secret_header(name) => REDACTED.to_string(),
        _ => value.to_string(),
    }
}

fn is_secret_header(name: &str) -> bool {
    ["api-key", "apikey", "token", "secret"]
        .iter()
        .any(|marker| name.contains(marker))
}

// == Truncation ==
/// Replaces bodies larger than [`MAX_LOGGED_BODY_BYTES`] with a marker
/// object carrying the original size and a prefix of the serialized body.
pub fn truncate_body(body: Value) -> Value {
    let size = estimate_size(&body);
    if size <= MAX_LOGGED_BODY_BYTES {
        return body;
    }

    let serialized = body.to_string();
    let mut cut = MAX_LOGGED_BODY_BYTES.min(serialized.len());
    while !serialized.is_char_boundary(cut) {
        cut -= 1;
    }

    json!({
        "_truncated": true,
        "_original_size": size,
        "_preview": &serialized[..cut],
    })
}
