//! Per-request options.

use reqwest::Method;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum CachePolicy {
    #[default]
    Bypass,
    /// Key derived from the normalized path and query parameters
    Derived,
    Key(String),
}

/// Query parameters, body, operation name and caching for one call.
///
/// ```ignore
/// let options = RequestOptions::new()
///     .query("query", "Dune")
///     .operation("search")
///     .cached();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
    pub(crate) operation: Option<String>,
    cache: CachePolicy,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Name used to group log entries and metrics.
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = Some(name.into());
        self
    }

    /// Caches a successful GET under a key built from its parameters.
    pub fn cached(mut self) -> Self {
        self.cache = CachePolicy::Derived;
        self
    }

    /// Caches a successful GET under an explicit key.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache = CachePolicy::Key(key.into());
        self
    }

    /// Cache key for this call, `None` when the response must not be cached.
    ///
    /// Only GET requests are ever cached.
    pub(crate) fn cache_key_for(&self, method: &Method, path: &str) -> Option<String> {
        if method != Method::GET {
            return None;
        }

        match &self.cache {
            CachePolicy::Bypass => None,
            CachePolicy::Key(key) => Some(key.clone()),
            CachePolicy::Derived => Some(normalized_key(path, &self.query)),
        }
    }
}

/// Lowercases and trims every component and sorts parameters by name so that
/// equivalent requests share one entry.
fn normalized_key(path: &str, query: &[(String, String)]) -> String {
    let mut params: Vec<(String, String)> = query
        .iter()
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_lowercase()))
        .collect();
    params.sort();

    let params: Vec<String> = params
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();

    format!("{}?{}", path.trim().to_lowercase(), params.join("&"))
}
