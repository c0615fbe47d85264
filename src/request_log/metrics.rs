//! Per-operation performance aggregates.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RequestLogEntry;

/// Name under which entries without an operation name are aggregated.
pub const UNNAMED_OPERATION: &str = "unknown";

/// Running totals for one operation, updated once per logged entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMetrics {
    pub operation_name: String,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub last_executed: DateTime<Utc>,
}

impl OperationMetrics {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            avg_duration_ms: 0.0,
            min_duration_ms: 0,
            max_duration_ms: 0,
            last_executed: Utc::now(),
        }
    }

    /// Folds one entry into the aggregate in constant time.
    pub fn record(&mut self, entry: &RequestLogEntry) {
        let duration = entry.duration_ms;

        if self.total_calls == 0 {
            self.min_duration_ms = duration;
            self.max_duration_ms = duration;
        } else {
            self.min_duration_ms = self.min_duration_ms.min(duration);
            self.max_duration_ms = self.max_duration_ms.max(duration);
        }

        self.total_calls += 1;
        if entry.is_success() {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
        }

        // Incremental mean
        self.avg_duration_ms += (duration as f64 - self.avg_duration_ms) / self.total_calls as f64;
        self.last_executed = entry.timestamp;
    }

    /// Fraction of calls that succeeded, 0.0 before the first call.
    #[cfg(test)]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(duration_ms: u64, status: u16) -> RequestLogEntry {
        RequestLogEntry {
            correlation_id: "1-1".to_string(),
            timestamp: Utc::now(),
            operation_name: Some("search".to_string()),
            method: "GET".to_string(),
            url: "http://localhost/search".to_string(),
            headers: BTreeMap::new(),
            request_body: None,
            status_code: Some(status),
            response_body: None,
            error: None,
            duration_ms,
            rate_limit_info: None,
        }
    }

    #[test]
    fn test_new_metrics_are_empty() {
        let metrics = OperationMetrics::new("search");
        assert_eq!(metrics.total_calls, 0);
        assert_eq!(metrics.success_rate(), 0.0);
    }

    #[test]
    fn test_record_updates_all_aggregates() {
        let mut metrics = OperationMetrics::new("search");

        metrics.record(&entry(100, 200));
        metrics.record(&entry(300, 200));
        metrics.record(&entry(50, 500));

        assert_eq!(metrics.total_calls, 3);
        assert_eq!(metrics.successful_calls, 2);
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.min_duration_ms, 50);
        assert_eq!(metrics.max_duration_ms, 300);
        assert!((metrics.avg_duration_ms - 150.0).abs() < 1e-9);
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_record_sets_min_and_max() {
        let mut metrics = OperationMetrics::new("search");
        metrics.record(&entry(42, 200));
        assert_eq!(metrics.min_duration_ms, 42);
        assert_eq!(metrics.max_duration_ms, 42);
        assert_eq!(metrics.avg_duration_ms, 42.0);
    }
}
