//! Request Log Module
//!
//! Records every outbound attempt with redacted headers, keeps a bounded
//! in-memory history with per-operation metrics, and optionally mirrors
//! entries to rotating JSON-lines files.

mod entry;
mod file;
mod logger;
mod metrics;

pub use entry::{
    redact_headers, truncate_body, PendingRequest, RateLimitInfo, RequestLogEntry,
    MAX_LOGGED_BODY_BYTES, REDACTED,
};
pub use file::{
    cleanup_old_files, prepare_log_directory, LogFileError, LogFileWriter, RetentionPolicy,
    LOG_FILE_EXTENSION, LOG_FILE_PREFIX,
};
pub use logger::{LogFilter, RequestLogger};
pub use metrics::{OperationMetrics, UNNAMED_OPERATION};
