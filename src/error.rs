//! Error types for the API client layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Client Error Enum ==
/// Errors surfaced to callers of the API client.
///
/// Cache rejections and request-log file failures never appear here; both are
/// handled locally and only reported through `tracing`.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network-level failure (connect, timeout, body read)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote API kept throttling after every retry
    #[error("Rate limited by remote API after {attempts} attempts")]
    Throttled {
        attempts: u32,
        /// Seconds from the last `Retry-After` header, if any
        retry_after: Option<u64>,
    },

    /// Credentials were rejected; re-authentication is required
    #[error("Authentication failed with status {status}, re-authentication required")]
    Auth { status: u16 },

    /// Any other non-success status
    #[error("Remote API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The caller supplied unusable parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// HTTP status reported by the remote API, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport(e) => e.status().map(|status| status.as_u16()),
            ClientError::Throttled { .. } => Some(429),
            ClientError::Auth { status } | ClientError::Api { status, .. } => Some(*status),
            ClientError::InvalidRequest(_) | ClientError::Internal(_) => None,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, ClientError::Throttled { .. })
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        let status = match &self {
            ClientError::Transport(_) => StatusCode::BAD_GATEWAY,
            ClientError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            ClientError::Auth { .. } => StatusCode::UNAUTHORIZED,
            ClientError::Api { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|status| status.is_client_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ClientError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ClientError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the client layer.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ClientError::Auth { status: 403 }.status(), Some(403));
        assert_eq!(
            ClientError::Throttled { attempts: 4, retry_after: None }.status(),
            Some(429)
        );
        assert_eq!(ClientError::InvalidRequest("x".into()).status(), None);
    }

    #[test]
    fn test_into_response_mapping() {
        let cases = [
            (ClientError::Auth { status: 401 }, StatusCode::UNAUTHORIZED),
            (
                ClientError::Throttled { attempts: 4, retry_after: Some(10) },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ClientError::Api { status: 404, message: "missing".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                ClientError::Api { status: 503, message: "down".into() },
                StatusCode::BAD_GATEWAY,
            ),
            (ClientError::InvalidRequest("empty".into()), StatusCode::BAD_REQUEST),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
