//! Bearer token supply.
//!
//! Obtaining and refreshing tokens is someone else's job; the client only
//! asks for the current one before each attempt.

/// Provides the access token sent as `Authorization: Bearer <token>`.
pub trait TokenSource: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated.
    fn access_token(&self) -> Option<String>;
}

/// A token fixed at startup, typically from `API_ACCESS_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticToken {
    fn from(token: Option<String>) -> Self {
        Self(token.filter(|token| !token.is_empty()))
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}
