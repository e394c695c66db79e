//! Error taxonomy.
//!
//! `FeedError` is what a caller can see. `SourceError` describes why a single
//! source could not take part in a request; it is logged and counted by the
//! builder and never crosses the provider-set boundary.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The continuation token was never issued, or its session expired.
    #[error("page token not found or expired")]
    TokenNotFound,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("authentication error for {name}: {reason}")]
    MissingCredentials { name: String, reason: String },

    #[error("source misconfigured: {0}")]
    Misconfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{name} did not produce a first page within {after:?}")]
    Timeout { name: String, after: Duration },

    #[error("source task failed: {0}")]
    TaskFailed(String),
}

impl SourceError {
    pub fn missing_credentials(source: &str, reason: &str) -> Self {
        Self::MissingCredentials {
            name: source.to_string(),
            reason: reason.to_string(),
        }
    }
}
