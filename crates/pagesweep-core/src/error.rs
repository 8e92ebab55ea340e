//! Error types for page fetches and aggregation sessions.

use thiserror::Error;

/// Failure of a single page fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, reset).
    #[error("network error: {0}")]
    Network(String),
    /// Connect or transfer timeout.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Response arrived with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// The session's token was cancelled before or during the fetch.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        if e.is_aborted_by_callback() {
            return FetchError::Cancelled;
        }
        if e.is_operation_timedout() {
            return FetchError::Timeout(e.to_string());
        }
        FetchError::Network(e.to_string())
    }
}

/// Terminal failure of an aggregation session.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Page 1 could not be fetched; nothing can be aggregated.
    #[error("first page of {key} failed: {source}")]
    FirstPage {
        key: String,
        #[source]
        source: FetchError,
    },
}

impl SweepError {
    /// Generic retryable message for end users.
    pub fn user_message(&self) -> &'static str {
        "Failed to load data. Please try again later."
    }
}
