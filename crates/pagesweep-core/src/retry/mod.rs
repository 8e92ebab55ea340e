//! Retry and backoff policy for page fetches.
//!
//! Classifies transport failures (timeouts, throttling, connection errors)
//! and decides exponential backoff. The default policy makes a single
//! attempt, so a failed page is abandoned unless retries are configured.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
