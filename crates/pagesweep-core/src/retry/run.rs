//! Retry loop: run an async fetch until success, cancellation, or the policy says stop.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::error::FetchError;

/// Runs `f` until it succeeds or the retry policy says to stop.
/// Backoff sleeps are raced against `cancel`; a cancellation during backoff
/// returns `FetchError::Cancelled`.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, delay_ms = d.as_millis() as u64, "retrying after {}", e);
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                            _ = tokio::time::sleep(d) => {}
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}
