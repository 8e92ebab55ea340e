use std::time::Duration;

use crate::config::RetryConfig;

/// Why a page fetch failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    /// 429 or 503 from the source or the proxy in front of it.
    Throttled,
    Connection,
    Http5xx(u16),
    /// 4xx, cancellation and anything else; never retried.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Per-page retry budget with capped exponential backoff.
///
/// The default allows one attempt, so a failed page is handed back to the
/// pool and abandoned there. Throttled responses wait twice as long as other
/// retryable failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per page, first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        let delay = match kind {
            ErrorKind::Other => return RetryDecision::NoRetry,
            ErrorKind::Throttled => self.backoff(attempt).saturating_mul(2),
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Http5xx(_) => {
                self.backoff(attempt)
            }
        };
        RetryDecision::RetryAfter(delay.min(self.max_delay))
    }

    /// base * 2^(attempt-1), exponent capped at 8.
    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(8);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}
