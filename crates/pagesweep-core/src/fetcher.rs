//! Page fetcher: one page payload through the page cache.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::PageCache;
use crate::error::FetchError;
use crate::record::{PageKey, RawPage};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::transport::PageTransport;

/// Fetches pages through a shared [`PageCache`]. A cache hit never touches
/// the transport; a miss performs one transport call per attempt and stores
/// the payload before returning it.
#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn PageTransport>,
    cache: Arc<PageCache>,
    retry: RetryPolicy,
}

impl PageFetcher {
    pub fn new(transport: Arc<dyn PageTransport>, cache: Arc<PageCache>) -> Self {
        Self {
            transport,
            cache,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    pub async fn fetch(&self, key: &PageKey, cancel: &CancellationToken) -> Result<RawPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if let Some(hit) = self.cache.get(key) {
            tracing::trace!(page = %key, "page cache hit");
            return Ok(hit);
        }

        let payload = if self.retry.retries_enabled() {
            run_with_retry(&self.retry, cancel, || self.transport.get(key, cancel)).await?
        } else {
            self.transport.get(key, cancel).await?
        };
        self.cache.put(key.clone(), payload.clone());
        // Cancelled while the response was in flight: keep the payload, report the cancel.
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(payload)
    }
}
