//! One end-to-end aggregation attempt for a collection key.
//!
//! Page 1 is fetched directly so a wholly empty collection never starts the
//! pool; the remaining pages go through [`run_pool`]. Results reach the
//! collection cache only when the session was never cancelled and no page
//! was abandoned.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::cache::CollectionCache;
use crate::config::SweepConfig;
use crate::error::{FetchError, SweepError};
use crate::fetcher::PageFetcher;
use crate::parser::PageParser;
use crate::pool::{run_pool, PoolParams};
use crate::progress::{Estimate, ProgressCallback, ProgressReporter};
use crate::record::{AggregationResult, CollectionKey, Completeness, PageKey, Record};

/// Lifecycle of a session. `Empty`, `Completed`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    FetchingFirstPage,
    Empty,
    Populating,
    Merging,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::FetchingFirstPage => "fetching-first-page",
            SessionState::Empty => "empty",
            SessionState::Populating => "populating",
            SessionState::Merging => "merging",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a session ended, when it did not fail.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// All pages loaded (or the collection is empty). Check
    /// [`AggregationResult::completeness`] for abandoned pages.
    Completed(AggregationResult),
    /// Superseded or cancelled before results were committed.
    Cancelled,
}

impl Outcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn result(&self) -> Option<&AggregationResult> {
        match self {
            Outcome::Completed(r) => Some(r),
            Outcome::Cancelled => None,
        }
    }

    pub fn into_result(self) -> Option<AggregationResult> {
        match self {
            Outcome::Completed(r) => Some(r),
            Outcome::Cancelled => None,
        }
    }
}

/// Knobs shared by every session a manager starts.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub concurrency: usize,
    pub empty_page_threshold: u32,
    pub failure_backoff: Duration,
    pub progress_interval: Duration,
    pub estimate_pages: usize,
    pub estimate_headroom: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SessionSettings {
    fn from(cfg: &SweepConfig) -> Self {
        Self {
            concurrency: cfg.concurrency.max(1),
            empty_page_threshold: cfg.empty_page_threshold.max(1),
            failure_backoff: cfg.failure_backoff(),
            progress_interval: cfg.progress_interval(),
            estimate_pages: cfg.estimate_pages,
            estimate_headroom: cfg.estimate_headroom,
        }
    }
}

/// Identity and cancellation token of one session. Cloning shares the token.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    key: CollectionKey,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn new(id: u64, key: CollectionKey) -> Self {
        Self {
            id,
            key,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A single aggregation run. Dropping it cancels its token, so nothing it
/// started can outlive it.
pub struct AggregationSession {
    handle: SessionHandle,
    fetcher: PageFetcher,
    parser: Arc<dyn PageParser>,
    collections: Arc<CollectionCache>,
    settings: SessionSettings,
    state: SessionState,
}

impl AggregationSession {
    pub fn new(
        handle: SessionHandle,
        fetcher: PageFetcher,
        parser: Arc<dyn PageParser>,
        collections: Arc<CollectionCache>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            handle,
            fetcher,
            parser,
            collections,
            settings,
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            session = self.handle.id,
            key = %self.handle.key,
            "session {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    fn cancelled(&mut self) -> Outcome {
        self.transition(SessionState::Cancelled);
        tracing::info!(session = self.handle.id, key = %self.handle.key, "session cancelled");
        Outcome::Cancelled
    }

    /// Run the session to a terminal state.
    ///
    /// Returns `Err` only when page 1 fails; later page failures shorten the
    /// result instead. Cancellation at any point yields `Outcome::Cancelled`.
    pub async fn run(mut self, on_progress: Option<ProgressCallback>) -> Result<Outcome, SweepError> {
        let started = Instant::now();
        let key = self.handle.key.clone();
        let cancel = self.handle.cancel.clone();

        self.transition(SessionState::FetchingFirstPage);
        let raw = match self.fetcher.fetch(&PageKey::first(key.clone()), &cancel).await {
            Ok(raw) => raw,
            Err(FetchError::Cancelled) => return Ok(self.cancelled()),
            Err(source) => {
                self.transition(SessionState::Failed);
                tracing::warn!(session = self.handle.id, key = %key, "first page failed: {}", source);
                return Err(SweepError::FirstPage {
                    key: key.to_string(),
                    source,
                });
            }
        };
        let first: Arc<[Record]> = self.parser.parse(raw.as_str()).into();
        if cancel.is_cancelled() {
            return Ok(self.cancelled());
        }
        if first.is_empty() {
            self.transition(SessionState::Empty);
            tracing::info!(session = self.handle.id, key = %key, "collection is empty");
            return Ok(Outcome::Completed(AggregationResult::empty(key)));
        }

        self.transition(SessionState::Populating);
        let reporter = on_progress.map(|callback| {
            Arc::new(ProgressReporter::new(
                key.clone(),
                Arc::clone(&first),
                Estimate::from_first_page(
                    first.len(),
                    self.settings.estimate_pages,
                    self.settings.estimate_headroom,
                ),
                self.settings.progress_interval,
                callback,
            ))
        });
        if let Some(reporter) = &reporter {
            reporter.start();
        }

        let params = PoolParams {
            start_page: 2,
            concurrency: self.settings.concurrency,
            empty_page_threshold: self.settings.empty_page_threshold,
            failure_backoff: self.settings.failure_backoff,
        };
        let pool = run_pool(
            key.clone(),
            self.fetcher.clone(),
            Arc::clone(&self.parser),
            params,
            cancel.clone(),
            reporter.clone(),
        )
        .await;
        if cancel.is_cancelled() {
            return Ok(self.cancelled());
        }

        self.transition(SessionState::Merging);
        let mut records = Vec::with_capacity(first.len() + pool.records.len());
        records.extend_from_slice(&first);
        records.extend(pool.records);
        let completeness = if pool.pages_abandoned > 0 {
            Completeness::Partial
        } else {
            Completeness::Complete
        };
        let result = AggregationResult {
            key: key.clone(),
            records: records.into(),
            completeness,
        };

        // Checked under the cache lock so a superseded run cannot commit.
        let Some(cached) = self
            .collections
            .store_while(result.clone(), || !cancel.is_cancelled())
        else {
            return Ok(self.cancelled());
        };
        if let Some(reporter) = &reporter {
            reporter.finish(Arc::clone(&result.records), pool.pages_loaded + 1);
        }

        self.transition(SessionState::Completed);
        tracing::info!(
            session = self.handle.id,
            key = %key,
            records = result.len(),
            pages = pool.pages_loaded + 1,
            abandoned = pool.pages_abandoned,
            last_claimed = pool.last_claimed,
            cached,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session completed"
        );
        Ok(Outcome::Completed(result))
    }
}

impl Drop for AggregationSession {
    fn drop(&mut self) {
        self.handle.cancel.cancel();
    }
}
