//! Session supersession: at most one live aggregation per manager.
//!
//! Starting a session always cancels the one currently held, whatever its
//! key. The cancel-then-replace step runs under one lock so two near
//! simultaneous requests cannot both end up live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::{CollectionCache, PageCache};
use crate::config::SweepConfig;
use crate::error::SweepError;
use crate::fetcher::PageFetcher;
use crate::parser::PageParser;
use crate::progress::ProgressCallback;
use crate::record::CollectionKey;
use crate::retry::RetryPolicy;
use crate::session::{AggregationSession, Outcome, SessionHandle, SessionSettings};
use crate::transport::PageTransport;

/// Per-call options for [`SessionManager::aggregate`].
#[derive(Clone, Default)]
pub struct AggregateOptions {
    /// Worker count for this call; the manager's setting (default 3) when `None`.
    pub concurrency: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
}

impl AggregateOptions {
    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

/// Owns the caches and the single live session slot.
pub struct SessionManager {
    fetcher: PageFetcher,
    parser: Arc<dyn PageParser>,
    collections: Arc<CollectionCache>,
    settings: SessionSettings,
    current: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn PageTransport>,
        parser: Arc<dyn PageParser>,
        settings: SessionSettings,
    ) -> Self {
        Self::with_caches(
            PageFetcher::new(transport, Arc::new(PageCache::new())),
            parser,
            Arc::new(CollectionCache::new()),
            settings,
        )
    }

    /// Build from config: session settings and retry policy come from `cfg`.
    pub fn from_config(
        cfg: &SweepConfig,
        transport: Arc<dyn PageTransport>,
        parser: Arc<dyn PageParser>,
    ) -> Self {
        let retry = cfg.retry.as_ref().map(RetryPolicy::from).unwrap_or_default();
        Self::with_caches(
            PageFetcher::new(transport, Arc::new(PageCache::new())).with_retry(retry),
            parser,
            Arc::new(CollectionCache::new()),
            SessionSettings::from(cfg),
        )
    }

    pub fn with_caches(
        fetcher: PageFetcher,
        parser: Arc<dyn PageParser>,
        collections: Arc<CollectionCache>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            fetcher,
            parser,
            collections,
            settings,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn page_cache(&self) -> &Arc<PageCache> {
        self.fetcher.cache()
    }

    pub fn collection_cache(&self) -> &Arc<CollectionCache> {
        &self.collections
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Cancel whatever session is live and register a new one for `key`.
    pub fn start_session(&self, key: CollectionKey) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle::new(id, key);
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(handle.clone()) {
            previous.cancel();
            tracing::info!(
                previous = previous.id(),
                previous_key = %previous.key(),
                session = id,
                key = %handle.key(),
                "superseded live session"
            );
        }
        handle
    }

    /// Cancel the live session, if any, without starting another.
    pub fn cancel_current(&self) -> bool {
        let taken = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(handle) => {
                handle.cancel();
                tracing::info!(session = handle.id(), key = %handle.key(), "session cancelled by caller");
                true
            }
            None => false,
        }
    }

    /// Handle of the live session, if any.
    pub fn current(&self) -> Option<SessionHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the slot if it still holds `handle`, and retire its token.
    fn finish(&self, handle: &SessionHandle) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().map(SessionHandle::id) == Some(handle.id()) {
            *current = None;
        }
        handle.cancel();
    }

    /// Load every record of `key`.
    ///
    /// Supersedes any live session. A complete cached result is returned
    /// without I/O; otherwise a new session runs. `Outcome::Cancelled` means
    /// another call (or [`cancel_current`](Self::cancel_current)) took over.
    pub async fn aggregate(
        &self,
        key: CollectionKey,
        options: AggregateOptions,
    ) -> Result<Outcome, SweepError> {
        let handle = self.start_session(key.clone());

        if let Some(cached) = self.collections.get(&key) {
            tracing::debug!(session = handle.id(), key = %key, "collection cache hit");
            self.finish(&handle);
            return Ok(Outcome::Completed(cached));
        }

        let mut settings = self.settings;
        if let Some(n) = options.concurrency {
            settings.concurrency = n.max(1);
        }
        let session = AggregationSession::new(
            handle.clone(),
            self.fetcher.clone(),
            Arc::clone(&self.parser),
            Arc::clone(&self.collections),
            settings,
        );
        let res = session.run(options.on_progress).await;
        self.finish(&handle);
        res
    }
}
