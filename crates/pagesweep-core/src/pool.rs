//! Pagination worker pool.
//!
//! Up to `concurrency` tokio tasks claim increasing page numbers from one
//! shared atomic counter, fetch and parse them, and append non-empty pages to
//! a shared accumulation. A worker stops at its first empty page; once
//! `empty_page_threshold` empty pages have been seen with no non-empty page
//! claimed after them, a global stop flag tells the remaining workers not to
//! claim more. Runs are counted by page number, not by completion order, so a
//! slow non-empty page below the highest empty page does not reset the run.
//! A failed page is abandoned: the worker backs off briefly and stops, and
//! pages already loaded are kept.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use crate::parser::PageParser;
use crate::progress::ProgressReporter;
use crate::record::{CollectionKey, PageKey, Record};

/// Tuning for one pool run.
#[derive(Debug, Clone, Copy)]
pub struct PoolParams {
    /// First page to claim (2 when page 1 was fetched by the session).
    pub start_page: u32,
    pub concurrency: usize,
    pub empty_page_threshold: u32,
    pub failure_backoff: Duration,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            start_page: 2,
            concurrency: 3,
            empty_page_threshold: 2,
            failure_backoff: Duration::from_millis(100),
        }
    }
}

/// What the pool accumulated from `start_page` onward.
#[derive(Debug, Clone, Default)]
pub struct PoolOutput {
    /// Records sorted by page number, document order within a page.
    pub records: Vec<Record>,
    /// Non-empty pages loaded.
    pub pages_loaded: u32,
    /// Pages given up on after a transport error.
    pub pages_abandoned: u32,
    /// Highest page number handed to a worker (`start_page - 1` if none).
    pub last_claimed: u32,
}

/// Current run of empty pages.
#[derive(Debug, Default)]
struct EmptyRun {
    count: u32,
    /// Highest empty page counted in this run (0 = none).
    highest: u32,
}

impl EmptyRun {
    /// Count an empty page; returns the run length.
    fn empty(&mut self, page: u32) -> u32 {
        self.count += 1;
        self.highest = self.highest.max(page);
        self.count
    }

    /// A non-empty page ends the run only if it lies past every empty page
    /// counted so far.
    fn non_empty(&mut self, page: u32) {
        if page > self.highest {
            *self = EmptyRun::default();
        }
    }
}

struct Shared {
    next_page: AtomicU32,
    empty_run: Mutex<EmptyRun>,
    stop: AtomicBool,
    abandoned: AtomicU32,
    pages: Mutex<Vec<(u32, Vec<Record>)>>,
}

impl Shared {
    fn new(start_page: u32) -> Self {
        Self {
            next_page: AtomicU32::new(start_page.max(1)),
            empty_run: Mutex::new(EmptyRun::default()),
            stop: AtomicBool::new(false),
            abandoned: AtomicU32::new(0),
            pages: Mutex::new(Vec::new()),
        }
    }

    fn empty_run(&self) -> std::sync::MutexGuard<'_, EmptyRun> {
        self.empty_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pages(&self) -> std::sync::MutexGuard<'_, Vec<(u32, Vec<Record>)>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flattened records of the pages loaded so far, in page order.
    fn snapshot(&self) -> Vec<Record> {
        let mut pages: Vec<(u32, Vec<Record>)> = self.pages().clone();
        flatten_sorted(&mut pages)
    }
}

fn flatten_sorted(pages: &mut Vec<(u32, Vec<Record>)>) -> Vec<Record> {
    pages.sort_by_key(|(page, _)| *page);
    pages.drain(..).flat_map(|(_, records)| records).collect()
}

/// Everything a worker needs; cloned once per worker.
#[derive(Clone)]
struct WorkerCtx {
    key: CollectionKey,
    fetcher: PageFetcher,
    parser: Arc<dyn PageParser>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressReporter>>,
    threshold: u32,
    failure_backoff: Duration,
}

/// Runs the pool to completion (all workers joined) and returns the
/// accumulated records. Never fails: page errors shorten the result and
/// cancellation just stops the workers.
pub async fn run_pool(
    key: CollectionKey,
    fetcher: PageFetcher,
    parser: Arc<dyn PageParser>,
    params: PoolParams,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressReporter>>,
) -> PoolOutput {
    let shared = Arc::new(Shared::new(params.start_page));
    let ctx = WorkerCtx {
        key,
        fetcher,
        parser,
        shared: Arc::clone(&shared),
        cancel,
        progress,
        threshold: params.empty_page_threshold.max(1),
        failure_backoff: params.failure_backoff,
    };

    let mut join_set = JoinSet::new();
    for worker in 0..params.concurrency.max(1) {
        join_set.spawn(run_worker(worker, ctx.clone()));
    }
    drop(ctx);

    while let Some(res) = join_set.join_next().await {
        if let Err(e) = res {
            tracing::error!("page worker join: {}", e);
        }
    }

    let mut pages = std::mem::take(&mut *shared.pages());
    let pages_loaded = pages.len() as u32;
    PoolOutput {
        records: flatten_sorted(&mut pages),
        pages_loaded,
        pages_abandoned: shared.abandoned.load(Ordering::Acquire),
        last_claimed: shared.next_page.load(Ordering::Acquire).saturating_sub(1),
    }
}

async fn run_worker(worker: usize, ctx: WorkerCtx) {
    let shared = &ctx.shared;
    loop {
        if shared.stop.load(Ordering::Acquire) || ctx.cancel.is_cancelled() {
            break;
        }
        let page = shared.next_page.fetch_add(1, Ordering::AcqRel);
        let Some(page_key) = PageKey::new(ctx.key.clone(), page) else {
            break;
        };

        match ctx.fetcher.fetch(&page_key, &ctx.cancel).await {
            Ok(raw) => {
                let records = ctx.parser.parse(raw.as_str());
                if records.is_empty() {
                    let seen = shared.empty_run().empty(page);
                    tracing::debug!(worker, page, seen, "empty page");
                    if seen >= ctx.threshold {
                        shared.stop.store(true, Ordering::Release);
                    }
                    break;
                }

                shared.empty_run().non_empty(page);
                tracing::debug!(worker, page, records = records.len(), "page loaded");
                let pages_loaded = {
                    let mut pages = shared.pages();
                    pages.push((page, records));
                    pages.len() as u32
                };
                if let Some(progress) = &ctx.progress {
                    progress.report(pages_loaded, || shared.snapshot());
                }
            }
            Err(FetchError::Cancelled) => break,
            Err(e) => {
                tracing::warn!(worker, page, "abandoning page: {}", e);
                shared.abandoned.fetch_add(1, Ordering::AcqRel);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {}
                    _ = tokio::time::sleep(ctx.failure_backoff) => {}
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str) -> Record {
        Record {
            name: name.to_string(),
            ..Record::default()
        }
    }

    #[test]
    fn flatten_orders_by_page_then_document() {
        let mut pages = vec![
            (4, vec![rec("d1")]),
            (2, vec![rec("b1"), rec("b2")]),
            (3, vec![rec("c1")]),
        ];
        let names: Vec<String> = flatten_sorted(&mut pages)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["b1", "b2", "c1", "d1"]);
        assert!(pages.is_empty());
    }

    #[test]
    fn late_lower_page_does_not_reset_empty_run() {
        let mut run = EmptyRun::default();
        assert_eq!(run.empty(4), 1);
        run.non_empty(2);
        run.non_empty(3);
        assert_eq!(run.empty(5), 2);
    }

    #[test]
    fn higher_page_resets_empty_run() {
        let mut run = EmptyRun::default();
        run.empty(4);
        run.non_empty(5);
        assert_eq!(run.empty(6), 1);
    }
}
