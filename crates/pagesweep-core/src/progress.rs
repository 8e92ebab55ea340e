//! Progress reporting for aggregations (records loaded, running estimate).
//!
//! The pool reports after every non-empty page; [`ProgressReporter`] rate-limits
//! those reports to one callback per interval and always delivers the final
//! state when the session completes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::record::{CollectionKey, Record};

/// Callback invoked with progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Snapshot of an aggregation in progress.
#[derive(Debug, Clone)]
pub struct Progress {
    pub key: CollectionKey,
    /// Page 1 followed by every page loaded so far, in page order.
    pub records: Arc<[Record]>,
    /// Running estimate of the final record count.
    pub estimated_total: usize,
    /// Non-empty pages loaded so far, page 1 included.
    pub pages_loaded: u32,
    pub elapsed: Duration,
    /// True only for the last snapshot of a completed session.
    pub finished: bool,
}

impl Progress {
    pub fn loaded(&self) -> usize {
        self.records.len()
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.finished || self.estimated_total == 0 {
            return 1.0;
        }
        (self.loaded() as f64 / self.estimated_total as f64).min(1.0)
    }
}

/// Rough total estimate: page-1 size times an assumed page count, never less
/// than what is already loaded plus some headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    initial: usize,
    headroom: usize,
}

impl Estimate {
    pub fn from_first_page(first_page_len: usize, assumed_pages: usize, headroom: usize) -> Self {
        Self {
            initial: first_page_len.saturating_mul(assumed_pages),
            headroom,
        }
    }

    pub fn total_for(&self, loaded: usize) -> usize {
        self.initial.max(loaded.saturating_add(self.headroom))
    }
}

/// At most one `try_acquire` success per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(t) if now.duration_since(t) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Builds snapshots for one session and forwards them to the caller's callback.
pub struct ProgressReporter {
    key: CollectionKey,
    first_page: Arc<[Record]>,
    estimate: Estimate,
    throttle: ProgressThrottle,
    started: Instant,
    callback: ProgressCallback,
}

impl ProgressReporter {
    pub fn new(
        key: CollectionKey,
        first_page: Arc<[Record]>,
        estimate: Estimate,
        interval: Duration,
        callback: ProgressCallback,
    ) -> Self {
        Self {
            key,
            first_page,
            estimate,
            throttle: ProgressThrottle::new(interval),
            started: Instant::now(),
            callback,
        }
    }

    /// Report pool progress. `pool_records` is only evaluated when the
    /// throttle lets this report through.
    pub fn report<F>(&self, pool_pages: u32, pool_records: F)
    where
        F: FnOnce() -> Vec<Record>,
    {
        if !self.throttle.try_acquire() {
            return;
        }
        self.emit(pool_pages, pool_records());
    }

    /// Page-1 snapshot sent before the pool starts. Bypasses the throttle so
    /// the first pool page is still reported.
    pub fn start(&self) {
        self.emit(0, Vec::new());
    }

    fn emit(&self, pool_pages: u32, rest: Vec<Record>) {
        let mut records = Vec::with_capacity(self.first_page.len() + rest.len());
        records.extend_from_slice(&self.first_page);
        records.extend(rest);
        let loaded = records.len();
        (self.callback)(&Progress {
            key: self.key.clone(),
            records: records.into(),
            estimated_total: self.estimate.total_for(loaded),
            pages_loaded: pool_pages + 1,
            elapsed: self.started.elapsed(),
            finished: false,
        });
    }

    /// Deliver the final state, bypassing the throttle.
    pub fn finish(&self, records: Arc<[Record]>, pages_loaded: u32) {
        (self.callback)(&Progress {
            key: self.key.clone(),
            estimated_total: records.len(),
            records,
            pages_loaded,
            elapsed: self.started.elapsed(),
            finished: true,
        });
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
    fn estimate_keeps_headroom() {
        let e = Estimate::from_first_page(20, 10, 50);
        assert_eq!(e.total_for(20), 200);
        assert_eq!(e.total_for(180), 230);
        assert_eq!(Estimate::from_first_page(0, 10, 50).total_for(0), 50);
    }

    #[test]
    fn throttle_allows_one_per_interval() {
        let t = ProgressThrottle::new(Duration::from_secs(3600));
        assert!(t.try_acquire());
        assert!(!t.try_acquire());
        let zero = ProgressThrottle::new(Duration::ZERO);
        assert!(zero.try_acquire());
        assert!(zero.try_acquire());
    }

    #[test]
    fn reporter_throttles_but_always_finishes() {
        let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(
            CollectionKey::new("k"),
            Arc::from(vec![rec("a")]),
            Estimate::from_first_page(1, 10, 50),
            Duration::from_secs(3600),
            Arc::new(move |p: &Progress| sink.lock().unwrap().push(p.clone())),
        );

        let mut evaluated = 0;
        reporter.report(1, || {
            evaluated += 1;
            vec![rec("b")]
        });
        reporter.report(2, || {
            evaluated += 1;
            vec![rec("b"), rec("c")]
        });
        assert_eq!(evaluated, 1);

        reporter.finish(Arc::from(vec![rec("a"), rec("b"), rec("c")]), 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].loaded(), 2);
        assert_eq!(seen[0].pages_loaded, 2);
        assert_eq!(seen[0].estimated_total, 52);
        assert!(!seen[0].finished);
        assert!(seen[1].finished);
        assert_eq!(seen[1].loaded(), 3);
        assert_eq!(seen[1].fraction(), 1.0);
    }

    #[test]
    fn start_leaves_throttle_window_open() {
        let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(
            CollectionKey::new("k"),
            Arc::from(vec![rec("a")]),
            Estimate::from_first_page(1, 10, 50),
            Duration::from_secs(3600),
            Arc::new(move |p: &Progress| sink.lock().unwrap().push(p.clone())),
        );

        reporter.start();
        reporter.report(1, || vec![rec("b")]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].loaded(), 1);
        assert_eq!(seen[0].pages_loaded, 1);
        assert_eq!(seen[1].loaded(), 2);
        assert_eq!(seen[1].pages_loaded, 2);
    }
}
