//! In-memory transport driven by a per-page script, recording every call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use pagesweep_core::transport::PageTransport;
use pagesweep_core::{CollectionKey, FetchError, PageKey, RawPage, Record};

/// Behaviour of one page. Pages without a script are empty.
#[derive(Debug, Clone, Copy)]
pub enum PageScript {
    Records(usize),
    /// `Records(n)` delivered after a delay in milliseconds, so fetches overlap.
    Slow(usize, u64),
    Empty,
    Fail,
    /// Block until the session is cancelled.
    Hang,
}

#[derive(Default)]
pub struct ScriptedTransport {
    pages: HashMap<(String, u32), PageScript>,
    calls: Mutex<Vec<PageKey>>,
    /// Signalled whenever a `Hang` page starts blocking.
    pub hung: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, key: &str, page: u32, script: PageScript) -> Self {
        self.pages.insert((key.to_string(), page), script);
        self
    }

    pub fn pages(mut self, key: &str, pages: std::ops::RangeInclusive<u32>, script: PageScript) -> Self {
        for page in pages {
            self.pages.insert((key.to_string(), page), script);
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Page numbers requested for `key`, sorted.
    pub fn pages_requested(&self, key: &str) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.collection().as_str() == key)
            .map(PageKey::page)
            .collect();
        pages.sort_unstable();
        pages
    }
}

#[async_trait]
impl PageTransport for ScriptedTransport {
    async fn get(&self, key: &PageKey, cancel: &CancellationToken) -> Result<RawPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        self.calls.lock().unwrap().push(key.clone());
        let script = self
            .pages
            .get(&(key.collection().as_str().to_string(), key.page()))
            .copied()
            .unwrap_or(PageScript::Empty);
        match script {
            PageScript::Records(n) => Ok(RawPage::from(payload(key.collection(), key.page(), n))),
            PageScript::Slow(n, ms) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                        Ok(RawPage::from(payload(key.collection(), key.page(), n)))
                    }
                }
            }
            PageScript::Empty => Ok(RawPage::from("")),
            PageScript::Fail => Err(FetchError::Network("connection reset by peer".into())),
            PageScript::Hang => {
                self.hung.notify_one();
                cancel.cancelled().await;
                Err(FetchError::Cancelled)
            }
        }
    }
}

/// One line per record: `<key>-p<page>-r<index>`.
pub fn payload(key: &CollectionKey, page: u32, n: usize) -> String {
    (0..n)
        .map(|i| record_name(key.as_str(), page, i))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn record_name(key: &str, page: u32, index: usize) -> String {
    format!("{}-p{}-r{}", key, page, index)
}

/// Parser for [`payload`]: one record per non-blank line.
pub fn parse_lines(payload: &str) -> Vec<Record> {
    payload
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| Record {
            ordinal: (i + 1).to_string(),
            name: line.to_string(),
            ..Record::default()
        })
        .collect()
}

/// Expected record names for `key` over `(page, count)` pairs, in order.
pub fn expected_names(key: &str, pages: &[(u32, usize)]) -> Vec<String> {
    pages
        .iter()
        .flat_map(|&(page, n)| (0..n).map(move |i| record_name(key, page, i)))
        .collect()
}
