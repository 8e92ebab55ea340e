//! Page transport: how one page payload is retrieved from the remote source.
//!
//! `CurlTransport` issues a GET through libcurl on tokio's blocking pool. The
//! session's cancellation token is checked from curl's progress callback, so a
//! cancelled session aborts its in-flight transfers instead of waiting them out.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::error::FetchError;
use crate::record::{PageKey, RawPage};

/// Retrieves raw page payloads. Implementations must return
/// `FetchError::Cancelled` once `cancel` fires.
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn get(&self, key: &PageKey, cancel: &CancellationToken) -> Result<RawPage, FetchError>;
}

/// HTTP GET via libcurl. The page URL comes from a template with `{key}` and
/// `{page}` placeholders, optionally wrapped in a proxy template (`{url}`).
#[derive(Debug, Clone)]
pub struct CurlTransport {
    url_template: String,
    proxy_template: Option<String>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl CurlTransport {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            proxy_template: None,
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(cfg: &TransportConfig) -> Self {
        Self {
            url_template: cfg.url_template.clone(),
            proxy_template: cfg.proxy_template.clone(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy_template: impl Into<String>) -> Self {
        self.proxy_template = Some(proxy_template.into());
        self
    }

    /// Final request URL for a page.
    pub fn page_url(&self, key: &PageKey) -> String {
        let target = self
            .url_template
            .replace("{key}", &encode(key.collection().as_str()))
            .replace("{page}", &key.page().to_string());
        match &self.proxy_template {
            Some(proxy) => proxy.replace("{url}", &encode(&target)),
            None => target,
        }
    }
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[async_trait]
impl PageTransport for CurlTransport {
    async fn get(&self, key: &PageKey, cancel: &CancellationToken) -> Result<RawPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let url = self.page_url(key);
        let connect_timeout = self.connect_timeout;
        let timeout = self.timeout;
        let abort = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            perform_get(&url, connect_timeout, timeout, &abort)
        });

        tokio::select! {
            // The blocking transfer sees the same token and aborts on its own.
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            res = task => match res {
                Ok(body) => body.map(|b| RawPage::from(String::from_utf8_lossy(&b).into_owned())),
                Err(e) => Err(FetchError::Network(format!("fetch task: {}", e))),
            },
        }
    }
}

/// Blocking GET; runs on the blocking pool.
fn perform_get(
    url: &str,
    connect_timeout: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(connect_timeout)?;
    easy.timeout(timeout)?;
    easy.progress(true)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }
    Ok(body)
}
