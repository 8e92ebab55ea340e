use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per page (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 10,
        }
    }
}

/// How pages are requested from the remote source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Page URL with `{key}` and `{page}` placeholders.
    pub url_template: String,
    /// Optional proxy wrapper; `{url}` receives the percent-encoded page URL.
    #[serde(default)]
    pub proxy_template: Option<String>,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url_template: "https://benhandientu.moh.gov.vn/?page={page}&province_id={key}"
                .to_string(),
            proxy_template: Some("https://api.allorigins.win/raw?url={url}".to_string()),
            connect_timeout_secs: 15,
            timeout_secs: 30,
        }
    }
}

/// CSS selectors for the HTML table parser. Missing fields use built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub row: String,
    pub ordinal: String,
    pub date: String,
    pub image: String,
    pub name: String,
    pub link: String,
    pub document: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            row: "div.table-benhvien table tbody tr".to_string(),
            ordinal: "td.text-center".to_string(),
            date: "td span.date".to_string(),
            image: "td img".to_string(),
            name: "td h3.name".to_string(),
            link: "td a.website".to_string(),
            document: "td a.product-datasets__label".to_string(),
        }
    }
}

/// Global configuration loaded from `~/.config/pagesweep/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Number of concurrent page workers per aggregation.
    pub concurrency: usize,
    /// Empty pages that end an aggregation when no non-empty page numbered
    /// above them has been seen.
    pub empty_page_threshold: u32,
    /// Pause after a failed page before the worker stops.
    pub failure_backoff_ms: u64,
    /// Minimum interval between progress callbacks.
    pub progress_interval_ms: u64,
    /// Initial total estimate = records on page 1 * `estimate_pages`.
    pub estimate_pages: usize,
    /// The estimate never drops below loaded + `estimate_headroom`.
    pub estimate_headroom: usize,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Optional retry policy; if missing, each page gets a single attempt.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub parser: ParserConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            empty_page_threshold: 2,
            failure_backoff_ms: 100,
            progress_interval_ms: 300,
            estimate_pages: 10,
            estimate_headroom: 50,
            transport: TransportConfig::default(),
            retry: None,
            parser: ParserConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Pretty TOML, as written to the config file.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pagesweep")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SweepConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] with an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<SweepConfig> {
    if !path.exists() {
        let default_cfg = SweepConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: SweepConfig = toml::from_str(&data)?;
    Ok(cfg)
}
