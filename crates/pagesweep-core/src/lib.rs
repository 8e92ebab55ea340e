//! pagesweep core: bounded-concurrency aggregation of paginated sources.
//!
//! Pipeline: [`manager::SessionManager`] → [`session::AggregationSession`]
//! (page 1) → [`pool::run_pool`] (pages 2..) → [`fetcher::PageFetcher`] →
//! [`transport::PageTransport`], with [`parser::PageParser`] turning payloads
//! into [`record::Record`]s.

pub mod config;
pub mod logging;

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod manager;
pub mod parser;
pub mod pool;
pub mod progress;
pub mod record;
pub mod retry;
pub mod session;
pub mod transport;

pub use error::{FetchError, SweepError};
pub use manager::{AggregateOptions, SessionManager};
pub use record::{AggregationResult, CollectionKey, Completeness, PageKey, RawPage, Record};
pub use session::{Outcome, SessionState};
