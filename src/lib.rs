//! Subharvest - proxy subscription and listing collector
//!
//! Fetches converted subscription bodies and paginated free-proxy listings,
//! formats the scraped rows into proxy URIs and merges the resulting files
//! into deduplicated feeds under a `configs/` directory.

pub mod config;
pub mod fetch;
pub mod jobs;
pub mod logging;
pub mod proxy;

pub use config::JobConfig;
pub use fetch::{FetchError, FetcherConfig, HttpFetcher, PageFetcher};
pub use jobs::{Job, Orchestrator, RunOptions};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
