//! Proxy listing module
//!
//! This module provides functionality for:
//! - Extracting proxy rows from rendered listing pages
//! - Formatting rows into proxy URIs
//! - Crawling paginated listings until they run dry or block us

pub mod crawler;
pub mod extractor;
pub mod models;

pub use crawler::{CrawlResult, CrawlStop, ListingCrawler};
pub use extractor::ListingExtractor;
pub use models::{PageExtract, PageStatus, ProxyRecord};
