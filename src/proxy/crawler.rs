//! Paginated listing scrape driver
//!
//! Walks a listing site page by page, strictly in order, and stops at the
//! first page that yields no proxy rows or cannot be fetched.

use crate::config::{ListingJob, ParamValue};
use crate::fetch::PageFetcher;
use crate::proxy::extractor::ListingExtractor;
use crate::proxy::models::PageStatus;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Query key carrying the page number
const PAGE_KEY: &str = "page";

/// Why a listing scrape stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStop {
    /// Every page up to the cap returned rows
    PageLimit,
    /// A page came back as an anti-bot interstitial
    Blocked { page: u32 },
    /// A page had no proxy rows
    Exhausted { page: u32 },
    /// A page could not be fetched
    FetchFailed { page: u32, error: String },
}

/// Result of scraping one listing job
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Name of the job that was crawled
    pub source: String,
    /// Formatted proxy URIs in page order
    pub proxies: Vec<String>,
    /// Number of pages that contributed rows
    pub pages: u32,
    /// Reason the page loop ended
    pub stop: CrawlStop,
}

impl CrawlResult {
    /// Check if the scrape ended without being blocked or failing
    pub fn is_clean(&self) -> bool {
        matches!(self.stop, CrawlStop::PageLimit | CrawlStop::Exhausted { .. })
    }
}

/// Drives the listing extractor over a bounded page range
pub struct ListingCrawler<'a> {
    fetcher: &'a dyn PageFetcher,
}

impl<'a> ListingCrawler<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Build the URL of one listing page
    ///
    /// An existing `page` parameter keeps its position, otherwise it is appended.
    pub fn page_url(base_url: &str, params: &[(String, ParamValue)], page: u32) -> Result<String> {
        let mut url = Url::parse(base_url)
            .with_context(|| format!("invalid listing URL: {}", base_url))?;
        let page = page.to_string();

        {
            let mut query = url.query_pairs_mut();
            let mut has_page = false;
            for (key, value) in params {
                if key == PAGE_KEY {
                    has_page = true;
                    query.append_pair(key, &page);
                } else {
                    query.append_pair(key, &value.to_string());
                }
            }
            if !has_page {
                query.append_pair(PAGE_KEY, &page);
            }
        }

        Ok(url.into())
    }

    /// Scrape pages `1..=max_pages` and collect the formatted proxies
    ///
    /// A page URL that cannot be built counts as a failed fetch.
    pub async fn crawl(&self, job: &ListingJob) -> CrawlResult {
        let mut proxies = Vec::new();
        let mut pages = 0;
        let mut stop = CrawlStop::PageLimit;

        for page in 1..=job.max_pages {
            let fetched = match Self::page_url(&job.base_url, &job.params, page) {
                Ok(url) => {
                    info!(job = %job.name, page, %url, "scraping listing page");
                    self.fetcher.fetch(&url).await.map_err(|e| e.to_string())
                }
                Err(e) => Err(format!("{:#}", e)),
            };

            let html = match fetched {
                Ok(html) => html,
                Err(error) => {
                    warn!(job = %job.name, page, %error, "listing page fetch failed");
                    stop = CrawlStop::FetchFailed { page, error };
                    break;
                }
            };

            let extract = ListingExtractor::extract_page(&html);
            if extract.status.is_terminal() {
                if extract.status == PageStatus::Blocked {
                    warn!(job = %job.name, page, "listing page blocked by firewall");
                    stop = CrawlStop::Blocked { page };
                } else {
                    info!(job = %job.name, page, "no proxy rows, assuming last page reached");
                    stop = CrawlStop::Exhausted { page };
                }
                break;
            }

            info!(job = %job.name, page, count = extract.records.len(), "scraped proxies");
            proxies.extend(extract.uris());
            pages += 1;
        }

        CrawlResult {
            source: job.name.clone(),
            proxies,
            pages,
            stop,
        }
    }

    /// Scrape a job and write its proxies to `out_dir/{file}`
    ///
    /// The file is written even when no proxies were found.
    pub async fn run(&self, job: &ListingJob, out_dir: &Path) -> Result<CrawlResult> {
        let result = self.crawl(job).await;
        let path = write_lines(out_dir, &job.file, &result.proxies)?;
        if !result.is_clean() {
            warn!(job = %job.name, stop = ?result.stop, "listing scrape ended early");
        }
        info!(
            job = %job.name,
            total = result.proxies.len(),
            pages = result.pages,
            path = %path.display(),
            "listing scrape finished"
        );
        Ok(result)
    }
}

/// Write lines joined by newlines, without a trailing newline
fn write_lines(out_dir: &Path, file: &str, lines: &[String]) -> Result<PathBuf> {
    let path = out_dir.join(file);
    debug!(path = %path.display(), lines = lines.len(), "writing listing output");
    fs::write(&path, lines.join("\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages keyed by URL and records every request
    struct StaticFetcher {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn new(pages: Vec<(String, String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn listing(ips: &[&str]) -> String {
        let rows: String = ips
            .iter()
            .map(|ip| {
                format!(
                    r#"<tr><td>{}</td><td>1080</td><td><a href="/?country=US">US</a></td><td>Dallas</td></tr>"#,
                    ip
                )
            })
            .collect();
        format!("<html><head><title>List</title></head><body><table>{}</table></body></html>", rows)
    }

    fn job(max_pages: u32) -> ListingJob {
        ListingJob {
            name: "fp".to_string(),
            base_url: "https://list.example/".to_string(),
            params: vec![("type".to_string(), ParamValue::Str("socks5".to_string()))],
            max_pages,
            file: "fp.txt".to_string(),
        }
    }

    fn url(page: u32) -> String {
        format!("https://list.example/?type=socks5&page={}", page)
    }

    #[test]
    fn test_page_url_appends_page() {
        let params = vec![
            ("type".to_string(), ParamValue::Str("socks5".to_string())),
            ("anonymity".to_string(), ParamValue::Int(4)),
        ];
        let built = ListingCrawler::page_url("https://list.example/", &params, 3).unwrap();
        assert_eq!(built, "https://list.example/?type=socks5&anonymity=4&page=3");
    }

    #[test]
    fn test_page_url_overrides_page_in_place() {
        let params = vec![
            ("page".to_string(), ParamValue::Int(9)),
            ("country".to_string(), ParamValue::Str("United States".to_string())),
        ];
        let built = ListingCrawler::page_url("https://list.example/", &params, 2).unwrap();
        assert_eq!(built, "https://list.example/?page=2&country=United+States");
    }

    #[test]
    fn test_page_url_invalid_base() {
        assert!(ListingCrawler::page_url("not a url", &[], 1).is_err());
    }

    #[tokio::test]
    async fn test_crawl_stops_at_page_limit() {
        let fetcher = StaticFetcher::new(vec![
            (url(1), listing(&["1.1.1.1"])),
            (url(2), listing(&["2.2.2.2", "3.3.3.3"])),
            (url(3), listing(&["4.4.4.4"])),
        ]);
        let crawler = ListingCrawler::new(&fetcher);

        let result = crawler.crawl(&job(2)).await;
        assert_eq!(result.stop, CrawlStop::PageLimit);
        assert_eq!(result.pages, 2);
        assert_eq!(result.proxies.len(), 3);
        assert_eq!(fetcher.requests(), vec![url(1), url(2)]);
    }

    #[tokio::test]
    async fn test_crawl_stops_on_first_empty_page() {
        let fetcher = StaticFetcher::new(vec![
            (url(1), listing(&["1.1.1.1"])),
            (url(2), listing(&[])),
            (url(3), listing(&["3.3.3.3"])),
        ]);
        let crawler = ListingCrawler::new(&fetcher);

        let result = crawler.crawl(&job(10)).await;
        assert_eq!(result.stop, CrawlStop::Exhausted { page: 2 });
        assert_eq!(result.proxies, vec!["socks://Og@1.1.1.1:1080#US,%20Dallas"]);
        assert_eq!(fetcher.requests().len(), 2);
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn test_crawl_stops_when_blocked() {
        let blocked = "<html><head><title>Attention Required! | Cloudflare</title></head></html>";
        let fetcher = StaticFetcher::new(vec![(url(1), blocked.to_string())]);
        let crawler = ListingCrawler::new(&fetcher);

        let result = crawler.crawl(&job(5)).await;
        assert_eq!(result.stop, CrawlStop::Blocked { page: 1 });
        assert!(result.proxies.is_empty());
        assert!(!result.is_clean());
    }

    #[tokio::test]
    async fn test_crawl_stops_on_fetch_failure() {
        let fetcher = StaticFetcher::new(vec![(url(1), listing(&["1.1.1.1"]))]);
        let crawler = ListingCrawler::new(&fetcher);

        let result = crawler.crawl(&job(5)).await;
        assert!(matches!(result.stop, CrawlStop::FetchFailed { page: 2, .. }));
        assert_eq!(result.proxies.len(), 1);
    }

    #[tokio::test]
    async fn test_run_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(vec![(url(1), listing(&[]))]);
        let crawler = ListingCrawler::new(&fetcher);

        crawler.run(&job(3), dir.path()).await.unwrap();
        let written = fs::read_to_string(dir.path().join("fp.txt")).unwrap();
        assert_eq!(written, "");
    }

    #[tokio::test]
    async fn test_run_with_invalid_base_url_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(vec![]);
        let crawler = ListingCrawler::new(&fetcher);
        let mut bad = job(3);
        bad.base_url = "not a url".to_string();

        let result = crawler.run(&bad, dir.path()).await.unwrap();
        assert!(matches!(result.stop, CrawlStop::FetchFailed { page: 1, .. }));
        assert!(fetcher.requests().is_empty());
        let written = fs::read_to_string(dir.path().join("fp.txt")).unwrap();
        assert_eq!(written, "");
    }

    #[tokio::test]
    async fn test_run_writes_newline_joined() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(vec![(url(1), listing(&["1.1.1.1", "2.2.2.2"]))]);
        let crawler = ListingCrawler::new(&fetcher);

        crawler.run(&job(1), dir.path()).await.unwrap();
        let written = fs::read_to_string(dir.path().join("fp.txt")).unwrap();
        assert_eq!(
            written,
            "socks://Og@1.1.1.1:1080#US,%20Dallas\nsocks://Og@2.2.2.2:1080#US,%20Dallas"
        );
    }
}
