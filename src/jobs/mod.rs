//! Job orchestration
//!
//! A run clears the output directory, downloads every subscription, scrapes
//! every listing and finally merges the produced files. Jobs never overlap;
//! consecutive jobs of the same kind are separated by the configured delay.

pub mod merge;
pub mod subscription;

pub use merge::{merge_all, merge_one, MergeOutcome};
pub use subscription::{output_file_name, subscription_url, SubscriptionDownloader};

use crate::config::{JobConfig, ListingJob, MergeSpec, SubscriptionJob};
use crate::fetch::PageFetcher;
use crate::proxy::crawler::{CrawlResult, ListingCrawler};
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Name of the output directory under the project root
pub const OUTPUT_DIR_NAME: &str = "configs";

/// One configured unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Subscription(SubscriptionJob),
    Listing(ListingJob),
    Merge(MergeSpec),
}

/// Kind of a [`Job`], used to space out jobs of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Subscription,
    Listing,
    Merge,
}

impl Job {
    pub fn name(&self) -> &str {
        match self {
            Job::Subscription(job) => &job.name,
            Job::Listing(job) => &job.name,
            Job::Merge(spec) => &spec.target_file,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Subscription(_) => JobKind::Subscription,
            Job::Listing(_) => JobKind::Listing,
            Job::Merge(_) => JobKind::Merge,
        }
    }

    /// All jobs of a config in run order
    pub fn plan(config: &JobConfig) -> Vec<Job> {
        config
            .subscriptions
            .iter()
            .cloned()
            .map(Job::Subscription)
            .chain(config.listings.iter().cloned().map(Job::Listing))
            .chain(config.merges.iter().cloned().map(Job::Merge))
            .collect()
    }
}

/// Where a run writes its files
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Project root; outputs go to `{root}/configs`
    pub root: PathBuf,
}

impl RunOptions {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR_NAME)
    }
}

/// Outcome of a full run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Files written by subscription downloads
    pub subscriptions: Vec<PathBuf>,
    /// Per-job listing scrape results
    pub listings: Vec<CrawlResult>,
    /// Per-target merge outcomes
    pub merges: Vec<(String, MergeOutcome)>,
}

/// Drives all configured jobs in sequence
pub struct Orchestrator<'a> {
    fetcher: &'a dyn PageFetcher,
    config: JobConfig,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, config: JobConfig, options: RunOptions) -> Self {
        Self {
            fetcher,
            config,
            options,
        }
    }

    /// Run every job from a fresh output directory
    ///
    /// Returns an error only for failures that must abort the run: a
    /// subscription download that could not be fetched or saved, or an output
    /// directory that could not be prepared.
    pub async fn run(&self) -> Result<RunSummary> {
        let out_dir = self.options.output_dir();
        reset_dir(&out_dir)?;
        info!(dir = %out_dir.display(), "output directory ready");

        let mut summary = RunSummary::default();
        let mut previous: Option<JobKind> = None;

        for job in Job::plan(&self.config) {
            let kind = job.kind();
            if previous == Some(kind) && kind != JobKind::Merge && !self.config.job_delay.is_zero() {
                tokio::time::sleep(self.config.job_delay).await;
            }
            previous = Some(kind);

            debug!(job = job.name(), ?kind, "starting job");
            self.execute(&job, &out_dir, &mut summary).await?;
        }

        let written = summary
            .merges
            .iter()
            .filter(|(_, outcome)| matches!(outcome, MergeOutcome::Written { .. }))
            .count();
        info!(
            subscriptions = summary.subscriptions.len(),
            listings = summary.listings.len(),
            merged = written,
            "run complete"
        );
        Ok(summary)
    }

    async fn execute(&self, job: &Job, out_dir: &Path, summary: &mut RunSummary) -> Result<()> {
        match job {
            Job::Subscription(sub) => {
                let downloader = SubscriptionDownloader::new(self.fetcher, &self.config.source);
                let path = downloader.run(sub, out_dir).await?;
                summary.subscriptions.push(path);
            }
            Job::Listing(listing) => {
                let crawler = ListingCrawler::new(self.fetcher);
                match crawler.run(listing, out_dir).await {
                    Ok(result) => summary.listings.push(result),
                    Err(e) => {
                        let error = format!("{:#}", e);
                        error!(job = %listing.name, %error, "listing scrape failed");
                    }
                }
            }
            Job::Merge(spec) => match merge_one(spec, out_dir) {
                Ok(outcome) => summary.merges.push((spec.target_file.clone(), outcome)),
                Err(e) => {
                    let error = format!("{:#}", e);
                    error!(target_file = %spec.target_file, %error, "merge failed");
                }
            },
        }
        Ok(())
    }
}

/// Remove and recreate a directory
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("failed to clear {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(())
}
