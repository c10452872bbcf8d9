//! Subscription download through the conversion service

use crate::config::{ConversionSource, SubscriptionJob};
use crate::fetch::PageFetcher;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Targets whose output is a YAML client config rather than a plain list
const CONFIG_FILE_TARGETS: &[&str] = &["clash", "clashr"];

/// Build the conversion API URL for a target format
pub fn subscription_url(source: &ConversionSource, target: &str) -> String {
    let mut url = format!(
        "https://{}/sub?target={}&url={}",
        source.endpoint,
        target,
        urlencoding::encode(&source.urls.join("|"))
    );

    if let Some(config_url) = &source.config_url {
        url.push_str("&config=");
        url.push_str(&urlencoding::encode(config_url));
    }

    for (key, value) in &source.extra {
        url.push_str(&format!("&{}={}", key, value));
    }

    url
}

/// Output file name, forced to `{name}.yml` for config-file targets
pub fn output_file_name(job: &SubscriptionJob) -> String {
    if CONFIG_FILE_TARGETS.contains(&job.target.as_str()) {
        format!("{}.yml", job.name)
    } else {
        job.file.clone()
    }
}

/// Fetches converted subscriptions and stores the raw body
pub struct SubscriptionDownloader<'a> {
    fetcher: &'a dyn PageFetcher,
    source: &'a ConversionSource,
}

impl<'a> SubscriptionDownloader<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, source: &'a ConversionSource) -> Self {
        Self { fetcher, source }
    }

    /// Download one job into `out_dir`; any fetch error is returned as is
    pub async fn run(&self, job: &SubscriptionJob, out_dir: &Path) -> Result<PathBuf> {
        let url = subscription_url(self.source, &job.target);
        let path = out_dir.join(output_file_name(job));
        info!(job = %job.name, format = %job.target, path = %path.display(), "downloading subscription");

        let body = self
            .fetcher
            .fetch(&url)
            .await
            .with_context(|| format!("subscription job `{}` failed", job.name))?;

        fs::write(&path, &body).with_context(|| format!("failed to write {}", path.display()))?;
        info!(job = %job.name, bytes = body.len(), "subscription saved");
        Ok(path)
    }
}
