use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use subharvest::{
    config::JobConfig,
    fetch::{FetcherConfig, HttpFetcher, PageFetcher},
    jobs::{merge_all, output_file_name, subscription_url, MergeOutcome, Orchestrator, RunOptions},
    logging,
    proxy::ListingExtractor,
};
use tracing::info;

/// Collects proxy subscriptions and free proxy listings into feed files
#[derive(Parser)]
#[command(name = "subharvest")]
#[command(about = "Collects proxy subscriptions and free proxy listings into feed files")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root; outputs are written to <root>/configs
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Job file (defaults to <root>/config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timeout in seconds for each page fetch
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Seconds to wait after each fetched page
    #[arg(long, default_value = "0")]
    settle: u64,

    /// User agent sent with every page request
    #[arg(long)]
    user_agent: Option<String>,

    /// Enable debug logging when RUST_LOG is unset
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured job from a clean output directory
    Run,
    /// Fetch one page and save it verbatim
    Fetch {
        /// URL to fetch
        url: String,
        /// Output file
        file: PathBuf,
    },
    /// Extract proxy URIs from a saved listing page
    Extract {
        /// HTML file to parse
        input: PathBuf,
        /// Output file for the proxy URIs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge existing output files without fetching anything
    Merge,
    /// Print the conversion URL of every subscription job
    Url,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join("config.yml"));

    match &cli.command {
        Some(Commands::Run) | None => {
            let config = JobConfig::load(&config_path)?;
            info!(
                config = %config_path.display(),
                subscriptions = config.subscriptions.len(),
                listings = config.listings.len(),
                merges = config.merges.len(),
                "loaded job config"
            );
            let fetcher = build_fetcher(&cli)?;
            let orchestrator = Orchestrator::new(&fetcher, config, RunOptions::new(&cli.root));
            orchestrator.run().await?;
        }
        Some(Commands::Fetch { url, file }) => {
            let fetcher = build_fetcher(&cli)?;
            let body = fetcher.fetch(url).await?;
            std::fs::write(file, body)?;
            info!(url = %url, file = %file.display(), "page saved");
        }
        Some(Commands::Extract { input, output }) => {
            let extract = ListingExtractor::extract_file(input)?;
            info!(
                input = %input.display(),
                count = extract.records.len(),
                status = %extract.status,
                "extracted listing page"
            );

            let uris = extract.uris();
            if let Some(output_path) = output {
                std::fs::write(output_path, uris.join("\n"))?;
                println!("Saved {} proxies to {:?}", uris.len(), output_path);
            } else {
                for uri in &uris {
                    println!("{}", uri);
                }
            }
        }
        Some(Commands::Merge) => {
            let config = JobConfig::load(&config_path)?;
            let out_dir = RunOptions::new(&cli.root).output_dir();
            for (target, outcome) in merge_all(&config.merges, &out_dir) {
                match outcome {
                    MergeOutcome::Written { lines } => println!("{}: {} lines", target, lines),
                    MergeOutcome::Skipped => println!("{}: skipped (no input)", target),
                }
            }
        }
        Some(Commands::Url) => {
            let config = JobConfig::load(&config_path)?;
            for job in &config.subscriptions {
                println!(
                    "{} -> {}\n  {}",
                    job.name,
                    output_file_name(job),
                    subscription_url(&config.source, &job.target)
                );
            }
        }
    }

    Ok(())
}

fn build_fetcher(cli: &Cli) -> Result<HttpFetcher> {
    let mut config = FetcherConfig::new()
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_settle_delay(Duration::from_secs(cli.settle));
    if let Some(user_agent) = &cli.user_agent {
        config = config.with_user_agent(user_agent.clone());
    }
    HttpFetcher::with_config(config)
}
