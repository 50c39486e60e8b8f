//! catalog-feed command line
//!
//! `run` builds the feed, `resolve` prints canonical product ids without
//! touching the network, `inspect` summarizes an existing feed.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use catalog_feed_lib::application::{CatalogPipeline, RunPaths};
use catalog_feed_lib::infrastructure::{
    ConfigManager, FeedRepository, HttpPageDriver, IdentityResolver, PageDriver, init_logging_with_config,
};

/// Exit status of a run stopped by Ctrl-C
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(name = "catalog-feed", version, about = "Product catalog feed builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Visit every listed URL and merge the results into the feed
    Run {
        /// JSON configuration file; missing file means defaults
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
        /// Work list (CSV with a url column, or JSON rows)
        #[arg(short, long)]
        links: PathBuf,
        /// Feed file to merge into
        #[arg(short, long)]
        out: PathBuf,
        /// Error report path (default: <out stem>.errors.json)
        #[arg(short, long)]
        errors: Option<PathBuf>,
    },
    /// Print the canonical product id of each URL (offline)
    Resolve {
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show per-category item counts of a feed
    Inspect {
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            config,
            links,
            out,
            errors,
        } => {
            let config = ConfigManager::new(config).load_config().await?;
            init_logging_with_config(&config.logging)?;

            let driver: Arc<dyn PageDriver> =
                Arc::new(HttpPageDriver::from_scrape_config(&config.scrape).context("Failed to build page driver")?);
            let pipeline = CatalogPipeline::new(config, driver);
            let paths = RunPaths {
                links,
                feed: out,
                errors,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, releasing pages and stopping");
                    on_signal.cancel();
                }
            });

            let summary = pipeline.run(&paths, &cancel).await?;
            if summary.interrupted {
                return Ok(ExitCode::from(INTERRUPTED_EXIT));
            }
            println!(
                "{} units: {} succeeded, {} failed; {} fresh items, {} in feed",
                summary.total,
                summary.succeeded,
                summary.failed,
                summary.fresh_items(),
                summary.feed_items
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Resolve { config, urls } => {
            let config = ConfigManager::new(config).load_config().await?;
            let resolver = IdentityResolver::new(&config.identity)?;

            let mut unresolved = 0;
            for url in &urls {
                match resolver.resolve(url) {
                    Ok(id) => println!("{}\t{}\t{}", url, id, resolver.canonical_url(&id)),
                    Err(e) => {
                        unresolved += 1;
                        println!("{}\t-\t{}", url, e);
                    }
                }
            }
            Ok(if unresolved == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Inspect { out } => {
            let repository = FeedRepository::new(&out);
            let Some(feed) = repository.read().await? else {
                println!("No feed at {:?}", out);
                return Ok(ExitCode::FAILURE);
            };

            println!("Generated at {}", feed.generated_at.to_rfc3339());
            for category in &feed.categories {
                println!("{:>6}  {}", category.items.len(), category.name);
            }
            println!("{:>6}  total", feed.item_count());
            Ok(ExitCode::SUCCESS)
        }
    }
}
