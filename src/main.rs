//! # Scholar Feeds
//!
//! Turns Google Scholar alert emails into clean Atom feeds. Alerts only carry
//! a truncated title, a partial author list and a redirect link, so every
//! paper is refined with the title, abstract and full author list published
//! by arXiv, IEEE Xplore, Elsevier or Springer Nature.
//!
//! ## Usage
//!
//! ```sh
//! scholar_feeds --config config.yaml
//! scholar_feeds -s alerts/vision.xml -t vision --remove-duplicates
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Building**: Parse each alert feed and merge it with its previous output
//! 2. **Deduplication**: Optionally drop links already seen in an earlier feed
//! 3. **Refinement**: Batch publisher requests over all feeds and fetch them
//!    concurrently under one limit
//! 4. **Output**: Write one Atom feed per target

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod feeds;
mod models;
mod outputs;
mod refine;
mod utils;

use cli::Cli;
use config::Config;
use feeds::FeedList;
use refine::Refiner;
use refine::fetch::HttpFetcher;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("scholar_feeds starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.source, "Parsed CLI arguments");

    let config = Config::load(&args).await?;
    info!(
        feeds = config.pairings.len(),
        output_dir = %config.output_dir.display(),
        request_limit = config.request_limit,
        "Loaded configuration"
    );

    // Early check: fail before any network traffic if results cannot be saved
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = HttpFetcher::new(
        config.http_proxy.as_deref(),
        config.verify_ssl,
        config.request_limit,
    )?;

    // ---- Build feeds ----
    let mut feeds = FeedList::new(config.pairings.clone());
    feeds.build_feeds(&fetcher, &config.output_dir).await?;

    if config.remove_duplicates {
        feeds.remove_duplicates();
    }

    // ---- Refine ----
    let refiner = Refiner::new(fetcher, config.api_keys(), config.request_limit);
    let stats = feeds.refine_feeds(&refiner).await;
    info!(
        requests = stats.requests,
        failed_requests = stats.failed_requests,
        refined = stats.refined,
        skipped = stats.skipped,
        "Refined feeds"
    );

    // ---- Output ----
    let written = feeds.save_feeds(&config.output_dir).await?;
    feeds.print_update_stats();

    let elapsed = start_time.elapsed();
    info!(
        feeds = written,
        elapsed_secs = elapsed.as_secs_f64(),
        "scholar_feeds finished"
    );

    Ok(())
}
