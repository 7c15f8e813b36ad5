//! Command-line interface definitions for Scholar Feeds.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets and the proxy can also be provided via environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Scholar Feeds application.
///
/// Feeds are either listed in a YAML config file (`--config`) or given as a
/// single `--source`/`--target` pair. Values given here override the file.
///
/// # Examples
///
/// ```sh
/// # All pairings from a config file
/// scholar_feeds --config config.yaml
///
/// # One local alert file, written to ./feeds/vision.xml
/// scholar_feeds --source alerts/vision.xml --target vision
///
/// # An online alert feed with Springer enrichment
/// scholar_feeds -s https://example.org/alerts.xml -t vision --online --springer-api-key KEY
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Path or URL of a single alert feed
    #[arg(short, long)]
    pub source: Option<String>,

    /// Name of the result feed file (without extension) for --source
    #[arg(short, long, default_value = "feed")]
    pub target: String,

    /// Treat --source as a URL
    #[arg(short, long)]
    pub online: bool,

    /// Do not load the previous output of --target before writing
    #[arg(long)]
    pub no_append: bool,

    /// Remove papers that appear in more than one feed (first occurrence wins)
    #[arg(short, long)]
    pub remove_duplicates: bool,

    /// Output directory for the Atom feeds
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Springer Nature metadata API key
    #[arg(long, env = "SPRINGER_API_KEY")]
    pub springer_api_key: Option<String>,

    /// Elsevier article retrieval API key
    #[arg(long, env = "ELSEVIER_API_KEY")]
    pub elsevier_api_key: Option<String>,

    /// Proxy for all outbound requests
    #[arg(long, env = "HTTP_PROXY")]
    pub http_proxy: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub no_verify_ssl: bool,

    /// Maximum number of simultaneously open publisher requests
    #[arg(long)]
    pub request_limit: Option<usize>,
}
