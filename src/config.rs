//! Run configuration loaded from YAML and merged with CLI overrides.
//!
//! # Example
//!
//! ```yaml
//! output_dir: ./feeds
//! springer_api_key: "..."
//! elsevier_api_key: "..."
//! http_proxy: http://127.0.0.1:3128
//! verify_ssl: true
//! request_limit: 25
//! remove_duplicates: true
//! pairings:
//!   - source: https://example.org/alerts/vision.xml
//!     target: vision
//!     online: true
//!   - source: ./alerts/robotics.xml
//!     target: robotics
//!     append: false
//! ```

use crate::cli::Cli;
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Default number of simultaneously open publisher requests.
pub const DEFAULT_REQUEST_LIMIT: usize = 25;

fn default_output_dir() -> PathBuf {
    PathBuf::from("feeds")
}

fn default_true() -> bool {
    true
}

fn default_request_limit() -> usize {
    DEFAULT_REQUEST_LIMIT
}

/// One alert source and the output feed it is written to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Pairing {
    /// Path or URL of the alert feed.
    pub source: String,
    /// Output feed name without extension.
    pub target: String,
    /// Whether `source` is a URL.
    #[serde(default)]
    pub online: bool,
    /// Whether the previous output is loaded so new papers are appended to it.
    #[serde(default = "default_true")]
    pub append: bool,
}

/// Settings for one run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub springer_api_key: Option<String>,
    #[serde(default)]
    pub elsevier_api_key: Option<String>,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default = "default_request_limit")]
    pub request_limit: usize,
    #[serde(default)]
    pub remove_duplicates: bool,
    #[serde(default)]
    pub pairings: Vec<Pairing>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            springer_api_key: None,
            elsevier_api_key: None,
            http_proxy: None,
            verify_ssl: true,
            request_limit: DEFAULT_REQUEST_LIMIT,
            remove_duplicates: false,
            pairings: Vec::new(),
        }
    }
}

/// API keys handed to the request builders. Blank keys count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub springer: Option<String>,
    pub elsevier: Option<String>,
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, Box<dyn Error>> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load the config file named on the command line (if any) and apply CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if neither the
    /// file nor the CLI supplies at least one source/target pairing.
    #[instrument(level = "info", skip_all)]
    pub async fn load(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let mut config = match &cli.config {
            Some(path) => {
                let yaml = tokio::fs::read_to_string(path).await?;
                info!(%path, "Loaded configuration file");
                Config::from_yaml(&yaml)?
            }
            None => Config::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        debug!(?config.output_dir, pairings = config.pairings.len(), "Resolved configuration");
        Ok(config)
    }

    /// Apply command-line overrides on top of file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(source) = &cli.source {
            self.pairings.push(Pairing {
                source: source.clone(),
                target: cli.target.clone(),
                online: cli.online,
                append: !cli.no_append,
            });
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        if cli.remove_duplicates {
            self.remove_duplicates = true;
        }
        if cli.springer_api_key.is_some() {
            self.springer_api_key = cli.springer_api_key.clone();
        }
        if cli.elsevier_api_key.is_some() {
            self.elsevier_api_key = cli.elsevier_api_key.clone();
        }
        if cli.http_proxy.is_some() {
            self.http_proxy = cli.http_proxy.clone();
        }
        if cli.no_verify_ssl {
            self.verify_ssl = false;
        }
        if let Some(limit) = cli.request_limit {
            self.request_limit = limit;
        }
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.pairings.is_empty() {
            return Err("no feed pairings configured; pass --source or a config file with `pairings`".into());
        }
        if self.request_limit == 0 {
            return Err("request_limit must be at least 1".into());
        }
        Ok(())
    }

    pub fn api_keys(&self) -> ApiKeys {
        ApiKeys {
            springer: non_blank(&self.springer_api_key),
            elsevier: non_blank(&self.elsevier_api_key),
        }
    }
}

fn non_blank(key: &Option<String>) -> Option<String> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
