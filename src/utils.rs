//! Utility functions for logging, link handling and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging raw publisher responses
//! - Path segment helpers used by the request builders
//! - Random browser user agents for publishers that block plain clients
//! - File system validation for the output directory

use rand::seq::IndexedRandom;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Desktop Firefox user agents handed out to publishers that block bots.
const FIREFOX_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:130.0) Gecko/20100101 Firefox/130.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:129.0) Gecko/20100101 Firefox/129.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.6; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:128.0) Gecko/20100101 Firefox/128.0",
];

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Pick a random desktop Firefox user agent.
pub fn random_user_agent() -> &'static str {
    FIREFOX_USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FIREFOX_USER_AGENTS[0])
}

/// Non-empty path segments of a link, in order.
///
/// Returns an empty vector for links that do not parse as URLs.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(path_segments("https://arxiv.org/abs/2101.00001/"), vec!["abs", "2101.00001"]);
/// ```
pub fn path_segments(link: &str) -> Vec<String> {
    url::Url::parse(link.trim())
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
        })
        .unwrap_or_default()
}

/// Remove a trailing file extension such as `.pdf` from a path segment.
///
/// Only the final `.ext` is removed, and only when it is purely alphabetic,
/// so dotted identifiers like `2101.00001` survive.
pub fn strip_file_extension(segment: &str) -> &str {
    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            stem
        }
        _ => segment,
    }
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
