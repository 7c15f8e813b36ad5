//! Error types for the refinement pipeline.
//!
//! Plumbing code (config, feed loading, saving) reports errors as
//! `Box<dyn Error>`. The refinement pipeline needs to tell failures apart so it
//! can decide how far they reach:
//!
//! | Error | Scope |
//! |-------|-------|
//! | [`FetchError`] | the papers served by one request |
//! | [`ExtractError::Anomalous`] | one paper |
//! | [`ExtractError::Rejected`] | every remaining paper of that publisher this run |

use crate::models::Domain;
use thiserror::Error;

/// A single outbound request failed.
///
/// The fetcher stores this at the request's index instead of failing the
/// whole batch.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request could not be sent or its body could not be read.
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// The request could not be assembled (e.g. an invalid header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Extracting metadata from a content fragment failed.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The publisher refused to serve content (anti-abuse page, API error payload).
    #[error("{domain} rejected the request: {reason}")]
    Rejected { domain: Domain, reason: String },

    /// This one fragment does not look like the page or record we expect.
    #[error("anomalous content: {reason}")]
    Anomalous { reason: String },
}

impl ExtractError {
    pub fn rejected(domain: Domain, reason: impl Into<String>) -> Self {
        ExtractError::Rejected {
            domain,
            reason: reason.into(),
        }
    }

    pub fn anomalous(reason: impl Into<String>) -> Self {
        ExtractError::Anomalous {
            reason: reason.into(),
        }
    }

    /// Whether this error should stop further work for the same publisher.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExtractError::Rejected { .. })
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(e: serde_json::Error) -> Self {
        ExtractError::anomalous(format!("invalid JSON: {e}"))
    }
}

impl From<quick_xml::DeError> for ExtractError {
    fn from(e: quick_xml::DeError) -> Self {
        ExtractError::anomalous(format!("invalid XML: {e}"))
    }
}
