//! Data models for papers and the publishers they are refined against.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Paper`]: One paper's evolving state, from alert stub to feed-ready record
//! - [`Domain`]: The closed set of publishers the refinement pipeline knows about
//!
//! A paper's `link` is its identity. Two papers with the same link are
//! duplicates, regardless of which feed they came from.

use std::fmt;

/// A single paper as it moves through the pipeline.
///
/// Papers are created either from a previously saved output feed (`parsed`
/// is `true`, never touched again) or from an alert feed as a stub that the
/// refinement pipeline may enrich in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    /// The paper title.
    pub title: String,
    /// Author names in publication order.
    pub authors: Vec<String>,
    /// The paper abstract, empty for fresh alert stubs.
    pub abstract_text: String,
    /// Source URL; doubles as the deduplication key.
    pub link: String,
    /// Publisher classification, `None` until classified or when unknown.
    pub domain: Option<Domain>,
    /// Raw content fragment fetched for this paper.
    pub html_content: Option<String>,
    /// Loaded verbatim from a previous run's output and must not be re-fetched.
    pub parsed: bool,
}

impl Paper {
    /// Create a fresh stub that still needs refinement.
    pub fn stub(title: &str, authors: Vec<String>, link: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            authors,
            abstract_text: String::new(),
            link: link.to_string(),
            domain: Domain::classify(link),
            html_content: None,
            parsed: false,
        }
    }

    /// Create a terminal record carried over from a previous output file.
    pub fn previously_parsed(
        title: String,
        authors: Vec<String>,
        abstract_text: String,
        link: String,
    ) -> Self {
        Self {
            title,
            authors,
            abstract_text,
            link,
            domain: None,
            html_content: None,
            parsed: true,
        }
    }
}

/// Metadata pulled out of one content fragment by a publisher extractor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaperMeta {
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
}

impl PaperMeta {
    /// Overwrite the refinable fields of `paper` with this metadata.
    pub fn apply_to(self, paper: &mut Paper) {
        paper.title = self.title;
        paper.abstract_text = self.abstract_text;
        paper.authors = self.authors;
    }
}

/// The publishers the refinement pipeline can fetch metadata from.
///
/// Springer and Nature share one API but derive DOIs differently, so they
/// stay separate variants that route to the same request builder, splitter
/// and extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Arxiv,
    Ieee,
    Elsevier,
    Springer,
    Nature,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Arxiv,
        Domain::Ieee,
        Domain::Elsevier,
        Domain::Springer,
        Domain::Nature,
    ];

    /// The registrable domain this publisher serves papers from.
    pub fn registrable_domain(self) -> &'static str {
        match self {
            Domain::Arxiv => "arxiv.org",
            Domain::Ieee => "ieee.org",
            Domain::Elsevier => "sciencedirect.com",
            Domain::Springer => "springer.com",
            Domain::Nature => "nature.com",
        }
    }

    /// Classify a paper link by the last two labels of its host.
    ///
    /// Returns `None` for unparsable links and for hosts that do not belong to
    /// a known publisher.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// assert_eq!(Domain::classify("https://arxiv.org/abs/2101.00001"), Some(Domain::Arxiv));
    /// assert_eq!(Domain::classify("https://ieeexplore.IEEE.org/document/1/"), Some(Domain::Ieee));
    /// assert_eq!(Domain::classify("https://example.com/paper"), None);
    /// ```
    pub fn classify(link: &str) -> Option<Domain> {
        let parsed = url::Url::parse(link.trim()).ok()?;
        let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 2 {
            return None;
        }
        let core = labels[labels.len() - 2..].join(".");
        Domain::ALL
            .into_iter()
            .find(|d| d.registrable_domain() == core)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.registrable_domain())
    }
}
