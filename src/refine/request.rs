//! Request builders, one per publisher.
//!
//! A builder turns the group of papers classified under one [`Domain`] into
//! the smallest set of outbound requests it can. Every [`PlannedRequest`]
//! names, in order, the global indices of the papers its response will
//! populate, so the splitter for that publisher must yield exactly that many
//! fragments.
//!
//! | Publisher | Batching | Needs key | Headers |
//! |-----------|----------|-----------|---------|
//! | arXiv | up to [`ARXIV_CHUNK_SIZE`] ids per query | no | none |
//! | IEEE | one page per paper | no | random Firefox user agent |
//! | Elsevier | one article per paper | yes | `Accept: application/json` |
//! | Springer / Nature | [`SPRINGER_BATCH_SIZE`] record per query | yes | none |
//!
//! Papers whose link does not yield a publisher identifier are dropped from
//! the group with a warning; the rest of the group is still requested.

use crate::config::ApiKeys;
use crate::models::{Domain, Paper};
use crate::utils::{path_segments, random_user_agent, strip_file_extension};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Maximum number of ids in one arXiv API query.
pub const ARXIV_CHUNK_SIZE: usize = 100;

/// Records per Springer Nature query.
///
/// The search API does not promise that results come back in query order, so
/// batching more than one DOI per request could attach metadata to the wrong
/// paper. Only raise this once response ordering is confirmed.
pub const SPRINGER_BATCH_SIZE: usize = 1;

const ARXIV_API: &str = "https://export.arxiv.org/api/query";
const IEEE_DOCUMENT: &str = "https://ieeexplore.ieee.org/abstract/document";
const ELSEVIER_API: &str = "https://api.elsevier.com/content/article/pii";
const SPRINGER_API: &str = "https://api.springernature.com/meta/v2/json";
const NATURE_DOI_PREFIX: &str = "10.1038";

static IEEE_PDF_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?P<id>\d+)\.pdf").expect("static IEEE pdf regex"));
/// Path prefixes of arXiv pages, never an archive name.
const ARXIV_VIEWS: &[&str] = &["abs", "pdf", "html", "format", "list"];

static ARXIV_NEW_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("static arXiv id regex"));
static ARXIV_OLD_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z-]*(\.[A-Z]{2})?/\d{7}(v\d+)?$").expect("static arXiv legacy id regex")
});
static ELSEVIER_PII: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pii/(?P<pii>[^/?#]+)").expect("static Elsevier PII regex"));

/// One outbound request: URL plus optional headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(url: String) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request together with the papers its response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRequest {
    pub domain: Domain,
    pub request: RequestDescriptor,
    /// Global paper indices, in the order the response is expected to list them.
    pub targets: Vec<usize>,
}

/// A paper paired with its global index.
pub type IndexedPaper<'a> = (usize, &'a Paper);

/// Build the requests for one publisher's group of papers.
///
/// Returns `None` when the publisher's builder declines the whole group,
/// which happens when a required API key is missing.
pub fn build_requests(
    domain: Domain,
    papers: &[IndexedPaper<'_>],
    keys: &ApiKeys,
) -> Option<Vec<PlannedRequest>> {
    let requests = match domain {
        Domain::Arxiv => arxiv_requests(papers, ARXIV_CHUNK_SIZE),
        Domain::Ieee => ieee_requests(papers),
        Domain::Elsevier => elsevier_requests(papers, keys.elsevier.as_deref()?),
        Domain::Springer | Domain::Nature => springer_requests(
            domain,
            papers,
            keys.springer.as_deref()?,
            SPRINGER_BATCH_SIZE,
        ),
    };
    debug!(%domain, papers = papers.len(), requests = requests.len(), "Built publisher requests");
    Some(requests)
}

/// Keep the papers an identifier can be derived for, warning about the rest.
fn identified<'a>(
    domain: Domain,
    papers: &[IndexedPaper<'a>],
    derive: impl Fn(&str) -> Option<String>,
) -> Vec<(usize, String)> {
    papers
        .iter()
        .filter_map(|(index, paper)| match derive(&paper.link) {
            Some(id) => Some((*index, id)),
            None => {
                warn!(%domain, link = %paper.link, "Could not derive publisher identifier; skipping paper");
                None
            }
        })
        .collect()
}

/// arXiv identifier of a link, without a `.pdf` suffix.
///
/// New-style ids (`2101.00001v2`) are the last path segment. Legacy ids
/// (`hep-th/9901001`) span the last two. Anything else is not an id: the
/// export API answers a query holding one bad id with a single error entry.
pub fn arxiv_id(link: &str) -> Option<String> {
    let mut segments = path_segments(link);
    let last = segments.pop()?;
    let id = strip_file_extension(&last);
    if ARXIV_NEW_ID.is_match(id) {
        return Some(id.to_string());
    }
    let archive = segments.pop().filter(|a| !ARXIV_VIEWS.contains(&a.as_str()))?;
    let legacy = format!("{archive}/{id}");
    ARXIV_OLD_ID.is_match(&legacy).then_some(legacy)
}

pub fn arxiv_requests(papers: &[IndexedPaper<'_>], chunk_size: usize) -> Vec<PlannedRequest> {
    let ids = identified(Domain::Arxiv, papers, arxiv_id);
    ids.chunks(chunk_size.max(1))
        .map(|chunk| {
            let id_list = chunk.iter().map(|(_, id)| id.as_str()).collect::<Vec<_>>().join(",");
            PlannedRequest {
                domain: Domain::Arxiv,
                request: RequestDescriptor::new(format!(
                    "{ARXIV_API}?id_list={id_list}&max_results={}",
                    chunk.len()
                )),
                targets: chunk.iter().map(|(index, _)| *index).collect(),
            }
        })
        .collect()
}

/// IEEE document id.
///
/// Abstract-page links carry the id as the second-to-last `/`-separated part
/// (`.../document/9123456/`); free-access links point straight at the pdf
/// (`.../09123456.pdf`).
pub fn ieee_document_id(link: &str) -> Option<String> {
    if link.contains("abstract") || link.contains("/document/") {
        let parts: Vec<&str> = link.split(['?', '#']).next()?.split('/').collect();
        let candidate = if parts.len() >= 2 { parts[parts.len() - 2] } else { "" };
        if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit()) {
            return Some(candidate.to_string());
        }
        return path_segments(link)
            .into_iter()
            .rev()
            .find(|s| s.chars().all(|c| c.is_ascii_digit()));
    }
    IEEE_PDF_ID
        .captures(link)
        .map(|caps| caps["id"].to_string())
}

pub fn ieee_requests(papers: &[IndexedPaper<'_>]) -> Vec<PlannedRequest> {
    identified(Domain::Ieee, papers, ieee_document_id)
        .into_iter()
        .map(|(index, doc_id)| PlannedRequest {
            domain: Domain::Ieee,
            request: RequestDescriptor::new(format!("{IEEE_DOCUMENT}/{doc_id}"))
                .with_header("User-Agent", random_user_agent()),
            targets: vec![index],
        })
        .collect()
}

/// Elsevier PII: the path part following `pii/`.
pub fn elsevier_pii(link: &str) -> Option<String> {
    ELSEVIER_PII
        .captures(link)
        .map(|caps| caps["pii"].to_string())
}

pub fn elsevier_requests(papers: &[IndexedPaper<'_>], api_key: &str) -> Vec<PlannedRequest> {
    identified(Domain::Elsevier, papers, elsevier_pii)
        .into_iter()
        .map(|(index, pii)| PlannedRequest {
            domain: Domain::Elsevier,
            request: RequestDescriptor::new(format!(
                "{ELSEVIER_API}/{pii}?apiKey={}",
                urlencoding::encode(api_key)
            ))
            .with_header("Accept", "application/json"),
            targets: vec![index],
        })
        .collect()
}

/// DOI of a Springer or Nature article link.
///
/// Nature links only carry the DOI suffix (`/articles/s41586-...`), the
/// prefix is always `10.1038`. Springer links carry both
/// (`/article/10.1007/s11263-...`).
pub fn springer_doi(domain: Domain, link: &str) -> Option<String> {
    let mut segments = path_segments(link);
    let last = segments.pop()?;
    let suffix = strip_file_extension(&last);
    if suffix.is_empty() {
        return None;
    }
    let prefix = match domain {
        Domain::Nature => NATURE_DOI_PREFIX.to_string(),
        _ => segments.pop().filter(|p| p.starts_with("10."))?,
    };
    Some(format!("{prefix}/{suffix}"))
}

pub fn springer_requests(
    domain: Domain,
    papers: &[IndexedPaper<'_>],
    api_key: &str,
    batch_size: usize,
) -> Vec<PlannedRequest> {
    let dois = identified(domain, papers, |link| springer_doi(domain, link));
    let batch_size = batch_size.max(1);
    dois.chunks(batch_size)
        .map(|chunk| {
            let query = chunk
                .iter()
                .map(|(_, doi)| format!("doi:{doi}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            PlannedRequest {
                domain,
                request: RequestDescriptor::new(format!(
                    "{SPRINGER_API}?q={}&api_key={}&p={batch_size}",
                    urlencoding::encode(&format!("({query})")),
                    urlencoding::encode(api_key)
                )),
                targets: chunk.iter().map(|(index, _)| *index).collect(),
            }
        })
        .collect()
}
