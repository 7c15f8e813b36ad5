//! Feed refinement: enriching paper stubs with publisher metadata.
//!
//! One pass over every not-yet-parsed paper of every feed:
//!
//! 1. **Classify**: unclassified papers get a [`Domain`] from their link
//! 2. **Plan**: papers are grouped by publisher and turned into a
//!    [`RequestPlan`], where each request names the global paper indices it
//!    will populate
//! 3. **Fetch**: all requests run concurrently under one global limit
//! 4. **Split**: each response is cut into one fragment per target paper
//! 5. **Reattach**: fragments are stored on their papers by index
//! 6. **Extract**: each publisher's extractor overwrites title, abstract and
//!    authors in place
//!
//! # Failure Scope
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Missing API key | publisher skipped, stubs kept |
//! | Identifier not derivable from link | that paper dropped from its batch |
//! | Network failure | the papers of that request keep their stubs |
//! | Fragment count mismatch | the papers of that request keep their stubs |
//! | Anomalous page | that paper keeps its stub |
//! | Publisher rejection | every remaining paper of that publisher keeps its stub |
//!
//! Every skipped paper is logged with its link.

pub mod extract;
pub mod fetch;
pub mod request;
pub mod split;

use crate::config::ApiKeys;
use crate::models::{Domain, Paper};
use fetch::{FetchAsync, fetch_all};
use request::{IndexedPaper, PlannedRequest, RequestDescriptor, build_requests};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, instrument, warn};

/// Every request of one refinement pass, with the papers each one serves.
///
/// Computed once from a read-only view of the papers and threaded through
/// fetching, splitting and reattachment unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPlan {
    pub requests: Vec<PlannedRequest>,
}

impl RequestPlan {
    /// Group the unparsed papers by publisher and build their requests.
    ///
    /// `papers` is the flattened cross-feed sequence; a paper's position in it
    /// is its global index.
    pub fn build<'a>(papers: impl IntoIterator<Item = &'a Paper>, keys: &ApiKeys) -> Self {
        let mut groups: BTreeMap<Domain, Vec<IndexedPaper<'a>>> = BTreeMap::new();
        for (index, paper) in papers.into_iter().enumerate() {
            if paper.parsed {
                continue;
            }
            match paper.domain {
                Some(domain) => groups.entry(domain).or_default().push((index, paper)),
                None => debug!(link = %paper.link, "Unknown publisher; keeping stub metadata"),
            }
        }

        let mut requests = Vec::new();
        for (domain, group) in &groups {
            match build_requests(*domain, group, keys) {
                Some(built) => requests.extend(built),
                None => info!(
                    %domain,
                    papers = group.len(),
                    "No API key configured; skipping publisher"
                ),
            }
        }
        Self { requests }
    }

    pub fn descriptors(&self) -> Vec<RequestDescriptor> {
        self.requests.iter().map(|r| r.request.clone()).collect()
    }

    /// Number of papers the plan will try to populate.
    pub fn paper_count(&self) -> usize {
        self.requests.iter().map(|r| r.targets.len()).sum()
    }
}

/// Counters for one refinement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefineStats {
    pub requests: usize,
    pub failed_requests: usize,
    pub refined: usize,
    /// Global indices of the refined papers, in extraction order.
    pub refined_indices: Vec<usize>,
    pub skipped: usize,
    pub rejected_domains: Vec<Domain>,
}

/// Runs the refinement pipeline with a given fetcher and API keys.
#[derive(Debug)]
pub struct Refiner<F> {
    fetcher: F,
    keys: ApiKeys,
    request_limit: usize,
}

impl<F: FetchAsync> Refiner<F> {
    pub fn new(fetcher: F, keys: ApiKeys, request_limit: usize) -> Self {
        Self {
            fetcher,
            keys,
            request_limit,
        }
    }

    /// Refine every unparsed paper in `papers` in place.
    ///
    /// `papers` is the flattened sequence of all feeds' papers. Papers with
    /// `parsed == true` are never classified, requested or modified.
    #[instrument(level = "info", skip_all, fields(papers = papers.len()))]
    pub async fn refine(&self, papers: &mut [&mut Paper]) -> RefineStats {
        for paper in papers.iter_mut() {
            if !paper.parsed && paper.domain.is_none() {
                paper.domain = Domain::classify(&paper.link);
            }
        }

        let plan = RequestPlan::build(papers.iter().map(|p| &**p), &self.keys);
        info!(
            requests = plan.requests.len(),
            papers = plan.paper_count(),
            "Planned publisher requests"
        );

        let bodies = fetch_all(&self.fetcher, &plan.descriptors(), self.request_limit).await;
        let mut stats = RefineStats {
            requests: plan.requests.len(),
            ..Default::default()
        };

        let received = reattach(&plan, bodies, papers, &mut stats);
        extract_all(&received, papers, &mut stats);

        info!(
            refined = stats.refined,
            skipped = stats.skipped,
            failed_requests = stats.failed_requests,
            rejected = ?stats.rejected_domains,
            "Refinement complete"
        );
        stats
    }
}

/// Split every response and store each fragment on its target paper.
///
/// Returns the `(domain, index)` pairs that received content, in plan order.
fn reattach(
    plan: &RequestPlan,
    bodies: Vec<Result<String, crate::error::FetchError>>,
    papers: &mut [&mut Paper],
    stats: &mut RefineStats,
) -> Vec<(Domain, usize)> {
    let mut received = Vec::new();

    for (planned, body) in plan.requests.iter().zip(bodies) {
        let domain = planned.domain;
        let fragments = match body {
            Ok(raw) => split::split(domain, &raw),
            Err(e) => {
                stats.failed_requests += 1;
                for &index in &planned.targets {
                    warn!(%domain, link = %papers[index].link, error = %e, "Request failed; keeping stub metadata");
                }
                stats.skipped += planned.targets.len();
                continue;
            }
        };

        match fragments {
            Ok(fragments) if fragments.len() == planned.targets.len() => {
                for (&index, fragment) in planned.targets.iter().zip(fragments) {
                    papers[index].html_content = Some(fragment);
                    received.push((domain, index));
                }
            }
            Ok(fragments) => {
                for &index in &planned.targets {
                    warn!(
                        %domain,
                        link = %papers[index].link,
                        expected = planned.targets.len(),
                        got = fragments.len(),
                        "Response does not match its batch; keeping stub metadata"
                    );
                }
                stats.skipped += planned.targets.len();
            }
            Err(e) => {
                for &index in &planned.targets {
                    warn!(%domain, link = %papers[index].link, error = %e, "Could not split response; keeping stub metadata");
                }
                stats.skipped += planned.targets.len();
            }
        }
    }
    received
}

/// Run the publisher extractors over every paper that received content.
///
/// A rejection stops extraction for the rest of that publisher's papers.
fn extract_all(received: &[(Domain, usize)], papers: &mut [&mut Paper], stats: &mut RefineStats) {
    let mut rejected: BTreeSet<Domain> = BTreeSet::new();

    for &(domain, index) in received {
        let paper = &mut *papers[index];
        if paper.parsed {
            continue;
        }
        if rejected.contains(&domain) {
            warn!(%domain, link = %paper.link, "Publisher rejected this run; keeping stub metadata");
            stats.skipped += 1;
            continue;
        }
        let Some(content) = paper.html_content.as_deref() else {
            continue;
        };

        match extract::extract(domain, content) {
            Ok(meta) => {
                meta.apply_to(paper);
                stats.refined += 1;
                stats.refined_indices.push(index);
            }
            Err(e) if e.is_rejection() => {
                error!(%domain, link = %paper.link, error = %e, "Publisher rejected requests; skipping its remaining papers");
                rejected.insert(domain);
                stats.rejected_domains.push(domain);
                stats.skipped += 1;
            }
            Err(e) => {
                warn!(%domain, link = %paper.link, error = %e, "Could not extract metadata; keeping stub metadata");
                stats.skipped += 1;
            }
        }
    }
}
