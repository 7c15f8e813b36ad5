//! Feeds and the collection of feeds processed in one run.
//!
//! A [`Feed`] pairs one alert source with one output target. Building a feed
//! parses its alerts, merges them with the target's previous output and
//! removes repeated links. The [`FeedList`] runs refinement across all feeds
//! at once so publisher requests are batched over the whole run.

pub mod alert;

use crate::config::Pairing;
use crate::models::Paper;
use crate::outputs::atom;
use crate::refine::fetch::FetchAsync;
use crate::refine::request::RequestDescriptor;
use crate::refine::{RefineStats, Refiner};
use crate::utils::ensure_writable_dir;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// One alert source, its output target and its papers.
#[derive(Debug, Clone)]
pub struct Feed {
    pub pairing: Pairing,
    pub papers: Vec<Paper>,
    /// Papers refined during this run.
    pub refined: usize,
}

impl Feed {
    pub fn new(pairing: Pairing) -> Self {
        Self {
            pairing,
            papers: Vec::new(),
            refined: 0,
        }
    }

    pub fn target(&self) -> &str {
        &self.pairing.target
    }

    /// Papers that still need refinement.
    pub fn new_count(&self) -> usize {
        self.papers.iter().filter(|p| !p.parsed).count()
    }

    /// Read the raw alert feed, from disk or over HTTP.
    async fn read_source<F: FetchAsync>(&self, fetcher: &F) -> Result<String, Box<dyn Error>> {
        if self.pairing.online {
            let request = RequestDescriptor::new(self.pairing.source.clone());
            Ok(fetcher.fetch(&request).await?)
        } else {
            Ok(fs::read_to_string(&self.pairing.source).await?)
        }
    }

    /// Parse the alerts and merge them with the previous output.
    ///
    /// Alert papers come first, in alert order. A link already present in the
    /// previous output is replaced by the saved record. Saved records the
    /// alerts no longer mention follow, in their saved order.
    #[instrument(level = "info", skip_all, fields(feed = %self.pairing.target))]
    pub async fn build<F: FetchAsync>(&mut self, fetcher: &F, output_dir: &Path) -> Result<(), Box<dyn Error>> {
        let raw = self.read_source(fetcher).await?;
        let stubs = alert::parse_alert_feed(&raw)?;

        let previous = if self.pairing.append {
            atom::load_previous(output_dir, &self.pairing.target).await?
        } else {
            Vec::new()
        };
        self.papers = merge_with_previous(stubs, previous);
        info!(papers = self.papers.len(), new = self.new_count(), "Built feed");
        Ok(())
    }
}

/// Combine fresh alert stubs with the previously saved papers of a target.
pub fn merge_with_previous(stubs: Vec<Paper>, previous: Vec<Paper>) -> Vec<Paper> {
    let mut saved: HashMap<String, Paper> = HashMap::with_capacity(previous.len());
    let mut saved_order = Vec::with_capacity(previous.len());
    for paper in previous {
        if !saved.contains_key(&paper.link) {
            saved_order.push(paper.link.clone());
            saved.insert(paper.link.clone(), paper);
        }
    }

    let mut papers: Vec<Paper> = stubs
        .into_iter()
        .unique_by(|p| p.link.clone())
        .map(|stub| match saved.remove(&stub.link) {
            Some(mut record) => {
                record.domain = stub.domain;
                record
            }
            None => stub,
        })
        .collect();
    papers.extend(saved_order.into_iter().filter_map(|link| saved.remove(&link)));
    papers
}

/// Every feed of one run.
#[derive(Debug, Clone, Default)]
pub struct FeedList {
    pub feeds: Vec<Feed>,
}

impl FeedList {
    pub fn new(pairings: Vec<Pairing>) -> Self {
        Self {
            feeds: pairings.into_iter().map(Feed::new).collect(),
        }
    }

    pub fn paper_count(&self) -> usize {
        self.feeds.iter().map(|f| f.papers.len()).sum()
    }

    /// Build every feed. A feed whose source cannot be read aborts the run.
    pub async fn build_feeds<F: FetchAsync>(&mut self, fetcher: &F, output_dir: &Path) -> Result<(), Box<dyn Error>> {
        for feed in &mut self.feeds {
            if let Err(e) = feed.build(fetcher, output_dir).await {
                error!(source = %feed.pairing.source, error = %e, "Failed to build feed");
                return Err(e);
            }
        }
        info!(feeds = self.feeds.len(), papers = self.paper_count(), "Built all feeds");
        Ok(())
    }

    /// Drop every paper whose link already appeared in an earlier position,
    /// scanning feeds in order. Returns the number of papers removed.
    pub fn remove_duplicates(&mut self) -> usize {
        let mut seen: HashSet<String> = HashSet::new();
        let mut removed = 0;
        for feed in &mut self.feeds {
            let before = feed.papers.len();
            feed.papers.retain(|p| seen.insert(p.link.clone()));
            removed += before - feed.papers.len();
        }
        info!(removed, "Removed duplicate papers across feeds");
        removed
    }

    /// Refine all feeds in one pass so requests are batched across feeds.
    pub async fn refine_feeds<F: FetchAsync>(&mut self, refiner: &Refiner<F>) -> RefineStats {
        // Global index ranges per feed, in flattening order.
        let mut bounds = Vec::with_capacity(self.feeds.len());
        let mut offset = 0;
        for feed in &self.feeds {
            bounds.push(offset..offset + feed.papers.len());
            offset += feed.papers.len();
        }

        let mut papers: Vec<&mut Paper> = self
            .feeds
            .iter_mut()
            .flat_map(|f| f.papers.iter_mut())
            .collect();
        let stats = refiner.refine(&mut papers).await;

        for (feed, range) in self.feeds.iter_mut().zip(bounds) {
            feed.refined = stats
                .refined_indices
                .iter()
                .filter(|&&i| range.contains(&i))
                .count();
        }
        stats
    }

    /// Write every feed to `{output_dir}/{target}.xml`.
    ///
    /// A failed write is logged and does not stop the other feeds. Returns the
    /// number of feeds written.
    pub async fn save_feeds(&self, output_dir: &Path) -> Result<usize, Box<dyn Error>> {
        ensure_writable_dir(output_dir).await?;
        let mut written = 0;
        for feed in &self.feeds {
            match atom::write_feed(output_dir, feed.target(), &feed.papers).await {
                Ok(_) => written += 1,
                Err(e) => error!(feed = %feed.target(), error = %e, "Failed to write feed"),
            }
        }
        if written < self.feeds.len() {
            warn!(written, total = self.feeds.len(), "Some feeds were not written");
        }
        Ok(written)
    }

    /// Log per-target totals, new papers and refined papers.
    pub fn print_update_stats(&self) {
        for feed in &self.feeds {
            info!(
                feed = %feed.target(),
                total = feed.papers.len(),
                new = feed.new_count(),
                refined = feed.refined,
                "Feed updated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeys;
    use crate::refine::fetch::tests::StubFetcher;

    fn pairing(source: &str, target: &str) -> Pairing {
        Pairing {
            source: source.to_string(),
            target: target.to_string(),
            online: false,
            append: true,
        }
    }

    fn stub(link: &str) -> Paper {
        Paper::stub(link, vec![], link)
    }

    fn saved(link: &str, title: &str) -> Paper {
        Paper::previously_parsed(title.to_string(), vec![], "saved".to_string(), link.to_string())
    }

    fn alert_feed(links: &[&str]) -> String {
        let html: String = links
            .iter()
            .map(|link| {
                format!(
                    r#"<h3><a class="gse_alrt_title" href="https://scholar.google.com/scholar_url?url={link}&amp;hl=en">Title {link}</a></h3>
<div style="color:#006621;line-height:18px">A Author - Venue, 2024</div>"#
                )
            })
            .collect();
        format!(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><content type="html">{}</content></entry></feed>"#,
            quick_xml::escape::escape(html.as_str())
        )
    }

    #[test]
    fn test_merge_prefers_saved_records_and_keeps_history() {
        let stubs = vec![stub("https://a/1"), stub("https://a/2"), stub("https://a/1")];
        let previous = vec![saved("https://a/old", "Old"), saved("https://a/2", "Saved two")];
        let merged = merge_with_previous(stubs, previous);

        let links: Vec<&str> = merged.iter().map(|p| p.link.as_str()).collect();
        assert_eq!(links, vec!["https://a/1", "https://a/2", "https://a/old"]);
        assert!(!merged[0].parsed);
        assert!(merged[1].parsed);
        assert_eq!(merged[1].title, "Saved two");
        assert!(merged[2].parsed);
    }

    #[test]
    fn test_remove_duplicates_first_occurrence_wins() {
        let mut list = FeedList::new(vec![pairing("a", "A"), pairing("b", "B")]);
        list.feeds[0].papers = vec![stub("https://x/1"), stub("https://x/2")];
        list.feeds[1].papers = vec![stub("https://x/2"), stub("https://x/3")];

        assert_eq!(list.remove_duplicates(), 1);
        let a: Vec<&str> = list.feeds[0].papers.iter().map(|p| p.link.as_str()).collect();
        let b: Vec<&str> = list.feeds[1].papers.iter().map(|p| p.link.as_str()).collect();
        assert_eq!(a, vec!["https://x/1", "https://x/2"]);
        assert_eq!(b, vec!["https://x/3"]);
    }

    #[tokio::test]
    async fn test_build_offline_feed_appends_to_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("alerts.xml");
        std::fs::write(&source, alert_feed(&["https://arxiv.org/abs/1", "https://arxiv.org/abs/2"])).unwrap();
        atom::write_feed(dir.path(), "out", &[saved("https://arxiv.org/abs/2", "Kept")])
            .await
            .unwrap();

        let mut list = FeedList::new(vec![pairing(source.to_str().unwrap(), "out")]);
        list.build_feeds(&StubFetcher::default(), dir.path()).await.unwrap();

        let feed = &list.feeds[0];
        assert_eq!(feed.papers.len(), 2);
        assert_eq!(feed.new_count(), 1);
        assert_eq!(feed.papers[1].title, "Kept");
        assert_eq!(feed.papers[1].domain, Some(crate::models::Domain::Arxiv));
    }

    #[tokio::test]
    async fn test_build_online_feed_uses_fetcher() {
        let body = alert_feed(&["https://www.nature.com/articles/s1"]);
        let fetcher = StubFetcher::with_bodies(&[("https://mail.test/alerts.xml", body.as_str())]);
        let dir = tempfile::tempdir().unwrap();
        let mut p = pairing("https://mail.test/alerts.xml", "n");
        p.online = true;
        p.append = false;

        let mut list = FeedList::new(vec![p]);
        list.build_feeds(&fetcher, dir.path()).await.unwrap();
        assert_eq!(list.feeds[0].papers.len(), 1);
        assert_eq!(fetcher.requested(), vec!["https://mail.test/alerts.xml".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_offline_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = FeedList::new(vec![pairing("/nonexistent/alerts.xml", "x")]);
        assert!(list.build_feeds(&StubFetcher::default(), dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_refine_and_save_counts_refined_per_feed() {
        let arxiv = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><id>http://arxiv.org/abs/2101.00002v1</id><title>Refined</title><summary>S</summary><author><name>N</name></author></entry></feed>"#;
        let url = "https://export.arxiv.org/api/query?id_list=2101.00002&max_results=1";
        let refiner = Refiner::new(StubFetcher::with_bodies(&[(url, arxiv)]), ApiKeys::default(), 4);

        let mut list = FeedList::new(vec![pairing("a", "A"), pairing("b", "B")]);
        list.feeds[0].papers = vec![saved("https://arxiv.org/abs/2101.00001", "Old")];
        list.feeds[1].papers = vec![stub("https://arxiv.org/abs/2101.00002")];

        let stats = list.refine_feeds(&refiner).await;
        assert_eq!(stats.refined, 1);
        assert_eq!(list.feeds[0].refined, 0);
        assert_eq!(list.feeds[1].refined, 1);
        assert_eq!(list.feeds[1].papers[0].title, "Refined");

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(list.save_feeds(dir.path()).await.unwrap(), 2);
        let reloaded = atom::load_previous(dir.path(), "B").await.unwrap();
        assert_eq!(reloaded[0].title, "Refined");
        list.print_update_stats();
    }
}
