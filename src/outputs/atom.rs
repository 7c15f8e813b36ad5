//! Atom feed output and reloading of previously written feeds.
//!
//! Each target is written to `{output_dir}/{target}.xml`. On the next run the
//! same file is read back so papers refined earlier are carried over instead
//! of being requested again.
//!
//! ```text
//! feeds/
//! ├── vision.xml
//! └── robotics.xml
//! ```

use crate::models::Paper;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: String,
}

impl AtomEntry {
    fn into_paper(self) -> Option<Paper> {
        let link = if self.id.trim().is_empty() {
            self.links
                .into_iter()
                .find(|l| l.rel.is_empty() || l.rel == "alternate")
                .map(|l| l.href)?
        } else {
            self.id
        };
        Some(Paper::previously_parsed(
            self.title.trim().to_string(),
            self.authors
                .into_iter()
                .map(|a| a.name.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            self.summary.trim().to_string(),
            link.trim().to_string(),
        ))
    }
}

/// Path of the feed file for `target`.
pub fn feed_path(output_dir: &Path, target: &str) -> PathBuf {
    output_dir.join(format!("{target}.xml"))
}

/// Render `papers` as an Atom document titled `target`.
pub fn render_feed(target: &str, papers: &[Paper], updated: DateTime<Utc>) -> Result<String, fmt::Error> {
    let updated = updated.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut xml = String::new();

    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(xml, r#"<feed xmlns="{ATOM_NS}">"#)?;
    writeln!(xml, "  <title>{}</title>", escape(target))?;
    writeln!(xml, "  <id>urn:scholar-feeds:{}</id>", escape(target))?;
    writeln!(xml, "  <updated>{updated}</updated>")?;
    for paper in papers {
        write_entry(&mut xml, paper, &updated)?;
    }
    writeln!(xml, "</feed>")?;
    Ok(xml)
}

fn write_entry(xml: &mut String, paper: &Paper, updated: &str) -> fmt::Result {
    let link = escape(paper.link.as_str());
    writeln!(xml, "  <entry>")?;
    writeln!(xml, "    <id>{link}</id>")?;
    writeln!(xml, "    <title>{}</title>", escape(paper.title.as_str()))?;
    writeln!(xml, "    <updated>{updated}</updated>")?;
    writeln!(xml, "    <summary>{}</summary>", escape(paper.abstract_text.as_str()))?;
    for author in &paper.authors {
        writeln!(xml, "    <author><name>{}</name></author>", escape(author.as_str()))?;
    }
    writeln!(xml, r#"    <link href="{link}" rel="alternate" type="text/html"/>"#)?;
    writeln!(
        xml,
        r#"    <link title="pdf" href="{link}" rel="related" type="application/pdf"/>"#
    )?;
    writeln!(xml, "  </entry>")
}

/// Write the feed for `target` into `output_dir`, creating the directory.
#[instrument(level = "info", skip_all, fields(feed = %target, papers = papers.len()))]
pub async fn write_feed(output_dir: &Path, target: &str, papers: &[Paper]) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = feed_path(output_dir, target);
    let xml = render_feed(target, papers, Utc::now())?;
    fs::write(&path, xml).await?;
    info!(path = %path.display(), "Wrote Atom feed");
    Ok(path)
}

/// Parse a feed previously produced by [`render_feed`].
///
/// Every entry becomes a `parsed` paper. Entries without any link are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, Box<dyn Error>> {
    let feed: AtomFeed = quick_xml::de::from_str(xml)?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(AtomEntry::into_paper)
        .collect())
}

/// Load the previous output for `target`, or nothing if it does not exist yet.
#[instrument(level = "debug", skip_all, fields(feed = %target))]
pub async fn load_previous(output_dir: &Path, target: &str) -> Result<Vec<Paper>, Box<dyn Error>> {
    let path = feed_path(output_dir, target);
    if !fs::try_exists(&path).await? {
        debug!(path = %path.display(), "No previous feed");
        return Ok(Vec::new());
    }
    let xml = fs::read_to_string(&path).await?;
    let papers = parse_feed(&xml)?;
    info!(path = %path.display(), papers = papers.len(), "Loaded previous feed");
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn paper(title: &str, link: &str, authors: &[&str], abstract_text: &str) -> Paper {
        let mut p = Paper::stub(title, authors.iter().map(|a| a.to_string()).collect(), link);
        p.abstract_text = abstract_text.to_string();
        p
    }

    #[test]
    fn test_render_escapes_and_lists_authors() {
        let updated = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let papers = vec![paper(
            "Cats & <Dogs>",
            "https://arxiv.org/abs/2101.00001?a=1&b=2",
            &["Ada Lovelace", "Alan Turing"],
            "We \"study\" it.",
        )];
        let xml = render_feed("vision", &papers, updated).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#));
        assert!(xml.contains("<title>vision</title>"));
        assert!(xml.contains("<updated>2024-03-01T12:00:00Z</updated>"));
        assert!(xml.contains("<title>Cats &amp; &lt;Dogs&gt;</title>"));
        assert!(xml.contains("<id>https://arxiv.org/abs/2101.00001?a=1&amp;b=2</id>"));
        assert!(xml.contains("<author><name>Ada Lovelace</name></author>"));
        assert!(xml.contains("<author><name>Alan Turing</name></author>"));
        assert!(xml.contains(r#"rel="related" type="application/pdf""#));
        assert!(xml.trim_end().ends_with("</feed>"));
    }

    #[test]
    fn test_render_empty_feed() {
        let updated = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let xml = render_feed("empty", &[], updated).unwrap();
        assert!(!xml.contains("<entry>"));
        assert!(xml.contains("<id>urn:scholar-feeds:empty</id>"));
        assert!(parse_feed(&xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rendered_feed_marks_papers_parsed() {
        let papers = vec![
            paper("First & best", "https://arxiv.org/abs/1", &["A", "B"], "Abs <one>"),
            paper("Second", "https://www.nature.com/articles/s2", &[], ""),
        ];
        let xml = render_feed("t", &papers, Utc::now()).unwrap();
        let loaded = parse_feed(&xml).unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|p| p.parsed && p.html_content.is_none()));
        assert_eq!(loaded[0].title, "First & best");
        assert_eq!(loaded[0].authors, vec!["A", "B"]);
        assert_eq!(loaded[0].abstract_text, "Abs <one>");
        assert_eq!(loaded[1].link, "https://www.nature.com/articles/s2");
        assert!(loaded[1].authors.is_empty());
    }

    #[test]
    fn test_parse_feed_without_entries() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_load_previous() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let papers = vec![paper("T", "https://arxiv.org/abs/2", &["X"], "S")];

        let path = write_feed(&out, "robotics", &papers).await.unwrap();
        assert_eq!(path, out.join("robotics.xml"));

        let loaded = load_previous(&out, "robotics").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "T");
        assert!(loaded[0].parsed);
    }

    #[tokio::test]
    async fn test_load_previous_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_previous(dir.path(), "nothing").await.unwrap().is_empty());
    }
}
