//! Google Scholar alert parsing.
//!
//! Alert emails are consumed through an email-to-Atom bridge: every alert
//! email becomes one `<entry>` whose `<content>` holds the email's HTML. Each
//! paper in the email is an `a.gse_alrt_title` link wrapped in a Scholar
//! redirect, followed by a green line of the form
//! `A Author, B Author - Venue, Year`.

use crate::models::Paper;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, warn};

static ALERT_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.gse_alrt_title").expect("valid selector"));
static ALERT_AUTHORS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[style="color:#006621;line-height:18px"]"#).expect("valid selector")
});
// The author list ends at the first dash surrounded by whitespace, so
// hyphenated names survive.
static VENUE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s[-\u{2010}-\u{2014}]\s").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct AlertFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AlertEntry>,
}

#[derive(Debug, Deserialize)]
struct AlertEntry {
    #[serde(default)]
    content: Option<AlertContent>,
}

#[derive(Debug, Deserialize)]
struct AlertContent {
    #[serde(rename = "$text", default)]
    html: String,
}

/// Parse an alert feed into paper stubs, in the order the alerts list them.
///
/// Duplicates are kept; the caller decides which occurrence survives.
pub fn parse_alert_feed(xml: &str) -> Result<Vec<Paper>, Box<dyn Error>> {
    let feed: AlertFeed = quick_xml::de::from_str(xml)?;
    let mut stubs = Vec::new();
    for (i, entry) in feed.entries.into_iter().enumerate() {
        let Some(content) = entry.content else {
            debug!(entry = i, "Alert entry without content");
            continue;
        };
        stubs.extend(parse_alert_html(&content.html));
    }
    Ok(stubs)
}

/// Extract the papers listed in one alert email.
pub fn parse_alert_html(html: &str) -> Vec<Paper> {
    let document = Html::parse_fragment(html);
    let titles = document.select(&ALERT_TITLE);
    let authors = document.select(&ALERT_AUTHORS);

    titles
        .zip(authors)
        .filter_map(|(title, authors)| {
            let href = title.value().attr("href").unwrap_or_default();
            let Some(link) = unwrap_scholar_redirect(href) else {
                warn!(href = %crate::utils::truncate_for_log(href, 120), "Alert link without target url");
                return None;
            };
            Some(Paper::stub(&element_text(title), author_names(&element_text(authors)), &link))
        })
        .collect()
}

/// Target of a `scholar.google.com/scholar_url?url=...` redirect.
pub fn unwrap_scholar_redirect(href: &str) -> Option<String> {
    let url = url::Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Names from a Scholar author line, stopping at the venue.
pub fn author_names(line: &str) -> Vec<String> {
    let names = VENUE_SEPARATOR.split(line).next().unwrap_or_default();
    names
        .split(',')
        .map(|name| name.trim().trim_end_matches('…').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Domain;

    const ALERT_HTML: &str = r#"<div>
<h3><a class="gse_alrt_title" href="https://scholar.google.com/scholar_url?url=https://arxiv.org/abs/2101.00001&amp;hl=en&amp;sa=X">Deep <b>Learning</b> for Cats</a></h3>
<div style="color:#006621;line-height:18px">J Doe, A Smith-Jones - arXiv preprint arXiv:2101.00001, 2021</div>
<h3><a class="gse_alrt_title" href="https://scholar.google.com/scholar_url?url=https%3A%2F%2Fwww.nature.com%2Farticles%2Fs41586-021-1&amp;hl=en">A Nature Paper</a></h3>
<div style="color:#006621;line-height:18px">B Lee, C Kim, D Park… - Nature, 2021</div>
<h3><a class="gse_alrt_title" href="https://scholar.google.com/citations?hl=en">Broken</a></h3>
<div style="color:#006621;line-height:18px">E Nobody - Somewhere, 2021</div>
</div>"#;

    #[test]
    fn test_parse_alert_html() {
        let papers = parse_alert_html(ALERT_HTML);
        assert_eq!(papers.len(), 2);

        assert_eq!(papers[0].title, "Deep Learning for Cats");
        assert_eq!(papers[0].link, "https://arxiv.org/abs/2101.00001");
        assert_eq!(papers[0].authors, vec!["J Doe", "A Smith-Jones"]);
        assert_eq!(papers[0].domain, Some(Domain::Arxiv));
        assert!(papers[0].abstract_text.is_empty());
        assert!(!papers[0].parsed);

        assert_eq!(papers[1].link, "https://www.nature.com/articles/s41586-021-1");
        assert_eq!(papers[1].authors, vec!["B Lee", "C Kim", "D Park"]);
        assert_eq!(papers[1].domain, Some(Domain::Nature));
    }

    #[test]
    fn test_parse_alert_feed_reads_every_entry() {
        let escaped = quick_xml::escape::escape(ALERT_HTML);
        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Scholar alerts</title>
  <entry><title>Alert one</title><content type="html">{escaped}</content></entry>
  <entry><title>Alert two</title><content type="html">{escaped}</content></entry>
  <entry><title>No content</title></entry>
</feed>"#
        );
        let papers = parse_alert_feed(&xml).unwrap();
        assert_eq!(papers.len(), 4);
        assert_eq!(papers[2].link, papers[0].link);
    }

    #[test]
    fn test_author_names() {
        assert_eq!(author_names("X Wang, Y Li - CVPR, 2021"), vec!["X Wang", "Y Li"]);
        assert_eq!(author_names("Only One"), vec!["Only One"]);
        assert_eq!(
            author_names("J-P Sartre, M Merleau-Ponty\u{a0}- Phenomenology, 1945"),
            vec!["J-P Sartre", "M Merleau-Ponty"]
        );
        assert!(author_names(" - Venue").is_empty());
    }

    #[test]
    fn test_unwrap_scholar_redirect() {
        assert_eq!(
            unwrap_scholar_redirect("https://scholar.google.com/scholar_url?url=https://x.org/a&hl=en").as_deref(),
            Some("https://x.org/a")
        );
        assert_eq!(unwrap_scholar_redirect("https://scholar.google.com/scholar_url?hl=en"), None);
        assert_eq!(unwrap_scholar_redirect("not a url"), None);
    }
}
