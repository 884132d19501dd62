//! Full-text links listed on the PubMed article page.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use super::publishers::PublisherFetcher;
use super::{Attempt, FetchError, FullTextProvider};
use crate::article::Document;

/// Link providers in order of preference, matched as case-insensitive
/// substrings of the link label.
pub const PREFERRED_SOURCES: [&str; 8] = [
    "Elsevier",
    "Springer",
    "JAMA",
    "Silverchair Information Systems",
    "Wiley",
    "MDPI",
    "Taylor & Francis",
    "Cambridge University Press",
];

/// `(label, url)` pairs from the full-text links box, in page order. A label
/// seen twice keeps its first position and its last URL.
pub fn parse_links(html: &str) -> Result<Vec<(String, String)>, FetchError> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("div.full-text-links-list a")
        .map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut links: Vec<(String, String)> = Vec::new();
    for a in document.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let label = a
            .value()
            .attr("data-ga-action")
            .unwrap_or("No action found")
            .to_string();
        match links.iter_mut().find(|(l, _)| *l == label) {
            Some(existing) => existing.1 = href.to_string(),
            None => links.push((label, href.to_string())),
        }
    }
    Ok(links)
}

pub fn rank_links(links: &[(String, String)]) -> Option<&str> {
    PREFERRED_SOURCES.iter().find_map(|preferred| {
        let preferred = preferred.to_lowercase();
        links
            .iter()
            .find(|(label, _)| label.to_lowercase().contains(&preferred))
            .map(|(_, url)| url.as_str())
    })
}

/// Follows the preferred publisher link and hands it to the fetcher for
/// that host.
pub struct PublisherLinks {
    http: reqwest::Client,
    fetchers: Vec<Box<dyn PublisherFetcher>>,
}

impl PublisherLinks {
    pub fn new(http: reqwest::Client, fetchers: Vec<Box<dyn PublisherFetcher>>) -> Self {
        Self { http, fetchers }
    }

    pub fn fetcher_for(&self, link: &str) -> Option<&dyn PublisherFetcher> {
        self.fetchers
            .iter()
            .find(|f| link.contains(f.host_marker()))
            .map(|f| f.as_ref())
    }

    async fn preferred_link(&self, page_url: &str) -> Result<Option<String>, FetchError> {
        let resp = self.http.get(page_url).send().await?;
        let html = FetchError::check(resp).await?.text().await?;
        let links = parse_links(&html)?;
        Ok(rank_links(&links).map(str::to_string))
    }
}

#[async_trait]
impl FullTextProvider for PublisherLinks {
    fn name(&self) -> &'static str {
        "publisher"
    }

    async fn attempt(&self, doc: &Document) -> Result<Attempt, FetchError> {
        if doc.url.is_empty() {
            return Ok(Attempt::NotAvailable);
        }
        let Some(link) = self.preferred_link(&doc.url).await? else {
            return Ok(Attempt::NotAvailable);
        };
        let Some(fetcher) = self.fetcher_for(&link) else {
            debug!(pmid = %doc.pmid, link = %link, "no fetcher for preferred link");
            return Ok(Attempt::NotAvailable);
        };
        debug!(pmid = %doc.pmid, link = %link, publisher = fetcher.host_marker(), "fetching publisher full text");
        fetcher.fetch(&link).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulltext::publishers::{standard_fetchers, PublisherKeys};

    const PAGE: &str = r#"<html><body>
<div class="full-text-links-list">
  <a class="link-item" data-ga-action="Wiley" href="https://onlinelibrary.wiley.com/doi/10.1002/x.1">Wiley</a>
  <a class="link-item" data-ga-action="MDPI" href="https://www.mdpi.com/1/2/3">MDPI</a>
  <a class="link-item" data-ga-action="Silverchair Information Systems" href="https://jamanetwork.com/journals/jama/fullarticle/1">JAMA</a>
</div>
<div class="other"><a data-ga-action="Elsevier" href="https://elsevier.example/outside">x</a></div>
</body></html>"#;

    fn link(label: &str, url: &str) -> (String, String) {
        (label.to_string(), url.to_string())
    }

    #[test]
    fn test_parse_links_only_inside_links_box() {
        let links = parse_links(PAGE).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0], link("Wiley", "https://onlinelibrary.wiley.com/doi/10.1002/x.1"));
    }

    #[test]
    fn test_rank_by_preference() {
        let links = parse_links(PAGE).unwrap();
        assert_eq!(
            rank_links(&links),
            Some("https://jamanetwork.com/journals/jama/fullarticle/1")
        );

        let links = vec![
            link("MDPI", "https://mdpi/1"),
            link("ScienceDirect (Elsevier)", "https://linkinghub.elsevier.com/retrieve/pii/S1"),
        ];
        assert_eq!(
            rank_links(&links),
            Some("https://linkinghub.elsevier.com/retrieve/pii/S1")
        );
        assert_eq!(rank_links(&[link("Europe PMC", "https://europepmc.org/1")]), None);
    }

    #[test]
    fn test_dispatch_by_host_marker() {
        let http = reqwest::Client::new();
        let provider = PublisherLinks::new(http.clone(), standard_fetchers(http, PublisherKeys::default()));

        let marker = |url: &str| provider.fetcher_for(url).map(|f| f.host_marker());
        assert_eq!(marker("https://linkinghub.elsevier.com/retrieve/pii/S1"), Some("elsevier"));
        assert_eq!(marker("https://link.springer.com/article/10.1007/s1"), Some("springer"));
        assert_eq!(marker("https://jamanetwork.com/journals/jama/fullarticle/1"), Some("jamanetwork"));
        assert_eq!(marker("https://onlinelibrary.wiley.com/doi/10.1002/x"), Some("wiley"));
        assert_eq!(marker("https://www.mdpi.com/1/2/3"), None);
    }
}
