//! Publisher-specific fetchers reached through the PubMed full-text links.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::pdf;
use super::{clean_extracted_text, Attempt, FetchError};

/// API credentials for the publisher fetchers. Each is optional; a fetcher
/// without its credential fails with `MissingCredential`.
#[derive(Debug, Clone, Default)]
pub struct PublisherKeys {
    pub elsevier: Option<String>,
    pub springer: Option<String>,
    pub wiley: Option<String>,
}

impl PublisherKeys {
    pub fn from_env() -> Self {
        let var = |name: &str| dotenv::var(name).ok().filter(|v| !v.is_empty());
        Self {
            elsevier: var("ELSEVIER_API_KEY"),
            springer: var("SPRINGER_API_KEY"),
            wiley: var("WILEY_CLIENT_TOKEN"),
        }
    }
}

#[async_trait]
pub trait PublisherFetcher: Send + Sync {
    /// Substring of a link URL that routes it to this fetcher.
    fn host_marker(&self) -> &'static str;

    async fn fetch(&self, link: &str) -> Result<Attempt, FetchError>;
}

pub fn standard_fetchers(http: reqwest::Client, keys: PublisherKeys) -> Vec<Box<dyn PublisherFetcher>> {
    vec![
        Box::new(Elsevier {
            http: http.clone(),
            api_key: keys.elsevier,
        }),
        Box::new(Springer {
            http: http.clone(),
            api_key: keys.springer,
        }),
        Box::new(Jama { http: http.clone() }),
        Box::new(Wiley {
            http,
            client_token: keys.wiley,
        }),
    ]
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, FetchError> {
    value.as_deref().ok_or(FetchError::MissingCredential(name))
}

pub struct Elsevier {
    http: reqwest::Client,
    api_key: Option<String>,
}

pub fn extract_pii(link: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/pii/([^/]+)").expect("static regex"));
    re.captures(link).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Full text from an article API response, only when the article is open
/// access.
pub fn elsevier_text(body: &Value) -> Attempt {
    let response = &body["full-text-retrieval-response"];
    let open_access = match &response["coredata"]["openaccess"] {
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s == "1",
        _ => false,
    };
    if !open_access {
        return Attempt::NotAvailable;
    }
    match &response["originalText"] {
        Value::Null => Attempt::NotAvailable,
        Value::String(s) => Attempt::FullText(clean_extracted_text(s)),
        other => Attempt::FullText(clean_extracted_text(&other.to_string())),
    }
}

#[async_trait]
impl PublisherFetcher for Elsevier {
    fn host_marker(&self) -> &'static str {
        "elsevier"
    }

    async fn fetch(&self, link: &str) -> Result<Attempt, FetchError> {
        let api_key = required(&self.api_key, "ELSEVIER_API_KEY")?;
        let pii = extract_pii(link).ok_or_else(|| FetchError::MissingIdentifier(link.to_string()))?;

        let resp = self
            .http
            .get(format!("https://api.elsevier.com/content/article/pii/{}", pii))
            .header("X-ELS-APIKey", api_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        let body: Value = FetchError::check(resp).await?.json().await?;
        let attempt = elsevier_text(&body);
        if attempt == Attempt::NotAvailable {
            debug!(pii, "Elsevier article is not open access");
        }
        Ok(attempt)
    }
}

const SPRINGER_ARTICLE_BASE: &str = "https://link.springer.com/article/";

pub struct Springer {
    http: reqwest::Client,
    api_key: Option<String>,
}

pub fn extract_doi_springer(link: &str) -> Option<&str> {
    link.split(SPRINGER_ARTICLE_BASE)
        .nth(1)
        .filter(|doi| !doi.is_empty())
}

#[async_trait]
impl PublisherFetcher for Springer {
    fn host_marker(&self) -> &'static str {
        "springer"
    }

    async fn fetch(&self, link: &str) -> Result<Attempt, FetchError> {
        let api_key = required(&self.api_key, "SPRINGER_API_KEY")?;
        let doi = extract_doi_springer(link)
            .ok_or_else(|| FetchError::MissingIdentifier(link.to_string()))?;

        let resp = self
            .http
            .get(format!("https://link.springer.com/content/pdf/{}.pdf", doi))
            .header("Accept", "application/pdf")
            .header("X-API-Key", api_key)
            .send()
            .await?;
        let bytes = FetchError::check(resp).await?.bytes().await?;
        let pages = pdf::pdf_pages(bytes.to_vec()).await?;
        Ok(Attempt::FullText(clean_extracted_text(&pdf::join_raw(&pages))))
    }
}

pub struct Jama {
    http: reqwest::Client,
}

/// Text of every paragraph and heading in page order, one per line.
pub fn jama_text(html: &str) -> Result<String, FetchError> {
    let document = Html::parse_document(html);
    let content = Selector::parse("p, h1, h2, h3, h4, h5, h6")
        .map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(document
        .select(&content)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[async_trait]
impl PublisherFetcher for Jama {
    fn host_marker(&self) -> &'static str {
        "jamanetwork"
    }

    async fn fetch(&self, link: &str) -> Result<Attempt, FetchError> {
        let resp = self.http.get(link).send().await?;
        let html = FetchError::check(resp).await?.text().await?;
        Ok(Attempt::FullText(clean_extracted_text(&jama_text(&html)?)))
    }
}

pub struct Wiley {
    http: reqwest::Client,
    client_token: Option<String>,
}

pub fn extract_doi_wiley(link: &str) -> Option<&str> {
    link.split_once("doi/")
        .map(|(_, doi)| doi)
        .filter(|doi| !doi.is_empty())
}

pub fn wiley_tdm_url(doi: &str) -> String {
    format!(
        "https://api.wiley.com/onlinelibrary/tdm/v1/articles/{}",
        urlencoding::encode(doi)
    )
}

#[async_trait]
impl PublisherFetcher for Wiley {
    fn host_marker(&self) -> &'static str {
        "wiley"
    }

    async fn fetch(&self, link: &str) -> Result<Attempt, FetchError> {
        let token = required(&self.client_token, "WILEY_CLIENT_TOKEN")?;
        let doi = extract_doi_wiley(link).ok_or_else(|| FetchError::MissingIdentifier(link.to_string()))?;

        let resp = self
            .http
            .get(wiley_tdm_url(doi))
            .header("Wiley-TDM-Client-Token", token)
            .header("Accept", "application/pdf")
            .send()
            .await?;
        let bytes = FetchError::check(resp).await?.bytes().await?;
        let pages = pdf::pdf_pages(bytes.to_vec()).await?;
        Ok(Attempt::FullText(clean_extracted_text(&pdf::join_trimmed_lines(&pages))))
    }
}
