//! Full-text acquisition.
//!
//! A [`FullTextChain`] holds providers in priority order. Each provider either
//! produces the body text, declines, or fails; declines and failures both move
//! on to the next provider, and the abstract is used when every provider has
//! been tried.

pub mod links;
pub mod pdf;
pub mod pmc;
pub mod publishers;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::article::Document;
use crate::llm::{Generator, RetryPolicy};

/// Browser user agent; the PubMed and publisher pages reject the default one.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    FullText(String),
    /// The source answered but has nothing usable (closed access, no link).
    NotAvailable,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("no identifier in {0}")]
    MissingIdentifier(String),

    #[error("credential {0} is not set")]
    MissingCredential(&'static str),

    #[error("parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Turn a non-success response into a `Status` error, keeping the body.
    pub async fn check(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(FetchError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
pub trait FullTextProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, doc: &Document) -> Result<Attempt, FetchError>;
}

/// Body text chosen for a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub body: String,
    pub full_text_obtained: bool,
    /// Provider that produced the body, `"abstract"` for the fallback.
    pub source: &'static str,
}

pub struct FullTextChain {
    providers: Vec<Box<dyn FullTextProvider>>,
}

impl FullTextChain {
    pub fn new(providers: Vec<Box<dyn FullTextProvider>>) -> Self {
        Self { providers }
    }

    /// Open-repository HTML first, then the preferred publisher link.
    pub fn standard(
        http: reqwest::Client,
        llm: Arc<dyn Generator>,
        retry: RetryPolicy,
        keys: publishers::PublisherKeys,
    ) -> Self {
        Self::new(vec![
            Box::new(pmc::PmcProvider::new(http.clone(), llm, retry)),
            Box::new(links::PublisherLinks::new(
                http.clone(),
                publishers::standard_fetchers(http, keys),
            )),
        ])
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First provider returning text wins. Never fails: the abstract is the
    /// last resort.
    pub async fn resolve(&self, doc: &Document, abstract_text: &str) -> Resolved {
        for provider in &self.providers {
            match provider.attempt(doc).await {
                Ok(Attempt::FullText(text)) if !text.trim().is_empty() => {
                    info!(pmid = %doc.pmid, source = provider.name(), chars = text.len(), "full text obtained");
                    return Resolved {
                        body: text,
                        full_text_obtained: true,
                        source: provider.name(),
                    };
                }
                Ok(_) => {
                    debug!(pmid = %doc.pmid, source = provider.name(), "full text not available");
                }
                Err(e) => {
                    warn!(pmid = %doc.pmid, source = provider.name(), "full text fetch failed: {}", e);
                }
            }
        }
        Resolved {
            body: abstract_text.to_string(),
            full_text_obtained: false,
            source: "abstract",
        }
    }
}

pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(120))
        .build()
}

fn hyphen_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\s+").expect("static regex"))
}

/// Normalise text pulled out of PDFs and publisher payloads: line breaks and
/// exotic spaces become plain spaces, words hyphenated across lines are
/// joined, runs of whitespace collapse to one space.
pub fn clean_extracted_text(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\u{202f}' | '\u{2002}' | '\u{a0}' => ' ',
            other => other,
        })
        .collect();
    let joined = hyphen_break().replace_all(&spaced, "");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}
