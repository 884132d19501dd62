pub mod parse;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::article::Document;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Bibliographic search/fetch capability: a query in, full records out,
/// ordered by the source's relevance ranking.
#[async_trait]
pub trait Bibliography: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>>;
}

/// NCBI E-utilities client (esearch + efetch).
pub struct PubMedClient {
    client: reqwest::Client,
    email: Option<String>,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn from_env() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            email: dotenv::var("ENTREZ_EMAIL").ok().filter(|v| !v.is_empty()),
            api_key: dotenv::var("NCBI_API_KEY").ok().filter(|v| !v.is_empty()),
        })
    }

    fn identity(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", "dietnerd".to_string())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn esearch(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", max_results.to_string()),
            ("sort", "relevance".to_string()),
            ("retmode", "json".to_string()),
        ];
        params.extend(self.identity());

        let json: serde_json::Value = self
            .client
            .get(format!("{}/esearch.fcgi", EUTILS_BASE))
            .query(&params)
            .send()
            .await
            .context("esearch request failed")?
            .error_for_status()
            .context("esearch returned an error status")?
            .json()
            .await
            .context("Failed to parse esearch JSON")?;

        Ok(json["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn efetch(&self, ids: &[String]) -> Result<Vec<Document>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("rettype", "xml".to_string()),
            ("retmode", "xml".to_string()),
        ];
        params.extend(self.identity());

        let xml = self
            .client
            .get(format!("{}/efetch.fcgi", EUTILS_BASE))
            .query(&params)
            .send()
            .await
            .context("efetch request failed")?
            .error_for_status()
            .context("efetch returned an error status")?
            .text()
            .await
            .context("Failed to read efetch body")?;

        parse::parse_article_set(&xml)
    }
}

#[async_trait]
impl Bibliography for PubMedClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>> {
        let ids = self.esearch(query, max_results).await?;
        if ids.is_empty() {
            debug!(query, "esearch returned no ids");
            return Ok(vec![]);
        }
        let docs = self.efetch(&ids).await?;
        debug!(query, ids = ids.len(), fetched = docs.len(), "PubMed search complete");
        Ok(docs)
    }
}
