use std::collections::HashSet;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use crate::article::Document;
use crate::llm::{complete_with_retry, Completion, Generator, RetryPolicy};
use crate::prompts;
use crate::pubmed::Bibliography;
use crate::taskgroup::TaskGroup;

/// Contention points beyond this many are ignored.
pub const MAX_CONTENTION_QUERIES: usize = 4;

/// Search queries derived from one user question.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    pub general: String,
    /// Raw contention-point text, kept for diagnostics.
    pub contention: String,
    /// Contention queries followed by the general query.
    pub queries: Vec<String>,
}

fn query_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)Query:\s*(.+?)\s*$").expect("static regex"))
}

/// Pull every `Query:` line out of the contention text.
pub fn parse_contention_queries(text: &str) -> Vec<String> {
    query_line()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|q| !q.is_empty())
        .take(MAX_CONTENTION_QUERIES)
        .collect()
}

pub async fn generate_queries(
    llm: &dyn Generator,
    retry: &RetryPolicy,
    question: &str,
) -> Result<QuerySet> {
    let general_req = Completion::new(prompts::GENERAL_QUERY, question).temperature(0.7);
    let contention_req = Completion::new(prompts::POINTS_OF_CONTENTION, question).temperature(0.6);

    let (general, contention) = tokio::try_join!(
        complete_with_retry(llm, retry, &general_req),
        complete_with_retry(llm, retry, &contention_req),
    )?;
    let general = general.trim().to_string();

    let mut queries = parse_contention_queries(&contention);
    if !general.is_empty() {
        queries.push(general.clone());
    }
    info!(count = queries.len(), "search queries generated");
    debug!(?queries, "query list");

    Ok(QuerySet {
        general,
        contention,
        queries,
    })
}

/// Run every query, then merge the results keyed by PMID. The first query
/// that surfaced a document decides its position; later copies are dropped.
pub async fn collect_articles(
    bibliography: &dyn Bibliography,
    queries: &[String],
    per_query: usize,
) -> Vec<Document> {
    let group = TaskGroup::new("retrieval", queries.len().max(1));
    let batches = group
        .run(
            queries.to_vec(),
            |q| q.clone(),
            |query| async move { bibliography.search(&query, per_query).await },
        )
        .await
        .into_ordered();

    let total: usize = batches.iter().map(Vec::len).sum();
    let docs = dedup_by_pmid(batches.into_iter().flatten());
    info!(raw = total, unique = docs.len(), "articles collected");
    docs
}

pub fn dedup_by_pmid(docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(d.pmid.clone()))
        .collect()
}
