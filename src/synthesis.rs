//! Final answer generation and reconciliation of its reference list against
//! the evidence documents.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::article::Document;
use crate::llm::{complete_with_retry, Completion, Generator, RetryPolicy};
use crate::prompts;

/// What a reference line in the answer points back to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationTarget {
    pub pmid: String,
    pub pmcid: Option<String>,
    pub url: String,
    pub summary: String,
}

/// Reference line (as generated) → source document.
pub type CitationMap = BTreeMap<String, CitationTarget>;

#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    /// Generated text with the disclaimer appended.
    pub answer: String,
    pub main_answer: String,
    pub references: Vec<String>,
    pub citations: CitationMap,
}

fn evidence_payload(docs: &[Document]) -> Result<String> {
    let evidence: Vec<_> = docs
        .iter()
        .map(|d| {
            json!({
                "pmid": d.pmid,
                "citation": d.citation,
                "publication_type": d.publication_types,
                "summary": d.summary,
            })
        })
        .collect();
    serde_json::to_string_pretty(&evidence).context("serialize evidence")
}

/// Generate the answer from the evidence and append the disclaimer. With no
/// evidence the fixed no-evidence answer is returned and nothing is generated.
pub async fn generate_answer(
    llm: &dyn Generator,
    retry: &RetryPolicy,
    question: &str,
    docs: &[Document],
    min_docs: usize,
    max_docs: usize,
) -> Result<String> {
    if docs.is_empty() {
        info!("no evidence documents, skipping generation");
        return Ok(format!("{}\n{}", prompts::NO_EVIDENCE, prompts::DISCLAIMER));
    }
    let system = prompts::SYNTHESIS
        .replace("{min_docs}", &min_docs.min(docs.len()).to_string())
        .replace("{max_docs}", &max_docs.to_string());
    let user = format!(
        "Evidence and Claims: {}\nUser Question: {}",
        evidence_payload(docs)?,
        question
    );
    let request = Completion::new(system, user).temperature(0.5);
    let output = complete_with_retry(llm, retry, &request).await?;
    Ok(format!("{}\n{}", output, prompts::DISCLAIMER))
}

fn references_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?s)(#*\s*\*\*References\*\*:|#*\s*References:|#*\s*References\b|#*\s*Reference:|#*\s*Reference\b)(.*?)({})",
            regex::escape(prompts::DISCLAIMER_LEAD)
        ))
        .expect("static regex")
    })
}

/// Split the answer at its reference heading. Everything up to the heading
/// is the main answer; the non-blank lines between the heading and the
/// disclaimer are the references. Without a heading the whole text is the
/// main answer.
pub fn split_end_output(text: &str) -> (String, Vec<String>) {
    let Some(caps) = references_heading().captures(text) else {
        return (text.trim().to_string(), Vec::new());
    };
    let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
    let main = text[..start].trim().to_string();
    let references = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    (main, references)
}

struct Patterns {
    numbering: Regex,
    et_al: Regex,
    punctuation: Regex,
    pmid: Regex,
}

fn patterns() -> &'static Patterns {
    static RE: OnceLock<Patterns> = OnceLock::new();
    RE.get_or_init(|| Patterns {
        numbering: Regex::new(r"^\s*\[?\d+\.?\]?\s*").expect("static regex"),
        et_al: Regex::new(r"(?i)\bet\s+al\b\.?").expect("static regex"),
        punctuation: Regex::new(r"[^\w\s]").expect("static regex"),
        pmid: Regex::new(r"(?i)\bPMID:?\s*(\d+)").expect("static regex"),
    })
}

/// Strip leading numbering and "et al.", drop punctuation, lowercase,
/// collapse whitespace.
pub fn normalize_citation(citation: &str) -> String {
    let p = patterns();
    let text = p.numbering.replace(citation, "");
    let text = p.et_al.replace_all(&text, "");
    let lower = text.to_lowercase();
    let text = p.punctuation.replace_all(&lower, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// PMID marker embedded in a generated reference line.
pub fn embedded_pmid(citation: &str) -> Option<&str> {
    patterns()
        .pmid
        .captures(citation)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Characters 10..20 of the normalized citation, `None` when that window is
/// empty.
fn heuristic_key(normalized: &str) -> Option<String> {
    let key: String = normalized.chars().skip(10).take(10).collect();
    (!key.is_empty()).then_some(key)
}

fn target(doc: &Document) -> CitationTarget {
    CitationTarget {
        pmid: doc.pmid.clone(),
        pmcid: doc.pmcid.clone(),
        url: doc.url.clone(),
        summary: doc.summary.clone(),
    }
}

/// Map each reference line to the document it cites. A line carrying a PMID
/// of one of the documents joins on it; otherwise the first document (in
/// `docs` order) whose normalized citation contains the line's heuristic key
/// wins. Unmatched lines are left out.
pub fn match_citations(citations: &[String], docs: &[Document]) -> CitationMap {
    let normalized: Vec<String> = docs.iter().map(|d| normalize_citation(&d.citation)).collect();
    let mut map = CitationMap::new();

    for citation in citations {
        let by_pmid = embedded_pmid(citation).and_then(|id| docs.iter().find(|d| d.pmid == id));
        let matched = by_pmid.or_else(|| {
            let key = heuristic_key(&normalize_citation(citation))?;
            docs.iter()
                .zip(&normalized)
                .find(|(_, n)| n.contains(&key))
                .map(|(d, _)| d)
        });
        match matched {
            Some(doc) => {
                map.insert(citation.clone(), target(doc));
            }
            None => debug!(citation = %citation, "reference not matched to a document"),
        }
    }
    map
}

pub async fn synthesize(
    llm: &dyn Generator,
    retry: &RetryPolicy,
    question: &str,
    docs: &[Document],
    min_docs: usize,
    max_docs: usize,
) -> Result<Synthesis> {
    let answer = generate_answer(llm, retry, question, docs, min_docs, max_docs).await?;
    let (main_answer, references) = split_end_output(&answer);
    let citations = match_citations(&references, docs);
    info!(
        references = references.len(),
        matched = citations.len(),
        "answer synthesized"
    );
    Ok(Synthesis {
        answer,
        main_answer,
        references,
        citations,
    })
}
