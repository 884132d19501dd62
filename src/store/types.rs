use serde::{Deserialize, Serialize};

use crate::article::Pmid;
use crate::pipeline::FinalOutput;

/// Persisted subset of a processed document. One record per PMID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityRecord {
    pub pmid: Pmid,
    pub pmcid: Option<String>,
    pub url: String,
    pub summary: String,
    pub citation: String,
    pub article_type: Vec<String>,
}

/// A finished answer, keyed by the question that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub session_id: String,
    pub created_at: i64,
    pub output: FinalOutput,
}
