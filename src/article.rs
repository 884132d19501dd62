use serde::{Deserialize, Serialize};

use crate::store::types::ReliabilityRecord;

/// PubMed identifier, the dedup and cache key for every document.
pub type Pmid = String;

/// One labeled piece of a structured abstract ("BACKGROUND", "METHODS", ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractSection {
    pub label: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub last_name: String,
    pub initials: String,
}

/// Publication date parts as they appear in the record. Any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubDate {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    /// Free-text date ("2019 Jan-Feb") used by records without a Year element.
    pub medline_date: Option<String>,
}

/// Bibliographic metadata needed to build a citation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bibliographic {
    pub authors: Vec<Author>,
    pub journal: Option<String>,
    pub pub_date: PubDate,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    /// DOI from the structured article id list.
    pub doi: Option<String>,
    /// DOI from the in-text electronic location marker.
    pub elocation_doi: Option<String>,
}

/// A retrieved article moving through the pipeline.
///
/// Created by retrieval with bibliographic fields filled, enriched in place by
/// the processor, or replaced wholesale by a cached [`ReliabilityRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub pmid: Pmid,
    pub pmcid: Option<String>,
    pub title: String,
    pub abstract_sections: Vec<AbstractSection>,
    pub publication_types: Vec<String>,
    pub url: String,
    pub bibliographic: Bibliographic,
    pub full_text_obtained: bool,
    pub body: String,
    pub citation: String,
    pub summary: String,
    pub is_relevant: Option<bool>,
}

impl Document {
    pub fn pubmed_url(pmid: &str) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)
    }

    /// Join the labeled abstract segments into one text, blank line between
    /// segments, each prefixed by its label when it has one.
    /// Returns `None` when the record carries no abstract at all.
    pub fn reconstructed_abstract(&self) -> Option<String> {
        if self.abstract_sections.is_empty() {
            return None;
        }
        let mut out = String::new();
        for section in &self.abstract_sections {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            if let Some(label) = section.label.as_deref().filter(|l| !l.is_empty()) {
                out.push_str(label);
                out.push_str(":\n");
            }
            out.push_str(&section.text);
        }
        Some(out)
    }

    /// The persisted subset written to the reliability cache.
    pub fn to_record(&self) -> ReliabilityRecord {
        ReliabilityRecord {
            pmid: self.pmid.clone(),
            pmcid: self.pmcid.clone(),
            url: self.url.clone(),
            summary: self.summary.clone(),
            citation: self.citation.clone(),
            article_type: self.publication_types.clone(),
        }
    }
}

impl From<ReliabilityRecord> for Document {
    fn from(record: ReliabilityRecord) -> Self {
        Self {
            pmid: record.pmid,
            pmcid: record.pmcid,
            url: record.url,
            summary: record.summary,
            citation: record.citation,
            publication_types: record.article_type,
            is_relevant: Some(true),
            ..Self::default()
        }
    }
}
