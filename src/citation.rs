//! AMA-style citation strings built from bibliographic metadata.
//!
//! Every missing field becomes an empty string; building a citation never fails.

use crate::article::{Bibliographic, Document, PubDate};

/// Treat absent parts and the literal "None" some records carry as missing.
fn present(part: &Option<String>) -> Option<&str> {
    part.as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "None")
}

/// Most specific date the record supports: "Jun 5, 2021", "Jun 2021", "2021",
/// otherwise the free-text MedlineDate, otherwise empty.
pub fn resolve_pub_date(date: &PubDate) -> String {
    match (present(&date.year), present(&date.month), present(&date.day)) {
        (Some(year), Some(month), Some(day)) => format!("{} {}, {}", month, day, year),
        (Some(year), Some(month), None) => format!("{} {}", month, year),
        (Some(year), None, _) => year.to_string(),
        (None, _, _) => present(&date.medline_date).unwrap_or_default().to_string(),
    }
}

fn author_names(bib: &Bibliographic) -> String {
    bib.authors
        .iter()
        .map(|a| {
            if a.initials.is_empty() {
                a.last_name.clone()
            } else {
                format!("{} {}", a.last_name, a.initials)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Structured article-id DOI first, then the electronic-location DOI.
fn resolve_doi(bib: &Bibliographic) -> &str {
    present(&bib.doi)
        .or_else(|| present(&bib.elocation_doi))
        .unwrap_or_default()
}

pub fn ama_citation(title: &str, bib: &Bibliographic) -> String {
    let authors = author_names(bib);
    let journal = present(&bib.journal).unwrap_or_default();
    let date = resolve_pub_date(&bib.pub_date);
    let volume = present(&bib.volume).unwrap_or_default();
    let issue = present(&bib.issue).unwrap_or_default();
    let pages = present(&bib.pages).unwrap_or_default();
    let doi = resolve_doi(bib);

    // Titles that already end in a period don't get a second one.
    let title_sep = if title.ends_with('.') { "" } else { "." };
    format!(
        "{}. {}{} {}. {};{}({}):{}. {}",
        authors, title, title_sep, journal, date, volume, issue, pages, doi
    )
}

pub fn for_document(doc: &Document) -> String {
    ama_citation(&doc.title, &doc.bibliographic)
}
