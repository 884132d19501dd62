//! PubMed Central article pages.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{Attempt, FetchError, FullTextProvider};
use crate::article::Document;
use crate::llm::{complete_with_retry, Completion, Generator, RetryPolicy};
use crate::prompts;

/// Section titles worth sending to the summarizer.
pub const SECTIONS_OF_INTEREST: [&str; 10] = [
    "Abstract",
    "Background",
    "Results",
    "Conclusions",
    "Discussion",
    "Methods",
    "Source of Funding",
    "Conflicts of Interest",
    "Table",
    "References",
];

pub fn article_url(pmcid: &str) -> String {
    format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/", pmcid)
}

/// An `h2` section with the paragraphs that follow it and its `h3` children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub text: String,
    pub subsections: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct PmcArticle {
    pub sections: Vec<Section>,
    /// Every data table as a normalised grid, in page order.
    pub tables: Vec<Vec<Vec<String>>>,
}

impl PmcArticle {
    pub fn titles(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.title.clone()).collect()
    }

    fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    /// `[Title] text` for each selected section followed by the tables.
    pub fn render(&self, selected: &[String]) -> String {
        let mut out = String::new();
        for title in selected {
            let Some(section) = self.section(title) else {
                continue;
            };
            out.push('[');
            out.push_str(&section.title);
            out.push_str("] ");
            out.push_str(&section.text);
            for (sub_title, sub_text) in &section.subsections {
                out.push(' ');
                // Reference lists are kept as they appear on the page.
                if !section.title.eq_ignore_ascii_case("references") {
                    out.push_str(sub_title);
                    out.push_str(": ");
                }
                out.push_str(sub_text);
            }
            out.push('\n');
        }
        for (i, table) in self.tables.iter().enumerate() {
            out.push_str(&format!("[Table {}]\n", i + 1));
            for row in table {
                out.push_str(&row.join(" | "));
                out.push('\n');
            }
        }
        out
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("selector {}: {}", css, e)))
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Paragraph text between a header and the next `h2`/`h3` sibling.
fn text_until_next_header(header: &ElementRef) -> String {
    let mut parts = Vec::new();
    for sibling in header.next_siblings().filter_map(ElementRef::wrap) {
        match sibling.value().name() {
            "h2" | "h3" => break,
            "p" => parts.push(element_text(&sibling)),
            _ => {}
        }
    }
    parts.join(" ")
}

/// HTML caps on span attributes; larger values are clamped.
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

fn span(cell: &ElementRef, attr: &str, max: usize) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, max)
}

fn fill_carried(out: &mut Vec<String>, col: &mut usize, carry: &mut [usize]) {
    while carry.get(*col).copied().unwrap_or(0) > 0 {
        out.push(String::new());
        carry[*col] -= 1;
        *col += 1;
    }
}

/// Flatten a table into rows, leaving empty cells where a span covers a
/// position so every cell sits under its column.
fn process_table(table: &ElementRef, rows: &Selector, cells: &Selector) -> Vec<Vec<String>> {
    let mut grid = Vec::new();
    // Rows still covered by a rowspan, per column.
    let mut carry: Vec<usize> = Vec::new();

    for row in table.select(rows) {
        let mut out = Vec::new();
        let mut col = 0;

        for cell in row.select(cells) {
            fill_carried(&mut out, &mut col, &mut carry);

            out.push(element_text(&cell));
            let colspan = span(&cell, "colspan", MAX_COLSPAN);
            out.extend(std::iter::repeat(String::new()).take(colspan - 1));

            let rowspan = span(&cell, "rowspan", MAX_ROWSPAN);
            let end = col.saturating_add(colspan);
            if carry.len() < end {
                carry.resize(end, 0);
            }
            if rowspan > 1 {
                carry[col..end].fill(rowspan - 1);
            }
            col = end;
        }
        fill_carried(&mut out, &mut col, &mut carry);
        grid.push(out);
    }
    grid
}

/// Split a PMC article page into sections and tables.
pub fn parse_article(html: &str) -> Result<PmcArticle, FetchError> {
    let document = Html::parse_document(html);
    let headers = selector("h2, h3")?;
    let tables = selector("table.default_table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    let mut article = PmcArticle::default();
    for header in document.select(&headers) {
        let title = element_text(&header);
        let text = text_until_next_header(&header);
        if header.value().name() == "h2" {
            // A repeated title replaces the earlier section.
            article.sections.retain(|s| s.title != title);
            article.sections.push(Section {
                title,
                text,
                subsections: Vec::new(),
            });
        } else if let Some(parent) = article.sections.last_mut() {
            parent.subsections.push((title, text));
        }
    }

    article.tables = document
        .select(&tables)
        .map(|t| process_table(&t, &rows, &cells))
        .collect();
    Ok(article)
}

/// Case-insensitive exact match of every canonical title. `None` unless all
/// of them are present.
pub fn exact_section_match(titles: &[String]) -> Option<Vec<String>> {
    SECTIONS_OF_INTEREST
        .iter()
        .map(|wanted| titles.iter().find(|t| t.eq_ignore_ascii_case(wanted)).cloned())
        .collect()
}

/// Read the `Category: title | title` answer, keeping only titles that exist
/// on the page, each once.
pub fn parse_section_map(response: &str, titles: &[String]) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    for line in response.lines() {
        let Some((_, value)) = line.split_once(':') else {
            continue;
        };
        for candidate in value.split('|') {
            let candidate = candidate.trim().trim_matches(|c| c == '\'' || c == '"');
            if candidate.is_empty() || candidate.contains("None") {
                continue;
            }
            if titles.iter().any(|t| t == candidate) && !selected.iter().any(|s| s == candidate) {
                selected.push(candidate.to_string());
            }
        }
    }
    selected
}

pub struct PmcProvider {
    http: reqwest::Client,
    llm: Arc<dyn Generator>,
    retry: RetryPolicy,
}

impl PmcProvider {
    pub fn new(http: reqwest::Client, llm: Arc<dyn Generator>, retry: RetryPolicy) -> Self {
        Self { http, llm, retry }
    }

    async fn select_sections(&self, titles: &[String]) -> Vec<String> {
        if let Some(exact) = exact_section_match(titles) {
            return exact;
        }
        let request = Completion::new(prompts::SECTION_MAP, titles.join(", "))
            .temperature(0.1)
            .light();
        match complete_with_retry(self.llm.as_ref(), &self.retry, &request).await {
            Ok(response) => parse_section_map(&response, titles),
            Err(e) => {
                warn!("section mapping failed, keeping every section: {}", e);
                titles.to_vec()
            }
        }
    }
}

#[async_trait]
impl FullTextProvider for PmcProvider {
    fn name(&self) -> &'static str {
        "pmc"
    }

    async fn attempt(&self, doc: &Document) -> Result<Attempt, FetchError> {
        let Some(pmcid) = doc.pmcid.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(Attempt::NotAvailable);
        };
        let resp = self.http.get(article_url(pmcid)).send().await?;
        let html = FetchError::check(resp).await?.text().await?;

        let article = parse_article(&html)?;
        if article.sections.is_empty() {
            return Ok(Attempt::NotAvailable);
        }
        let selected = self.select_sections(&article.titles()).await;
        debug!(pmcid, sections = ?selected, tables = article.tables.len(), "PMC sections selected");
        Ok(Attempt::FullText(article.render(&selected)))
    }
}
