//! Event-driven parser for efetch `PubmedArticleSet` XML.
//!
//! Only the elements the pipeline needs are captured. Matching is done on the
//! element path so that ids nested in reference lists or comment corrections
//! never leak into the article's own fields.

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::article::{AbstractSection, Author, Document};

/// What the text of the element currently being captured belongs to.
#[derive(Debug, Clone)]
enum Field {
    Pmid,
    Title,
    Journal,
    Volume,
    Issue,
    Year,
    Month,
    Day,
    MedlineDate,
    Pages,
    AbstractText(Option<String>),
    LastName,
    Initials,
    CollectiveName,
    PublicationType,
    ELocationDoi,
    ArticleId(String),
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn field_for(path: &[String], e: &BytesStart<'_>) -> Option<Field> {
    let field = if ends_with(path, &["PubmedArticle", "MedlineCitation", "PMID"]) {
        Field::Pmid
    } else if ends_with(path, &["MedlineCitation", "Article", "ArticleTitle"]) {
        Field::Title
    } else if ends_with(path, &["Article", "Journal", "Title"]) {
        Field::Journal
    } else if ends_with(path, &["Journal", "JournalIssue", "Volume"]) {
        Field::Volume
    } else if ends_with(path, &["Journal", "JournalIssue", "Issue"]) {
        Field::Issue
    } else if ends_with(path, &["JournalIssue", "PubDate", "Year"]) {
        Field::Year
    } else if ends_with(path, &["JournalIssue", "PubDate", "Month"]) {
        Field::Month
    } else if ends_with(path, &["JournalIssue", "PubDate", "Day"]) {
        Field::Day
    } else if ends_with(path, &["JournalIssue", "PubDate", "MedlineDate"]) {
        Field::MedlineDate
    } else if ends_with(path, &["Article", "Pagination", "MedlinePgn"]) {
        Field::Pages
    } else if ends_with(path, &["Article", "Abstract", "AbstractText"]) {
        Field::AbstractText(attr(e, b"Label"))
    } else if ends_with(path, &["AuthorList", "Author", "LastName"]) {
        Field::LastName
    } else if ends_with(path, &["AuthorList", "Author", "Initials"]) {
        Field::Initials
    } else if ends_with(path, &["AuthorList", "Author", "CollectiveName"]) {
        Field::CollectiveName
    } else if ends_with(path, &["PublicationTypeList", "PublicationType"]) {
        Field::PublicationType
    } else if ends_with(path, &["Article", "ELocationID"]) {
        if attr(e, b"EIdType").as_deref() != Some("doi") {
            return None;
        }
        Field::ELocationDoi
    } else if ends_with(path, &["PubmedArticle", "PubmedData", "ArticleIdList", "ArticleId"]) {
        Field::ArticleId(attr(e, b"IdType").unwrap_or_default())
    } else {
        return None;
    };
    Some(field)
}

#[derive(Default)]
struct Builder {
    doc: Document,
    author: Option<Author>,
}

impl Builder {
    fn apply(&mut self, field: Field, text: String) {
        let text = text.trim().to_string();
        let bib = &mut self.doc.bibliographic;
        match field {
            Field::Pmid => self.doc.pmid = text,
            Field::Title => self.doc.title = text,
            Field::Journal => bib.journal = Some(text),
            Field::Volume => bib.volume = Some(text),
            Field::Issue => bib.issue = Some(text),
            Field::Year => bib.pub_date.year = Some(text),
            Field::Month => bib.pub_date.month = Some(text),
            Field::Day => bib.pub_date.day = Some(text),
            Field::MedlineDate => bib.pub_date.medline_date = Some(text),
            Field::Pages => bib.pages = Some(text),
            Field::AbstractText(label) => self.doc.abstract_sections.push(AbstractSection {
                label,
                text,
            }),
            Field::LastName | Field::CollectiveName => {
                self.author.get_or_insert_with(Author::default).last_name = text
            }
            Field::Initials => self.author.get_or_insert_with(Author::default).initials = text,
            Field::PublicationType => self.doc.publication_types.push(text),
            Field::ELocationDoi => bib.elocation_doi = Some(text),
            Field::ArticleId(kind) => match kind.as_str() {
                "doi" => bib.doi = Some(text),
                "pmc" => self.doc.pmcid = Some(text),
                _ => {}
            },
        }
    }

    fn finish(mut self) -> Document {
        self.doc.url = Document::pubmed_url(&self.doc.pmid);
        self.doc
    }
}

/// Parse an efetch response into documents, in the order they appear.
pub fn parse_article_set(xml: &str) -> Result<Vec<Document>> {
    let mut reader = Reader::from_str(xml);

    let mut docs = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<Builder> = None;
    // (field, depth at which it started, accumulated text)
    let mut capture: Option<(Field, usize, String)> = None;

    loop {
        match reader.read_event().context("malformed PubMed XML")? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                path.push(name.clone());
                if name == "PubmedArticle" {
                    current = Some(Builder::default());
                } else if current.is_some() && capture.is_none() {
                    if let Some(field) = field_for(&path, &e) {
                        capture = Some((field, path.len(), String::new()));
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Event::CData(t) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(_) => {
                let depth = path.len();
                if capture.as_ref().is_some_and(|(_, d, _)| *d == depth) {
                    if let (Some((field, _, text)), Some(builder)) =
                        (capture.take(), current.as_mut())
                    {
                        builder.apply(field, text);
                    }
                }
                let closed = path.pop().unwrap_or_default();
                match closed.as_str() {
                    "Author" => {
                        if let Some(builder) = current.as_mut() {
                            if let Some(author) = builder.author.take() {
                                if !author.last_name.is_empty() {
                                    builder.doc.bibliographic.authors.push(author);
                                }
                            }
                        }
                    }
                    "PubmedArticle" => {
                        if let Some(builder) = current.take() {
                            docs.push(builder.finish());
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">36000001</PMID>
    <Article PubModel="Print">
      <Journal>
        <JournalIssue CitedMedium="Internet">
          <Volume>34</Volume>
          <Issue>1</Issue>
          <PubDate><Year>2023</Year><Month>Feb</Month><Day>01</Day></PubDate>
        </JournalIssue>
        <Title>Current opinion in lipidology</Title>
      </Journal>
      <ArticleTitle>Omega-3 fatty acids and <i>cognitive</i> function.</ArticleTitle>
      <Pagination><MedlinePgn>12-21</MedlinePgn></Pagination>
      <ELocationID EIdType="pii" ValidYN="Y">S0001</ELocationID>
      <ELocationID EIdType="doi" ValidYN="Y">10.1000/eloc</ELocationID>
      <Abstract>
        <AbstractText Label="PURPOSE OF REVIEW" NlmCategory="OBJECTIVE">Review &amp; update.</AbstractText>
        <AbstractText Label="RECENT FINDINGS">DHA helps.</AbstractText>
      </Abstract>
      <AuthorList CompleteYN="Y">
        <Author ValidYN="Y"><LastName>Welty</LastName><ForeName>Francine K</ForeName><Initials>FK</Initials></Author>
        <Author ValidYN="Y"><CollectiveName>Omega Study Group</CollectiveName></Author>
      </AuthorList>
      <PublicationTypeList>
        <PublicationType UI="D016428">Journal Article</PublicationType>
        <PublicationType UI="D016454">Review</PublicationType>
      </PublicationTypeList>
    </Article>
    <CommentsCorrectionsList>
      <CommentsCorrections RefType="Cites"><PMID Version="1">11111111</PMID></CommentsCorrections>
    </CommentsCorrectionsList>
  </MedlineCitation>
  <PubmedData>
    <ArticleIdList>
      <ArticleId IdType="pubmed">36000001</ArticleId>
      <ArticleId IdType="doi">10.1097/MOL.0000000000000862</ArticleId>
      <ArticleId IdType="pmc">PMC9999999</ArticleId>
    </ArticleIdList>
    <ReferenceList>
      <Reference><ArticleIdList><ArticleId IdType="pmc">PMC0000001</ArticleId></ArticleIdList></Reference>
    </ReferenceList>
  </PubmedData>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">36000002</PMID>
    <Article>
      <Journal><JournalIssue><PubDate><MedlineDate>2019 Jan-Feb</MedlineDate></PubDate></JournalIssue><Title>J</Title></Journal>
      <ArticleTitle>No abstract here</ArticleTitle>
    </Article>
  </MedlineCitation>
  <PubmedData><ArticleIdList><ArticleId IdType="pubmed">36000002</ArticleId></ArticleIdList></PubmedData>
</PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parses_full_record() {
        let docs = parse_article_set(SAMPLE).unwrap();
        assert_eq!(docs.len(), 2);

        let doc = &docs[0];
        assert_eq!(doc.pmid, "36000001");
        assert_eq!(doc.pmcid.as_deref(), Some("PMC9999999"));
        assert_eq!(doc.title, "Omega-3 fatty acids and cognitive function.");
        assert_eq!(doc.url, "https://pubmed.ncbi.nlm.nih.gov/36000001/");
        assert_eq!(doc.publication_types, vec!["Journal Article", "Review"]);

        let bib = &doc.bibliographic;
        assert_eq!(bib.journal.as_deref(), Some("Current opinion in lipidology"));
        assert_eq!(bib.volume.as_deref(), Some("34"));
        assert_eq!(bib.issue.as_deref(), Some("1"));
        assert_eq!(bib.pages.as_deref(), Some("12-21"));
        assert_eq!(bib.pub_date.month.as_deref(), Some("Feb"));
        assert_eq!(bib.doi.as_deref(), Some("10.1097/MOL.0000000000000862"));
        assert_eq!(bib.elocation_doi.as_deref(), Some("10.1000/eloc"));
        assert_eq!(bib.authors.len(), 2);
        assert_eq!(bib.authors[0].last_name, "Welty");
        assert_eq!(bib.authors[0].initials, "FK");
        assert_eq!(bib.authors[1].last_name, "Omega Study Group");

        assert_eq!(
            doc.reconstructed_abstract().unwrap(),
            "PURPOSE OF REVIEW:\nReview & update.\n\nRECENT FINDINGS:\nDHA helps."
        );
    }

    #[test]
    fn test_missing_parts_stay_empty() {
        let docs = parse_article_set(SAMPLE).unwrap();
        let doc = &docs[1];
        assert_eq!(doc.pmid, "36000002");
        assert!(doc.pmcid.is_none());
        assert!(doc.abstract_sections.is_empty());
        assert_eq!(
            doc.bibliographic.pub_date.medline_date.as_deref(),
            Some("2019 Jan-Feb")
        );
        assert!(doc.bibliographic.doi.is_none());
    }

    #[test]
    fn test_empty_set() {
        assert!(parse_article_set("<PubmedArticleSet></PubmedArticleSet>")
            .unwrap()
            .is_empty());
    }
}
