use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::article::Document;
use crate::citation;
use crate::fulltext::FullTextChain;
use crate::llm::{complete_with_retry, Completion, Generator, RetryPolicy};
use crate::prompts;
use crate::taskgroup::TaskGroup;

/// Bodies longer than this are clipped before summarization.
pub const MAX_BODY_CHARS: usize = 1_048_576;
/// Length a clipped body is cut to, leaving room for the prompt.
pub const CLIPPED_BODY_CHARS: usize = 1_044_000;

/// Publication types summarized with the primary-study template. Anything
/// else is treated as a review.
pub const PRIMARY_STUDY_TYPES: [&str; 25] = [
    "Adaptive Clinical Trial",
    "Case Reports",
    "Clinical Study",
    "Clinical Trial",
    "Clinical Trial Protocol",
    "Clinical Trial, Phase I",
    "Clinical Trial, Phase II",
    "Clinical Trial, Phase III",
    "Clinical Trial, Phase IV",
    "Clinical Trial, Veterinary",
    "Comparative Study",
    "Controlled Clinical Trial",
    "Equivalence Trial",
    "Evaluation Study",
    "Multicenter Study",
    "Observational Study",
    "Observational Study, Veterinary",
    "Pragmatic Clinical Trial",
    "Preprint",
    "Published Erratum",
    "Randomized Controlled Trial",
    "Randomized Controlled Trial, Veterinary",
    "Technical Report",
    "Twin Study",
    "Validation Study",
];

/// Cut a body to [`CLIPPED_BODY_CHARS`] characters once it exceeds
/// [`MAX_BODY_CHARS`].
pub fn clip_body(body: String) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body;
    }
    body.chars().take(CLIPPED_BODY_CHARS).collect()
}

pub fn summary_template(publication_types: &[String]) -> &'static str {
    let primary = publication_types
        .iter()
        .any(|t| PRIMARY_STUDY_TYPES.contains(&t.as_str()));
    if primary {
        prompts::SUMMARY_STUDY
    } else {
        prompts::SUMMARY_REVIEW
    }
}

/// Turns a relevant document into a summarized one: citation, full text,
/// clip, summary.
pub struct DocumentProcessor {
    llm: Arc<dyn Generator>,
    retry: RetryPolicy,
    chain: Arc<FullTextChain>,
    reprocess_delay: Duration,
}

impl DocumentProcessor {
    pub fn new(
        llm: Arc<dyn Generator>,
        retry: RetryPolicy,
        chain: Arc<FullTextChain>,
        reprocess_delay: Duration,
    ) -> Self {
        Self {
            llm,
            retry,
            chain,
            reprocess_delay,
        }
    }

    /// One pass over a document. `Ok(None)` when it has no abstract.
    pub async fn process(&self, doc: &Document) -> Result<Option<Document>> {
        let Some(abstract_text) = doc.reconstructed_abstract() else {
            info!(pmid = %doc.pmid, "no abstract provided, dropping document");
            return Ok(None);
        };

        let mut doc = doc.clone();
        doc.citation = citation::for_document(&doc);

        let resolved = self.chain.resolve(&doc, &abstract_text).await;
        doc.full_text_obtained = resolved.full_text_obtained;
        doc.body = clip_body(resolved.body);

        let template = summary_template(&doc.publication_types);
        let request = Completion::new(template, format!("Paper: {}", doc.body)).temperature(0.6);
        doc.summary = complete_with_retry(self.llm.as_ref(), &self.retry, &request).await?;
        doc.is_relevant = Some(true);

        info!(
            pmid = %doc.pmid,
            source = resolved.source,
            body_chars = doc.body.len(),
            review = template == prompts::SUMMARY_REVIEW,
            "document processed"
        );
        Ok(Some(doc))
    }

    /// [`process`](Self::process), run a second time after the reprocess
    /// delay if the first pass fails.
    pub async fn process_with_retry(&self, doc: &Document) -> Result<Option<Document>> {
        match self.process(doc).await {
            Ok(done) => Ok(done),
            Err(e) => {
                warn!(
                    pmid = %doc.pmid,
                    delay_secs = self.reprocess_delay.as_secs_f32(),
                    "processing failed, retrying once: {:#}",
                    e
                );
                tokio::time::sleep(self.reprocess_delay).await;
                self.process(doc).await
            }
        }
    }

    /// Process documents concurrently. Documents without an abstract and
    /// documents that failed twice are left out.
    pub async fn process_all(
        &self,
        docs: Vec<Document>,
        concurrency: usize,
        timeout: Option<Duration>,
    ) -> Vec<Document> {
        let total = docs.len();
        let outcome = TaskGroup::new("processing", concurrency)
            .with_timeout(timeout)
            .run(
                docs,
                |d| d.pmid.clone(),
                |doc| async move { self.process_with_retry(&doc).await },
            )
            .await;
        let processed: Vec<Document> = outcome.into_values().into_iter().flatten().collect();
        info!(total, processed = processed.len(), "document processing complete");
        processed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::fulltext::{Attempt, FetchError, FullTextProvider};
    use crate::llm::LlmError;
    use crate::testing::{doc, ScriptedLlm};

    struct Huge;

    #[async_trait]
    impl FullTextProvider for Huge {
        fn name(&self) -> &'static str {
            "huge"
        }

        async fn attempt(&self, _doc: &Document) -> Result<Attempt, FetchError> {
            Ok(Attempt::FullText("é".repeat(MAX_BODY_CHARS + 10)))
        }
    }

    fn processor(llm: Arc<dyn Generator>, chain: FullTextChain) -> DocumentProcessor {
        DocumentProcessor::new(llm, RetryPolicy::none(), Arc::new(chain), Duration::from_millis(5))
    }

    fn summarizer() -> ScriptedLlm {
        ScriptedLlm::new()
            .on_system(prompts::SUMMARY_STUDY, |_| Some("study summary".into()))
            .on_system(prompts::SUMMARY_REVIEW, |_| Some("review summary".into()))
    }

    #[test]
    fn test_clip_body() {
        let short = "a".repeat(MAX_BODY_CHARS);
        assert_eq!(clip_body(short.clone()), short);

        let long = "ü".repeat(MAX_BODY_CHARS + 1);
        assert_eq!(clip_body(long).chars().count(), CLIPPED_BODY_CHARS);
    }

    #[test]
    fn test_template_choice() {
        let types = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            summary_template(&types(&["Journal Article", "Randomized Controlled Trial"])),
            prompts::SUMMARY_STUDY
        );
        assert_eq!(
            summary_template(&types(&["Journal Article", "Review"])),
            prompts::SUMMARY_REVIEW
        );
        assert_eq!(summary_template(&[]), prompts::SUMMARY_REVIEW);
    }

    #[tokio::test]
    async fn test_abstract_fallback_and_citation() {
        let llm = Arc::new(summarizer());
        let p = processor(llm.clone(), FullTextChain::new(vec![]));

        let mut input = doc("11");
        input.publication_types = vec!["Clinical Trial".into()];
        let out = p.process(&input).await.unwrap().unwrap();

        assert_eq!(out.summary, "study summary");
        assert_eq!(out.body, "Abstract of 11");
        assert!(!out.full_text_obtained);
        assert!(out.citation.contains("Study 11"));
        assert_eq!(
            llm.last_user_for(prompts::SUMMARY_STUDY).as_deref(),
            Some("Paper: Abstract of 11")
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_clipped_before_summary() {
        let llm = Arc::new(summarizer());
        let p = processor(llm.clone(), FullTextChain::new(vec![Box::new(Huge)]));

        let out = p.process(&doc("12")).await.unwrap().unwrap();
        assert!(out.full_text_obtained);
        let sent = llm.last_user_for(prompts::SUMMARY_REVIEW).unwrap();
        assert_eq!(sent.chars().count(), "Paper: ".len() + CLIPPED_BODY_CHARS);
    }

    #[tokio::test]
    async fn test_missing_abstract_is_dropped_without_calls() {
        let llm = Arc::new(summarizer());
        let p = processor(llm.clone(), FullTextChain::new(vec![]));
        let mut bare = doc("13");
        bare.abstract_sections.clear();

        assert!(p.process_with_retry(&bare).await.unwrap().is_none());
        assert_eq!(llm.calls_with(prompts::SUMMARY_REVIEW), 0);
    }

    #[tokio::test]
    async fn test_retried_once_then_fails() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let flaky = ScriptedLlm::new().on(move |_| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            Some(if n == 0 {
                Err(LlmError::Malformed("first pass".into()))
            } else {
                Ok("second pass".into())
            })
        });
        let p = processor(Arc::new(flaky), FullTextChain::new(vec![]));
        let out = p.process_with_retry(&doc("14")).await.unwrap().unwrap();
        assert_eq!(out.summary, "second pass");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let broken = processor(Arc::new(ScriptedLlm::new()), FullTextChain::new(vec![]));
        assert!(broken.process_with_retry(&doc("15")).await.is_err());
    }

    #[tokio::test]
    async fn test_process_all_drops_failures() {
        let llm = ScriptedLlm::new().on_system(prompts::SUMMARY_REVIEW, |user| {
            (!user.contains("Abstract of 2")).then(|| "ok".to_string())
        });
        let p = processor(Arc::new(llm), FullTextChain::new(vec![]));
        let mut out = p.process_all(vec![doc("1"), doc("2"), doc("3")], 8, None).await;
        out.sort_by(|a, b| a.pmid.cmp(&b.pmid));
        let ids: Vec<_> = out.iter().map(|d| d.pmid.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
