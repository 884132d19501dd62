use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::article::Document;
use crate::llm::{complete_with_retry, Completion, Generator, RetryPolicy};
use crate::prompts;
use crate::taskgroup::TaskGroup;

/// Relevant unless the first word of the answer is "no" or "n", ignoring
/// case and surrounding punctuation. `None` for an empty answer.
pub fn is_relevant(response: &str) -> Option<bool> {
    let first = response.split_whitespace().next()?;
    let word = first
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    Some(!matches!(word.as_str(), "no" | "n"))
}

#[derive(Debug, Default)]
pub struct Partition {
    pub relevant: Vec<Document>,
    pub irrelevant: Vec<Document>,
}

async fn classify(
    llm: &dyn Generator,
    retry: &RetryPolicy,
    question: &str,
    doc: &Document,
) -> Result<bool> {
    let abstract_text = doc
        .reconstructed_abstract()
        .ok_or_else(|| anyhow!("no abstract"))?;
    let request = Completion::new(
        prompts::RELEVANCE,
        format!("Question: {}\nAbstract: {}", question, abstract_text),
    )
    .temperature(0.8)
    .light();
    let response = complete_with_retry(llm, retry, &request).await?;
    is_relevant(&response).ok_or_else(|| anyhow!("empty classification response"))
}

/// Classify every document against the question. Documents whose
/// classification fails land in neither partition.
pub async fn filter_relevant(
    llm: &dyn Generator,
    retry: &RetryPolicy,
    question: &str,
    docs: Vec<Document>,
    concurrency: usize,
    timeout: Option<Duration>,
) -> Partition {
    let total = docs.len();
    let outcome = TaskGroup::new("relevance", concurrency)
        .with_timeout(timeout)
        .run(
            docs,
            |d| d.pmid.clone(),
            |mut doc| async move {
                let relevant = classify(llm, retry, question, &doc).await?;
                doc.is_relevant = Some(relevant);
                Ok(doc)
            },
        )
        .await;

    let dropped = outcome.failures.len();
    let mut partition = Partition::default();
    for doc in outcome.into_values() {
        if doc.is_relevant == Some(true) {
            partition.relevant.push(doc);
        } else {
            partition.irrelevant.push(doc);
        }
    }
    info!(
        total,
        relevant = partition.relevant.len(),
        irrelevant = partition.irrelevant.len(),
        dropped,
        "relevance classification complete"
    );
    partition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{doc, ScriptedLlm};

    #[test]
    fn test_decision_rule() {
        assert_eq!(is_relevant("No, this study is in mice."), Some(false));
        assert_eq!(is_relevant("Yes, contains dosage info."), Some(true));
        assert_eq!(is_relevant("n"), Some(false));
        assert_eq!(is_relevant("  NO."), Some(false));
        assert_eq!(is_relevant("Not sure"), Some(true));
        assert_eq!(is_relevant("   "), None);
    }

    #[tokio::test]
    async fn test_partitions_and_drops_failures() {
        let llm = ScriptedLlm::new().on_system(prompts::RELEVANCE, |user| {
            if user.contains("Abstract of 2") {
                Some("No, this study is in mice.".into())
            } else if user.contains("Abstract of 3") {
                None
            } else {
                Some("Yes, contains dosage info.".into())
            }
        });

        let docs = vec![doc("1"), doc("2"), doc("3"), doc("4")];
        let partition = filter_relevant(&llm, &RetryPolicy::none(), "q", docs, 8, None).await;

        let mut relevant: Vec<_> = partition.relevant.iter().map(|d| d.pmid.as_str()).collect();
        relevant.sort();
        assert_eq!(relevant, vec!["1", "4"]);
        assert_eq!(partition.irrelevant.len(), 1);
        assert_eq!(partition.irrelevant[0].pmid, "2");
    }

    #[tokio::test]
    async fn test_document_without_abstract_is_dropped() {
        let llm = ScriptedLlm::new().on_system(prompts::RELEVANCE, |_| Some("yes".into()));
        let mut bare = doc("9");
        bare.abstract_sections.clear();

        let partition = filter_relevant(&llm, &RetryPolicy::none(), "q", vec![bare], 8, None).await;
        assert!(partition.relevant.is_empty());
        assert!(partition.irrelevant.is_empty());
        assert_eq!(llm.calls_with(prompts::RELEVANCE), 0);
    }
}
