//! Question → answer coordinator.

pub mod session;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::ReliabilityCache;
use crate::fulltext::FullTextChain;
use crate::llm::{Generator, RetryPolicy};
use crate::processor::DocumentProcessor;
use crate::pubmed::Bibliography;
use crate::relevance;
use crate::retrieval;
use crate::state::PipelineConfig;
use crate::store::types::{AnswerRecord, ReliabilityRecord};
use crate::store::AnswerArchive;
use crate::synthesis::{self, CitationMap};
use crate::validity;

use session::{ProgressSink, ProgressStream, SessionRegistry};

/// Wall-clock seconds spent in each stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    pub query_generation: f64,
    pub retrieval: f64,
    pub relevance: f64,
    pub processing: f64,
    pub synthesis: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalOutput {
    pub question: String,
    /// Generated answer including the disclaimer, or the redirect text.
    pub answer: String,
    pub main_answer: String,
    pub references: Vec<String>,
    pub citations: CitationMap,
    pub evidence: Vec<ReliabilityRecord>,
    pub queries: Vec<String>,
    pub runtime: RuntimeMetrics,
    /// Set when the question was turned away before any research ran.
    pub redirect: Option<String>,
}

impl FinalOutput {
    fn redirected(question: &str, message: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: message.to_string(),
            main_answer: message.to_string(),
            redirect: Some(message.to_string()),
            ..Self::default()
        }
    }
}

fn elapsed(since: Instant) -> f64 {
    since.elapsed().as_secs_f64()
}

pub struct Pipeline {
    llm: Arc<dyn Generator>,
    retry: RetryPolicy,
    bibliography: Arc<dyn Bibliography>,
    cache: Arc<ReliabilityCache>,
    archive: Arc<AnswerArchive>,
    fulltext: Arc<FullTextChain>,
    sessions: Arc<SessionRegistry>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn Generator>,
        retry: RetryPolicy,
        bibliography: Arc<dyn Bibliography>,
        cache: Arc<ReliabilityCache>,
        archive: Arc<AnswerArchive>,
        fulltext: Arc<FullTextChain>,
    ) -> Self {
        Self {
            llm,
            retry,
            bibliography,
            cache,
            archive,
            fulltext,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn llm(&self) -> &dyn Generator {
        self.llm.as_ref()
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Start a run in the background and return its progress stream. The
    /// stream ends with `Final` or `Failed`.
    pub fn start(self: &Arc<Self>, question: String, config: PipelineConfig) -> ProgressStream {
        let (sink, stream) = self.sessions.open(&question);
        let pipeline = self.clone();
        tokio::spawn(async move {
            match pipeline.run(&question, &config, &sink).await {
                Ok(output) => sink.finish(output),
                Err(e) => {
                    error!(session_id = %sink.session_id(), "pipeline failed: {:#}", e);
                    sink.fail(format!("{:#}", e));
                }
            }
        });
        stream
    }

    /// Run every stage for one question. Failures below the document level
    /// degrade the answer instead of aborting the run.
    pub async fn run(
        &self,
        question: &str,
        config: &PipelineConfig,
        sink: &ProgressSink,
    ) -> Result<FinalOutput> {
        let llm = self.llm.as_ref();
        let retry = &self.retry;
        let started = Instant::now();
        let mut runtime = RuntimeMetrics::default();

        sink.update("Checking the question");
        let validity = validity::check_question(llm, retry, question).await?;
        if let Some(message) = validity.redirect() {
            info!(session_id = %sink.session_id(), ?validity, "question redirected");
            return Ok(FinalOutput::redirected(question, message));
        }

        sink.update("Generating search queries");
        let stage = Instant::now();
        let query_set = retrieval::generate_queries(llm, retry, question).await?;
        debug!(
            session_id = %sink.session_id(),
            general = %query_set.general,
            contention = %query_set.contention,
            "query generation output"
        );
        runtime.query_generation = elapsed(stage);

        sink.update(format!("Searching PubMed with {} queries", query_set.queries.len()));
        let stage = Instant::now();
        let articles = retrieval::collect_articles(
            self.bibliography.as_ref(),
            &query_set.queries,
            config.results_per_query,
        )
        .await;
        runtime.retrieval = elapsed(stage);

        sink.update(format!("Screening {} articles for relevance", articles.len()));
        let stage = Instant::now();
        let partition = relevance::filter_relevant(
            llm,
            retry,
            question,
            articles,
            config.relevance_concurrency,
            config.relevance_timeout,
        )
        .await;
        runtime.relevance = elapsed(stage);

        let split = self.cache.article_matching(partition.relevant).await?;
        sink.update(format!(
            "{} relevant articles: {} already analyzed, {} to analyze",
            split.matched.len() + split.to_process.len(),
            split.matched.len(),
            split.to_process.len()
        ));

        let stage = Instant::now();
        let processor = DocumentProcessor::new(
            self.llm.clone(),
            self.retry.clone(),
            self.fulltext.clone(),
            config.reprocess_delay,
        );
        let processed = processor
            .process_all(split.to_process, config.processing_concurrency, config.processing_timeout)
            .await;
        if let Err(e) = self.cache.write_articles(&processed).await {
            warn!("failed to write reliability records: {:#}", e);
        }
        runtime.processing = elapsed(stage);

        let mut evidence = split.matched;
        evidence.extend(processed);

        sink.update(format!("Writing the answer from {} articles", evidence.len()));
        let stage = Instant::now();
        let synthesis = synthesis::synthesize(
            llm,
            retry,
            question,
            &evidence,
            config.min_synthesis_docs,
            config.max_synthesis_docs,
        )
        .await?;
        runtime.synthesis = elapsed(stage);
        runtime.total = elapsed(started);

        let output = FinalOutput {
            question: question.to_string(),
            answer: synthesis.answer,
            main_answer: synthesis.main_answer,
            references: synthesis.references,
            citations: synthesis.citations,
            evidence: evidence.iter().map(|d| d.to_record()).collect(),
            queries: query_set.queries,
            runtime,
            redirect: None,
        };
        info!(
            session_id = %sink.session_id(),
            evidence = output.evidence.len(),
            citations = output.citations.len(),
            total_secs = output.runtime.total,
            "pipeline complete"
        );

        let record = AnswerRecord {
            question: question.to_string(),
            session_id: sink.session_id().to_string(),
            created_at: chrono::Utc::now().timestamp(),
            output: output.clone(),
        };
        if let Err(e) = self.archive.put(&record).await {
            warn!("failed to store final answer: {:#}", e);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Document;
    use crate::prompts;
    use crate::store::memory::MemoryStore;
    use crate::store::{RecordStore, Table};
    use crate::testing::{doc, ScriptedLlm, StaticBibliography};
    use session::ProgressEvent;

    struct Fixture {
        pipeline: Arc<Pipeline>,
        store: Arc<MemoryStore>,
        llm: Arc<ScriptedLlm>,
    }

    fn fixture(llm: ScriptedLlm, bibliography: StaticBibliography) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let llm = Arc::new(llm);
        let pipeline = Pipeline::new(
            llm.clone(),
            RetryPolicy::none(),
            Arc::new(bibliography),
            Arc::new(ReliabilityCache::new(store.clone())),
            Arc::new(AnswerArchive::new(store.clone())),
            Arc::new(FullTextChain::new(vec![])),
        );
        Fixture {
            pipeline: Arc::new(pipeline),
            store,
            llm,
        }
    }

    fn research_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .on_system(prompts::QUESTION_VALIDITY, |q| {
                Some(if q.contains("lasagna") { "False - Recipe" } else { "True" }.into())
            })
            .on_system(prompts::GENERAL_QUERY, |_| Some("coffee AND health".into()))
            .on_system(prompts::POINTS_OF_CONTENTION, |_| {
                Some("* Point of Contention 1: Heart\nSummary: x\nQuery: coffee AND heart".into())
            })
            .on_system(prompts::RELEVANCE, |user| {
                Some(if user.contains("Abstract of 4") { "No" } else { "Yes" }.into())
            })
            .on_system(prompts::SUMMARY_REVIEW, |user| Some(format!("summary of {}", user)))
            .on(|req| {
                req.system.starts_with("You evaluate research evidence").then(|| {
                    Ok("* Coffee is fine [1].\n\nReferences:\n[1] Study 1. PMID: 1\n".to_string())
                })
            })
    }

    fn bibliography() -> StaticBibliography {
        StaticBibliography::default()
            .with("coffee AND heart", vec![doc("1"), doc("2"), doc("3")])
            .with("coffee AND health", vec![doc("3"), doc("4")])
    }

    #[tokio::test]
    async fn test_full_run_uses_cache_and_persists() {
        let f = fixture(research_llm(), bibliography());
        let cached = Document {
            summary: "cached summary".into(),
            citation: "cached citation".into(),
            ..doc("2")
        };
        ReliabilityCache::new(f.store.clone())
            .write_articles(&[cached])
            .await
            .unwrap();

        let mut stream = f.pipeline.start("Is coffee healthy?".into(), PipelineConfig::default());
        let mut updates = 0;
        let output = loop {
            match stream.next().await {
                Some(ProgressEvent::Update(_)) => updates += 1,
                Some(ProgressEvent::Final(out)) => break *out,
                other => panic!("unexpected event {:?}", other),
            }
        };
        assert!(updates >= 5);

        let mut evidence: Vec<_> = output.evidence.iter().map(|r| r.pmid.as_str()).collect();
        evidence.sort();
        assert_eq!(evidence, vec!["1", "2", "3"]);
        assert_eq!(output.queries, vec!["coffee AND heart", "coffee AND health"]);
        assert_eq!(output.citations["[1] Study 1. PMID: 1"].pmid, "1");
        assert!(output.answer.ends_with(prompts::DISCLAIMER));
        assert!(output.runtime.total >= output.runtime.synthesis);

        // Only the two uncached relevant documents were summarized.
        assert_eq!(f.llm.calls_with(prompts::SUMMARY_REVIEW), 2);
        assert_eq!(f.store.len(Table::Articles).await, 3);
        let archived = AnswerArchive::new(f.store.clone())
            .get("Is coffee healthy?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(archived.output.references.len(), 1);
        assert!(f.pipeline.sessions().active().is_empty());
    }

    #[tokio::test]
    async fn test_recipe_question_is_redirected_without_research() {
        let f = fixture(research_llm(), bibliography());
        let (sink, _stream) = f.pipeline.sessions().open("lasagna");
        let output = f
            .pipeline
            .run("How do I make a low-carb lasagna?", &PipelineConfig::default(), &sink)
            .await
            .unwrap();

        assert_eq!(output.redirect.as_deref(), Some(prompts::RECIPE_REDIRECT));
        assert_eq!(f.llm.calls_with(prompts::GENERAL_QUERY), 0);
        assert!(f.store.scan(Table::Answers).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_reported_on_stream() {
        let f = fixture(ScriptedLlm::new(), bibliography());
        let mut stream = f.pipeline.start("q".into(), PipelineConfig::default());
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(ProgressEvent::Failed(_))));
    }
}
