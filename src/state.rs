use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::cache::ReliabilityCache;
use crate::pipeline::Pipeline;
use crate::store::AnswerArchive;

/// Pipeline tuning parameters (admins can modify at runtime).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub relevance_concurrency: usize,
    pub processing_concurrency: usize,
    pub results_per_query: usize,
    pub reprocess_delay: Duration,
    pub relevance_timeout: Option<Duration>,
    pub processing_timeout: Option<Duration>,
    pub min_synthesis_docs: usize,
    pub max_synthesis_docs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            relevance_concurrency: 8,
            processing_concurrency: 8,
            results_per_query: 10,
            reprocess_delay: Duration::from_secs(10),
            relevance_timeout: Some(Duration::from_secs(120)),
            processing_timeout: Some(Duration::from_secs(900)),
            min_synthesis_docs: 8,
            max_synthesis_docs: 20,
        }
    }
}

impl PipelineConfig {
    /// Set a parameter by name. Durations are in seconds; 0 disables a
    /// timeout.
    pub fn set(&mut self, param: &str, value: u64) -> Result<(), String> {
        let timeout = |v: u64| (v > 0).then(|| Duration::from_secs(v));
        let at_least_one = |v: u64| -> Result<usize, String> {
            if v == 0 {
                Err(format!("`{}` must be at least 1", param))
            } else {
                Ok(v as usize)
            }
        };
        match param {
            "relevance_concurrency" => self.relevance_concurrency = at_least_one(value)?,
            "processing_concurrency" => self.processing_concurrency = at_least_one(value)?,
            "results_per_query" => self.results_per_query = at_least_one(value)?,
            "reprocess_delay" => self.reprocess_delay = Duration::from_secs(value),
            "relevance_timeout" => self.relevance_timeout = timeout(value),
            "processing_timeout" => self.processing_timeout = timeout(value),
            "min_synthesis_docs" => self.min_synthesis_docs = at_least_one(value)?,
            "max_synthesis_docs" => self.max_synthesis_docs = at_least_one(value)?,
            _ => {
                return Err(format!(
                    "Unknown param `{}`. Valid: {}",
                    param,
                    Self::PARAMS.map(|p| format!("`{}`", p)).join(", ")
                ))
            }
        }
        if self.min_synthesis_docs > self.max_synthesis_docs {
            self.max_synthesis_docs = self.min_synthesis_docs;
        }
        Ok(())
    }

    pub const PARAMS: [&'static str; 8] = [
        "relevance_concurrency",
        "processing_concurrency",
        "results_per_query",
        "reprocess_delay",
        "relevance_timeout",
        "processing_timeout",
        "min_synthesis_docs",
        "max_synthesis_docs",
    ];
}

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub cache: Arc<ReliabilityCache>,
    pub archive: Arc<AnswerArchive>,
    pub admin_ids: HashSet<u64>,
    pub config: Arc<RwLock<PipelineConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_params() {
        let mut config = PipelineConfig::default();
        config.set("processing_concurrency", 4).unwrap();
        config.set("processing_timeout", 0).unwrap();
        config.set("reprocess_delay", 2).unwrap();
        assert_eq!(config.processing_concurrency, 4);
        assert_eq!(config.processing_timeout, None);
        assert_eq!(config.reprocess_delay, Duration::from_secs(2));

        assert!(config.set("relevance_concurrency", 0).is_err());
        assert!(config.set("nonsense", 1).unwrap_err().contains("Unknown param"));

        config.set("min_synthesis_docs", 25).unwrap();
        assert_eq!(config.max_synthesis_docs, 25);
    }
}
