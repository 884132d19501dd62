//! Test doubles shared by the module tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::article::{AbstractSection, Document};
use crate::llm::{Completion, Generator, LlmError};
use crate::pubmed::Bibliography;

type Handler = Box<dyn Fn(&Completion) -> Option<Result<String, LlmError>> + Send + Sync>;

/// Generation capability that answers from a list of routes; the first route
/// returning `Some` wins.
#[derive(Default)]
pub struct ScriptedLlm {
    routes: Vec<Handler>,
    calls: Mutex<Vec<Completion>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        handler: impl Fn(&Completion) -> Option<Result<String, LlmError>> + Send + Sync + 'static,
    ) -> Self {
        self.routes.push(Box::new(handler));
        self
    }

    /// Reply to requests carrying exactly this system prompt.
    pub fn on_system(
        self,
        system: &'static str,
        reply: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.on(move |req| (req.system == system).then(|| reply(&req.user)).flatten().map(Ok))
    }

    /// Reply to any request based on its user content.
    pub fn on_user(self, reply: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.on(move |req| reply(&req.user).map(Ok))
    }

    pub fn calls_with(&self, system: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.system == system)
            .count()
    }

    pub fn last_user_for(&self, system: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.system == system)
            .map(|c| c.user.clone())
    }
}

#[async_trait]
impl Generator for ScriptedLlm {
    async fn complete(&self, request: &Completion) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(request.clone());
        self.routes
            .iter()
            .find_map(|route| route(request))
            .unwrap_or_else(|| Err(LlmError::Malformed("no scripted reply".into())))
    }
}

/// Bibliography serving fixed result lists per query.
#[derive(Default)]
pub struct StaticBibliography {
    pub results: HashMap<String, Vec<Document>>,
}

impl StaticBibliography {
    pub fn with(mut self, query: &str, docs: Vec<Document>) -> Self {
        self.results.insert(query.to_string(), docs);
        self
    }
}

#[async_trait]
impl Bibliography for StaticBibliography {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Document>> {
        let mut docs = self.results.get(query).cloned().unwrap_or_default();
        docs.truncate(max_results);
        Ok(docs)
    }
}

/// A retrieved document with a one-segment abstract.
pub fn doc(pmid: &str) -> Document {
    Document {
        pmid: pmid.to_string(),
        title: format!("Study {}", pmid),
        url: Document::pubmed_url(pmid),
        abstract_sections: vec![AbstractSection {
            label: None,
            text: format!("Abstract of {}", pmid),
        }],
        ..Document::default()
    }
}
