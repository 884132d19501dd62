use anyhow::Result;
use tracing::info;

use crate::llm::{complete_with_retry, Completion, Generator, RetryPolicy};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Recipe,
    Animal,
}

impl Validity {
    /// Read the classifier's answer. Anything that is not an explicit
    /// rejection counts as valid.
    pub fn parse(response: &str) -> Self {
        let lower = response.trim().to_lowercase();
        if !lower.starts_with("false") {
            return Validity::Valid;
        }
        if lower.contains("animal") {
            Validity::Animal
        } else if lower.contains("recipe") || lower.contains("meal plan") {
            Validity::Recipe
        } else {
            Validity::Valid
        }
    }

    /// Fixed redirect shown instead of running the pipeline.
    pub fn redirect(self) -> Option<&'static str> {
        match self {
            Validity::Valid => None,
            Validity::Recipe => Some(prompts::RECIPE_REDIRECT),
            Validity::Animal => Some(prompts::ANIMAL_REDIRECT),
        }
    }
}

pub async fn check_question(
    llm: &dyn Generator,
    retry: &RetryPolicy,
    question: &str,
) -> Result<Validity> {
    let request = Completion::new(prompts::QUESTION_VALIDITY, question).temperature(0.2);
    let response = complete_with_retry(llm, retry, &request).await?;
    let validity = Validity::parse(&response);
    info!(?validity, "question validity checked");
    Ok(validity)
}
