use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Which configured model serves a call. Cheap yes/no classifications run on
/// the light model, everything that writes prose runs on the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Primary,
    Light,
}

/// One (instructions, content) request to the generation capability.
#[derive(Debug, Clone)]
pub struct Completion {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub tier: ModelTier,
}

impl Completion {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            tier: ModelTier::Primary,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn light(mut self) -> Self {
        self.tier = ModelTier::Light;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed LLM response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Transport failures, rate limits and server errors are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Malformed(_) => false,
        }
    }
}

/// The classify/generate capability every pipeline stage talks to.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, request: &Completion) -> Result<String, LlmError>;
}

/// Exponential backoff applied at each generation call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run a completion, retrying transient failures according to `policy`.
pub async fn complete_with_retry(
    llm: &dyn Generator,
    policy: &RetryPolicy,
    request: &Completion,
) -> Result<String, LlmError> {
    let mut attempt = 1;
    loop {
        match llm.complete(request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let wait = policy.backoff(attempt);
                warn!(attempt, wait_ms = wait.as_millis() as u64, error = %e, "LLM call failed, backing off");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    sub_model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = dotenv::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4-turbo".to_string());
        let sub_model = dotenv::var("LLM_SUB_MODEL").unwrap_or_else(|_| model.clone());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        // Summaries of long papers can take a while to generate.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            sub_model,
            api_key,
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Non-streaming chat completion.
    pub async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "top_p": 1,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Malformed(e.to_string()))?;

        // Extract content from choices[0].message.content (handle null)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))?
            .to_string();

        debug!(model, response_len = content.len(), "LLM completion received");
        Ok(content)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn complete(&self, request: &Completion) -> Result<String, LlmError> {
        let model = match request.tier {
            ModelTier::Primary => self.model.as_str(),
            ModelTier::Light => self.sub_model.as_str(),
        };
        let messages = [
            Message {
                role: "system".to_string(),
                content: request.system.clone(),
            },
            Message {
                role: "user".to_string(),
                content: request.user.clone(),
            },
        ];
        self.chat(&messages, model, request.temperature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
        status: u16,
    }

    #[async_trait]
    impl Generator for Flaky {
        async fn complete(&self, _request: &Completion) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(LlmError::Status {
                    status: self.status,
                    body: "busy".into(),
                })
            } else {
                Ok("ok".into())
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let llm = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 2,
            status: 503,
        };
        let out = complete_with_retry(&llm, &fast_policy(), &Completion::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let llm = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
            status: 429,
        };
        let err = complete_with_retry(&llm, &fast_policy(), &Completion::new("s", "u"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let llm = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
            status: 400,
        };
        assert!(
            complete_with_retry(&llm, &fast_policy(), &Completion::new("s", "u"))
                .await
                .is_err()
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(4), Duration::from_secs(1));
    }
}
