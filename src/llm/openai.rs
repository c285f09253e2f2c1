//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmError, LlmResult, LlmService};
use crate::config::LlmSection;

/// Configuration for an OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for failed requests
    pub max_retries: u32,
    /// Optional API key (local providers usually don't need one)
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        LlmSection::default().into()
    }
}

impl From<LlmSection> for OpenAiConfig {
    fn from(section: LlmSection) -> Self {
        Self {
            base_url: section.base_url,
            model: section.model,
            timeout_secs: section.timeout_secs,
            max_retries: section.max_retries,
            api_key: section.api_key,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// LLM service backed by `/chat/completions`
pub struct OpenAiLlmService {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiLlmService {
    pub fn new(config: OpenAiConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Send a request with retry logic
    async fn send_request(&self, prompt: &str) -> LlmResult<String> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            match self.try_request(prompt).await {
                Ok(response) => return Ok(response),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            "LLM request failed (attempt {}/{}), retrying: {}",
                            attempt + 1,
                            self.config.max_retries + 1,
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Request("All retry attempts failed".into())))
    }

    async fn try_request(&self, prompt: &str) -> LlmResult<String> {
        let request = ChatCompletionsRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request_builder = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            request_builder =
                request_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request_builder.send().await.map_err(|e| {
            LlmError::Request(format!(
                "Failed to send request to {}: {}",
                self.config.base_url, e
            ))
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let chat_response: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        extract_content(chat_response)
    }
}

/// Upper bound on the wait between two attempts
const MAX_BACKOFF_SECS: u64 = 30;

/// Exponential backoff before retry `attempt` (1-based): 1s, 2s, 4s, capped.
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

/// Transport failures, rate limiting and server errors are worth another attempt.
fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Request(_) => true,
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn extract_content(response: ChatCompletionsResponse) -> LlmResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(LlmError::EmptyResponse)
}

#[async_trait]
impl LlmService for OpenAiLlmService {
    async fn single_prompt(&self, prompt: &str) -> LlmResult<String> {
        let started = std::time::Instant::now();
        let answer = self.send_request(prompt).await?;
        tracing::debug!(
            "LLM {} answered in {} ms",
            self.config.model,
            started.elapsed().as_millis()
        );
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
