//! LLM collaborator
//!
//! The synthesis pipeline only needs single-turn completions: one prompt in,
//! one free-text reply out. Parsing the reply is the caller's job.

use async_trait::async_trait;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiLlmService};

/// Error type for LLM calls
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for LLM calls
pub type LlmResult<T> = Result<T, LlmError>;

/// Single-turn completion service
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Send `prompt` as one user message and return the reply text.
    async fn single_prompt(&self, prompt: &str) -> LlmResult<String>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
