//! CLI-specific error types

use chartai::{ChartAiError, ConfigError, LlmError, PersistenceError};
use thiserror::Error;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] PersistenceError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Service(#[from] ChartAiError),

    #[error("IO error: {0}")]
    IoError(String),
}
