//! ChartAI - natural-language chart synthesis over registered databases
//!
//! Provides unified interfaces for:
//! - Database registration with schema introspection (via database adapters)
//! - Result coercion of driver values into JSON-friendly rows
//! - Chart type registry and chart persistence
//! - Three-step LLM synthesis of title, chart type and SQL
//! - Transactional service operations with nested unit-of-work support

pub mod charts;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;
pub mod persistence;
pub mod service;
pub mod synthesis;
pub mod validation;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, ConfigResult};
pub use error::{ChartAiError, ChartAiResult, ErrorKind, SynthesisStage};

pub use charts::{CategoricalMapping, Chart, ChartColumn, ChartKind, ChartRegistry};
#[cfg(feature = "postgres-backend")]
pub use database::PostgresAdapter;
pub use database::{
    AdapterFactory, Column, DatabaseAdapter, DatabaseError, DatabaseKind, DatabaseRecord,
    DatabaseResult, DefaultAdapterFactory, ForeignKey, QueryResult, QueryRow, SchemaSnapshot,
    Table,
};

#[cfg(feature = "openai")]
pub use llm::OpenAiLlmService;
pub use llm::{LlmError, LlmResult, LlmService};

// Re-export persistence types
pub use persistence::memory::{MemoryStore, MemoryUnitOfWork};
#[cfg(feature = "postgres-backend")]
pub use persistence::postgres::PgStorage;
pub use persistence::{
    ChartRepository, DatabaseRepository, PersistenceError, PersistenceResult, Transaction,
    TransactionScope, UnitOfWork,
};

// Re-export service types
pub use service::{CallContext, ChartService, DatabaseService};
pub use synthesis::{ChartDraft, SynthesisPipeline};
pub use validation::{FieldError, FormErrors, Validate};
