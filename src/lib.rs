//! kothaset - Synthetic dataset generation for model fine-tuning.
//!
//! ## Architecture
//!
//! A run turns a topic list and a target sample count into validated JSONL
//! records by orchestrating an LLM teacher:
//!
//! - **Generator**: bounded-concurrency engine driving the pipeline
//! - **Schemas**: instruction, chat, preference, classification. Each owns
//!   its prompt contract, parsing, and validation rules
//! - **Providers**: OpenAI-compatible chat completion endpoints
//! - **Output**: buffered JSONL writer with explicit sync boundaries
//! - **Checkpoints**: atomic snapshots keyed by output path, so interrupted
//!   runs resume without data loss or duplication
//!
//! ## Failure semantics
//!
//! Per-sample failures (parse errors, validation rejects, exhausted retries)
//! are counted and the run continues. Fatal conditions (resume mismatches,
//! write failures) cancel outstanding work, flush what is durable, and
//! surface a single typed error.

pub mod checkpoint;
pub mod generator;
pub mod models;
pub mod output;
pub mod provider;
pub mod schema;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointStore, ConfigSnapshot};
pub use generator::{CancelToken, Generator, RateLimiter, TopicSampler, WorkerPool};
pub use models::{
    ConfigError, GenerationConfig, KothasetError, Progress, ProviderError, ProviderErrorKind,
    Result, RunResult, Sample, SampleMetadata, SchemaError,
};
pub use output::{new_writer, JsonlWriter, Writer};
pub use provider::{
    GenerationRequest, GenerationResponse, Message, OpenAiProvider, Provider, ProviderRegistry,
    TokenUsage,
};
pub use schema::{Schema, SchemaRegistry};
