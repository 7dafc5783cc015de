//! LLM provider abstraction.
//!
//! A provider turns one [`GenerationRequest`] into one
//! [`GenerationResponse`] or a typed [`ProviderError`](crate::models::ProviderError).
//! It is request-scoped: rate limiting and the retry loop live in the
//! generator, not here.

mod openai;
mod registry;

pub use openai::OpenAiProvider;
pub use registry::{ProviderFactory, ProviderRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::ProviderError;

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// system, user, or assistant
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Parameters for one generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Conversation history
    pub messages: Vec<Message>,

    /// System message, prepended when set
    pub system_prompt: Option<String>,

    /// Sampling temperature (0-2)
    pub temperature: f64,

    /// Response length limit. 0 leaves the provider default in place.
    pub max_tokens: u32,

    /// Nucleus sampling parameter
    pub top_p: Option<f64>,

    /// Stop sequences
    pub stop: Option<Vec<String>>,

    /// Seed for reproducibility
    pub seed: Option<i64>,
}

/// Result of one generation request.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text
    pub content: String,

    /// Why generation stopped
    pub finish_reason: String,

    /// Token consumption
    pub usage: TokenUsage,

    /// The model that actually served the request
    pub model: String,

    /// Wall-clock request latency
    pub latency: Duration,
}

/// Token counts for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The capability the generator consumes: one request in, one response or
/// typed error out.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create a completion for the given request.
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, ProviderError>;

    /// Configured name of this provider instance.
    fn name(&self) -> &str;

    /// Model this provider targets.
    fn model(&self) -> &str;
}
