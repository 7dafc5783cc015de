//! Error types for kothaset.
//!
//! The run-time taxonomy separates per-sample failures (parse, validation,
//! retryable provider errors) from per-run fatal conditions (resume
//! mismatches, write failures). The retry policy in the generator keys off
//! `ProviderError::retryable`, never off error messages.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for kothaset.
#[derive(Debug, Error)]
pub enum KothasetError {
    #[error("generation cancelled")]
    Cancelled,

    #[error("input contains no topics")]
    InputEmpty,

    #[error("cannot access input file '{path}': {source}")]
    InputAccessDenied {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load checkpoint from {path}: {reason}")]
    ResumeLoad { path: PathBuf, reason: String },

    #[error("checkpoint schema '{checkpoint}' does not match configured schema '{config}'")]
    ResumeSchemaMismatch { checkpoint: String, config: String },

    #[error("checkpoint output path '{checkpoint}' does not match configured output '{config}'")]
    ResumeOutputMismatch { checkpoint: String, config: String },

    #[error("checkpoint input '{checkpoint}' does not match configured input '{config}'")]
    ResumeInputMismatch { checkpoint: String, config: String },

    #[error("checkpoint completed count {completed} exceeds requested sample count {requested}")]
    ResumeCountMismatch { completed: usize, requested: usize },

    #[error("failed to build prompt: {0}")]
    PromptBuild(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to write sample: {context}")]
    Write {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint error: {context}")]
    Checkpoint {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl KothasetError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a write error with context.
    pub fn write(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Write {
            context: context.into(),
            source,
        }
    }

    /// Create a checkpoint error with context.
    pub fn checkpoint(context: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::Checkpoint {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable at the request level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.retryable)
    }
}

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Invalid request parameters
    Validation,
    /// Authentication failure
    Auth,
    /// Rate limit exceeded
    RateLimit,
    /// Quota exceeded
    Quota,
    /// Network connectivity issue
    Network,
    /// Request timeout
    Timeout,
    /// Provider server error
    Server,
    /// Content filtered
    ContentFilter,
    /// Context too long
    ContextLength,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Quota => "quota",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Server => "server",
            Self::ContentFilter => "content_filter",
            Self::ContextLength => "context_length",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An error returned by an LLM provider.
///
/// `retryable` drives the generator's retry loop; `retry_after_secs` is the
/// provider's own backoff hint (HTTP Retry-After) and takes precedence over
/// the computed exponential delay.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
    /// Seconds to wait before retrying, if the provider said so.
    pub retry_after_secs: Option<u64>,
    /// HTTP status code, when the error came off the wire.
    pub status_code: Option<u16>,
}

impl ProviderError {
    /// Create a provider error with the default retryability for its kind.
    ///
    /// RateLimit, Timeout and Server are retryable; everything else is not.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            ProviderErrorKind::RateLimit | ProviderErrorKind::Timeout | ProviderErrorKind::Server
        );
        Self {
            kind,
            message: message.into(),
            retryable,
            retry_after_secs: None,
            status_code: None,
        }
    }

    /// Create a rate limit error with a retry-after hint.
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self {
            retry_after_secs,
            ..Self::new(ProviderErrorKind::RateLimit, message)
        }
    }

    /// Create an authentication error. Never retried.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    /// Create a validation error. Never retried.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Validation, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after_secs
    }
}

/// A schema validation failure for a single sample.
#[derive(Debug, Clone)]
pub struct SchemaError {
    pub schema: String,
    pub field: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(
        schema: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "schema {}: {}", self.schema, self.message)
        } else {
            write!(
                f,
                "schema {}: field {}: {}",
                self.schema, self.field, self.message
            )
        }
    }
}

impl std::error::Error for SchemaError {}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing API key for provider '{provider}': set {env_hint} or api_key in config")]
    MissingApiKey { provider: String, env_hint: String },

    #[error("unknown provider type: {0}")]
    UnknownProviderType(String),

    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    #[error("unsupported output format: {0} (supported: jsonl)")]
    UnsupportedFormat(String),
}

/// Result type alias for kothaset.
pub type Result<T> = std::result::Result<T, KothasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_defaults_by_kind() {
        assert!(ProviderError::new(ProviderErrorKind::RateLimit, "x").retryable);
        assert!(ProviderError::new(ProviderErrorKind::Timeout, "x").retryable);
        assert!(ProviderError::new(ProviderErrorKind::Server, "x").retryable);

        assert!(!ProviderError::new(ProviderErrorKind::Auth, "x").retryable);
        assert!(!ProviderError::new(ProviderErrorKind::Validation, "x").retryable);
        assert!(!ProviderError::new(ProviderErrorKind::Quota, "x").retryable);
        assert!(!ProviderError::new(ProviderErrorKind::Network, "x").retryable);
        assert!(!ProviderError::new(ProviderErrorKind::ContentFilter, "x").retryable);
        assert!(!ProviderError::new(ProviderErrorKind::ContextLength, "x").retryable);
        assert!(!ProviderError::new(ProviderErrorKind::Unknown, "x").retryable);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = ProviderError::rate_limited("slow down", Some(7));
        assert_eq!(err.retry_after(), Some(7));
        assert!(err.is_retryable());
    }

    #[test]
    fn schema_error_display() {
        let err = SchemaError::new("instruction", "output", "output is too short");
        assert_eq!(
            err.to_string(),
            "schema instruction: field output: output is too short"
        );
    }
}
