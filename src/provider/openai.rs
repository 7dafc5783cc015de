//! OpenAI-compatible chat completions adapter.
//!
//! Works against OpenAI itself and compatible endpoints (DeepSeek, vLLM,
//! Ollama, aggregators) via a configurable base URL. HTTP status codes are
//! mapped onto the provider error taxonomy; retrying is the caller's job.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::{ProviderError, ProviderErrorKind};
use crate::provider::{GenerationRequest, GenerationResponse, Provider, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider for OpenAI-compatible chat completion APIs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    custom_headers: HashMap<String, String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

impl OpenAiProvider {
    /// Create a new adapter.
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout_secs: u64,
        custom_headers: HashMap<String, String>,
    ) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::new(ProviderErrorKind::Network, format!("building client: {e}"))
            })?;

        Ok(Self {
            client,
            name: name.into(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            custom_headers,
            timeout,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (key, value) in &self.custom_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }

        headers
    }

    /// Normalize role aliases onto the wire names.
    fn wire_role(role: &str) -> &'static str {
        match role.to_ascii_lowercase().as_str() {
            "system" => "system",
            "assistant" | "ai" | "bot" => "assistant",
            _ => "user",
        }
    }

    fn wire_messages<'a>(req: &'a GenerationRequest) -> Vec<WireMessage<'a>> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system_prompt {
            if !system.is_empty() {
                messages.push(WireMessage {
                    role: "system",
                    content: system,
                });
            }
        }
        for msg in &req.messages {
            messages.push(WireMessage {
                role: Self::wire_role(&msg.role),
                content: &msg.content,
            });
        }
        messages
    }

    /// Map an HTTP error status plus body onto the error taxonomy.
    fn error_from_status(status: u16, headers: &HeaderMap, body: &str) -> ProviderError {
        let detail = serde_json::from_str::<ApiErrorResponse>(body)
            .map(|e| e.error)
            .ok();
        let message = detail
            .as_ref()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.chars().take(300).collect()
                }
            });
        let marker = detail
            .as_ref()
            .and_then(|d| d.code.clone().or_else(|| d.error_type.clone()))
            .unwrap_or_default();

        let err = match status {
            401 | 403 => ProviderError::auth(message),
            429 => {
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                if marker.contains("quota") || message.contains("quota") {
                    ProviderError::new(ProviderErrorKind::Quota, message)
                } else {
                    ProviderError::rate_limited(message, retry_after)
                }
            }
            402 => ProviderError::new(ProviderErrorKind::Quota, message),
            408 => ProviderError::new(ProviderErrorKind::Timeout, message),
            400 | 404 | 422 => {
                if marker.contains("context_length") || message.contains("maximum context length") {
                    ProviderError::new(ProviderErrorKind::ContextLength, message)
                } else if marker.contains("content_filter") {
                    ProviderError::new(ProviderErrorKind::ContentFilter, message)
                } else {
                    ProviderError::validation(message)
                }
            }
            500..=599 => ProviderError::new(ProviderErrorKind::Server, message),
            _ => ProviderError::new(ProviderErrorKind::Unknown, message),
        };
        err.with_status(status)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let start = Instant::now();

        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: Self::wire_messages(req),
            temperature: req.temperature,
            max_tokens: (req.max_tokens > 0).then_some(req.max_tokens),
            top_p: req.top_p,
            stop: req.stop.as_deref(),
            seed: req.seed,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::new(
                        ProviderErrorKind::Timeout,
                        format!("request timed out after {:?}", self.timeout),
                    )
                } else {
                    ProviderError::new(ProviderErrorKind::Network, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_from_status(status.as_u16(), &headers, &body));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::Unknown,
                format!("malformed completion response: {e}"),
            )
        })?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Server, "no choices in response")
        })?;

        let finish_reason = choice.finish_reason.unwrap_or_default();
        if finish_reason == "content_filter" {
            return Err(ProviderError::new(
                ProviderErrorKind::ContentFilter,
                "response was filtered by the provider",
            ));
        }

        let usage = body.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let latency = start.elapsed();
        debug!(
            provider = %self.name,
            model = %self.model,
            latency_ms = latency.as_millis() as u64,
            "completion received"
        );

        Ok(GenerationResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
            usage: usage.unwrap_or_default(),
            model: body.model.unwrap_or_else(|| self.model.clone()),
            latency,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[test]
    fn role_normalization() {
        assert_eq!(OpenAiProvider::wire_role("System"), "system");
        assert_eq!(OpenAiProvider::wire_role("AI"), "assistant");
        assert_eq!(OpenAiProvider::wire_role("bot"), "assistant");
        assert_eq!(OpenAiProvider::wire_role("human"), "user");
        assert_eq!(OpenAiProvider::wire_role("user"), "user");
    }

    #[test]
    fn system_prompt_is_prepended() {
        let req = GenerationRequest {
            messages: vec![Message::user("hello")],
            system_prompt: Some("be terse".to_string()),
            ..Default::default()
        };
        let wire = OpenAiProvider::wire_messages(&req);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "user");
    }

    #[test]
    fn status_mapping() {
        let headers = HeaderMap::new();

        let err = OpenAiProvider::error_from_status(401, &headers, "");
        assert_eq!(err.kind, ProviderErrorKind::Auth);
        assert!(!err.retryable);

        let err = OpenAiProvider::error_from_status(500, &headers, "");
        assert_eq!(err.kind, ProviderErrorKind::Server);
        assert!(err.retryable);

        let err = OpenAiProvider::error_from_status(400, &headers, "");
        assert_eq!(err.kind, ProviderErrorKind::Validation);
        assert!(!err.retryable);
    }

    #[test]
    fn retry_after_header_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("12"));
        let err = OpenAiProvider::error_from_status(429, &headers, "");
        assert_eq!(err.kind, ProviderErrorKind::RateLimit);
        assert_eq!(err.retry_after_secs, Some(12));
        assert!(err.retryable);
    }

    #[test]
    fn context_length_detected_from_message() {
        let headers = HeaderMap::new();
        let body = r#"{"error": {"message": "This model's maximum context length is 8192 tokens", "type": "invalid_request_error", "code": null}}"#;
        let err = OpenAiProvider::error_from_status(400, &headers, body);
        assert_eq!(err.kind, ProviderErrorKind::ContextLength);
    }
}
