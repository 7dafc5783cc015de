//! Generation configuration.
//!
//! All knobs for a run are explicit here and serializable, so the resume
//! identity can be snapshotted into checkpoints. Loading is TOML with serde
//! defaults; unknown keys are ignored for forward compatibility.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ConfigError;

/// Default cache directory for checkpoints.
pub const DEFAULT_CACHE_DIR: &str = ".kothaset";

/// Configuration for a dataset generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    // Target
    pub num_samples: usize,
    pub schema: String,
    pub output_path: PathBuf,
    pub output_format: String,

    // Provider
    pub provider: String,
    pub model: String,
    pub providers: HashMap<String, ProviderSettings>,

    // Generation parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    // Reproducibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Draw a fresh random seed for every request instead of a fixed one.
    pub random_seed: bool,

    // Concurrency
    pub workers: usize,
    /// Requests per minute across all workers. 0 disables throttling.
    pub rate_limit_rpm: u32,

    // Resilience
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Sync output and save a checkpoint after this many drained results.
    /// 0 disables periodic checkpoints (a final one is always written).
    pub checkpoint_every: usize,
    pub cache_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<PathBuf>,

    /// Topic input: path to a topics file, or a single inline topic.
    pub input: String,

    // Prompt context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_instruction: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_samples: 100,
            schema: "instruction".to_string(),
            output_path: PathBuf::new(),
            output_format: "jsonl".to_string(),
            provider: "openai".to_string(),
            model: String::new(),
            providers: HashMap::new(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 0,
            top_p: None,
            seed: None,
            random_seed: false,
            workers: 4,
            rate_limit_rpm: 0,
            max_retries: 3,
            retry_delay_ms: 2000,
            checkpoint_every: 50,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            resume_from: None,
            input: String::new(),
            user_context: None,
            user_instruction: None,
            variables: serde_json::Map::new(),
        }
    }
}

impl GenerationConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema.is_empty() {
            return Err(ConfigError::Invalid("schema is required".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_path is required".to_string()));
        }
        if self.output_format != "jsonl" {
            return Err(ConfigError::UnsupportedFormat(self.output_format.clone()));
        }
        if self.provider.is_empty() {
            return Err(ConfigError::Invalid("provider is required".to_string()));
        }
        if self.model.is_empty() {
            return Err(ConfigError::Invalid("model is required".to_string()));
        }
        if self.input.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "input is required: a topics file or an inline topic".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if let Some(top_p) = self.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "top_p must be within (0, 1], got {top_p}"
                )));
            }
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Delay between retry attempts before backoff scaling.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Settings for the configured provider, with defaults when the config
    /// file has no matching `[providers.<name>]` section.
    pub fn provider_settings(&self) -> ProviderSettings {
        self.providers.get(&self.provider).cloned().unwrap_or_default()
    }
}

/// Connection settings for one named provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider type, selects the adapter implementation.
    #[serde(rename = "type")]
    pub kind: String,

    /// API key value. Prefer `api_key_env` over committing keys to disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL override for OpenAI-compatible endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Extra headers sent with every request.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            timeout_secs: 120,
            headers: HashMap::new(),
        }
    }
}

impl ProviderSettings {
    /// Resolve the API key for the named provider.
    ///
    /// Priority: literal `api_key`, then the `api_key_env` variable, then
    /// `<NAME>_API_KEY`, then the conventional variable for the provider
    /// type (`OPENAI_API_KEY` for `openai`).
    pub fn resolve_api_key(&self, provider_name: &str) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }

        if let Some(env_name) = &self.api_key_env {
            if let Ok(value) = std::env::var(env_name) {
                if !value.is_empty() {
                    return Ok(value);
                }
            }
        }

        let name_var = format!("{}_API_KEY", provider_name.to_uppercase().replace('-', "_"));
        if let Ok(value) = std::env::var(&name_var) {
            if !value.is_empty() {
                return Ok(value);
            }
        }

        let type_var = match self.kind.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        };
        if let Some(var) = type_var {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Ok(value);
                }
            }
        }

        Err(ConfigError::MissingApiKey {
            provider: provider_name.to_string(),
            env_hint: self
                .api_key_env
                .clone()
                .unwrap_or(name_var),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GenerationConfig {
        GenerationConfig {
            output_path: PathBuf::from("out/dataset.jsonl"),
            model: "gpt-4o-mini".to_string(),
            input: "topics.txt".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.num_samples, 100);
        assert_eq!(cfg.schema, "instruction");
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay(), Duration::from_secs(2));
        assert_eq!(cfg.checkpoint_every, 50);
        assert_eq!(cfg.cache_dir, PathBuf::from(".kothaset"));
    }

    #[test]
    fn toml_round_trip_with_unknown_keys() {
        let toml_src = r#"
            num_samples = 5
            schema = "chat"
            output_path = "data/out.jsonl"
            model = "test-model"
            input = "gardening"
            future_option = true

            [providers.openai]
            type = "openai"
            timeout_secs = 30
        "#;
        let cfg: GenerationConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.num_samples, 5);
        assert_eq!(cfg.schema, "chat");
        assert_eq!(cfg.provider_settings().timeout_secs, 30);
        // Unlisted options keep their defaults.
        assert_eq!(cfg.workers, 4);
    }

    #[test]
    fn validate_rejects_bad_temperature() {
        let mut cfg = valid_config();
        cfg.temperature = 2.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_empty_input() {
        let mut cfg = valid_config();
        cfg.input = "   ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_jsonl_format() {
        let mut cfg = valid_config();
        cfg.output_format = "parquet".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn literal_api_key_wins() {
        let settings = ProviderSettings {
            api_key: Some("sk-literal".to_string()),
            api_key_env: Some("KOTHASET_TEST_UNSET_VAR".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.resolve_api_key("openai").unwrap(), "sk-literal");
    }

    #[test]
    fn missing_key_is_typed_error() {
        let settings = ProviderSettings {
            kind: "custom".to_string(),
            ..Default::default()
        };
        let err = settings.resolve_api_key("nokey-provider").unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));
    }
}
