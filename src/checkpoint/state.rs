//! Checkpoint state: counters plus the resume-sensitive configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::GenerationConfig;

/// Version of the checkpoint file layout.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    CHECKPOINT_SCHEMA_VERSION
}

/// The subset of configuration that must match for a safe resume.
///
/// Provider and model are recorded but a mismatch there only warns; schema,
/// output path and input must agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub schema: String,
    pub provider: String,
    pub model: String,
    pub input: Option<String>,
    pub output_path: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            schema: String::new(),
            provider: String::new(),
            model: String::new(),
            input: None,
            output_path: PathBuf::new(),
            cache_dir: PathBuf::new(),
        }
    }
}

impl ConfigSnapshot {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            provider: config.provider.clone(),
            model: config.model.clone(),
            input: (!config.input.is_empty()).then(|| config.input.clone()),
            output_path: config.output_path.clone(),
            cache_dir: config.cache_dir.clone(),
        }
    }
}

/// Durable snapshot of a run's progress.
///
/// Unknown fields from future versions are tolerated on load; missing
/// counters default to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    pub timestamp: DateTime<Utc>,

    pub config: ConfigSnapshot,

    #[serde(default)]
    pub completed: usize,

    #[serde(default)]
    pub failed: usize,

    #[serde(default)]
    pub tokens_used: u64,
}

impl Checkpoint {
    /// Create a checkpoint for the current counters.
    pub fn new(config: &GenerationConfig, completed: usize, failed: usize, tokens_used: u64) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            timestamp: Utc::now(),
            config: ConfigSnapshot::from_config(config),
            completed,
            failed,
            tokens_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_captures_resume_identity() {
        let config = GenerationConfig {
            schema: "chat".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            input: "topics.txt".to_string(),
            output_path: PathBuf::from("out.jsonl"),
            ..Default::default()
        };
        let snapshot = ConfigSnapshot::from_config(&config);
        assert_eq!(snapshot.schema, "chat");
        assert_eq!(snapshot.input.as_deref(), Some("topics.txt"));
        assert_eq!(snapshot.output_path, PathBuf::from("out.jsonl"));
    }

    #[test]
    fn load_tolerates_unknown_and_missing_fields() {
        let raw = r#"{
            "timestamp": "2025-06-01T10:00:00Z",
            "config": {"schema": "instruction", "novel_option": 7},
            "completed": 12,
            "a_future_field": {"nested": true}
        }"#;
        let cp: Checkpoint = serde_json::from_str(raw).unwrap();
        assert_eq!(cp.schema_version, CHECKPOINT_SCHEMA_VERSION);
        assert_eq!(cp.completed, 12);
        assert_eq!(cp.failed, 0);
        assert_eq!(cp.tokens_used, 0);
        assert_eq!(cp.config.schema, "instruction");
        assert!(cp.config.input.is_none());
    }
}
