//! Sample and result types flowing through the generation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::KothasetError;

/// A single generated dataset sample.
///
/// `fields` holds the schema-specific payload and is the only part written
/// to the dataset file; `id` and `metadata` travel with the sample for
/// diagnostics and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Unique identifier for this sample
    pub id: String,

    /// Schema-defined payload
    pub fields: Map<String, Value>,

    /// Generation provenance
    #[serde(default)]
    pub metadata: SampleMetadata,
}

impl Sample {
    /// Create a sample from a field map, with id and metadata unset.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            fields,
            metadata: SampleMetadata::default(),
        }
    }

    /// Retrieve a string field, or `""` when absent or not a string.
    pub fn str_field(&self, name: &str) -> &str {
        self.fields.get(name).and_then(Value::as_str).unwrap_or("")
    }

    /// Retrieve an array field, if present.
    pub fn array_field(&self, name: &str) -> Option<&Vec<Value>> {
        self.fields.get(name).and_then(Value::as_array)
    }

    /// Set a field value.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

/// Generation provenance attached to every sample before it is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// When the sample was created
    pub generated_at: Option<DateTime<Utc>>,

    /// Provider used for generation
    pub provider: String,

    /// Model that produced the response
    pub model: String,

    /// Sampling temperature used
    pub temperature: f64,

    /// Seed sent with the request, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Total tokens consumed by the request
    pub tokens_used: u32,

    /// Request latency in milliseconds
    pub latency_ms: u64,

    /// Topic that steered the sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Outcome of a generation run.
///
/// Counters include work restored from a checkpoint when resuming. A fatal
/// mid-run write failure is carried in `write_error` next to the partial
/// counters; the output file and checkpoint on disk remain valid.
#[derive(Debug)]
pub struct RunResult {
    pub total_samples: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_tokens: u64,
    pub duration: Duration,
    pub output_path: PathBuf,

    /// First write failure observed during the run, if any.
    pub write_error: Option<KothasetError>,
}

/// A point-in-time view of generation progress.
#[derive(Debug, Clone)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub percentage: f64,
    pub tokens_used: u64,

    pub eta: Duration,
    pub samples_per_second: f64,
}

impl Progress {
    /// Compute derived progress figures from raw counters.
    pub fn compute(total: usize, completed: usize, failed: usize, tokens: u64, elapsed: Duration) -> Self {
        let samples_per_second = if elapsed.as_secs_f64() > 0.0 {
            completed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let remaining = total.saturating_sub(completed).saturating_sub(failed);
        let eta = if samples_per_second > 0.0 {
            Duration::from_secs_f64(remaining as f64 / samples_per_second)
        } else {
            Duration::ZERO
        };

        let percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            100.0
        };

        Self {
            total,
            completed,
            failed,
            percentage,
            tokens_used: tokens,
            eta,
            samples_per_second,
        }
    }
}

/// Callback invoked with progress updates as samples land.
pub type ProgressCallback = dyn Fn(Progress) + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_field_handles_missing_and_wrong_type() {
        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String("hello".to_string()));
        fields.insert("count".to_string(), Value::from(3));
        let sample = Sample::from_fields(fields);

        assert_eq!(sample.str_field("text"), "hello");
        assert_eq!(sample.str_field("count"), "");
        assert_eq!(sample.str_field("absent"), "");
    }

    #[test]
    fn progress_math() {
        let p = Progress::compute(10, 5, 1, 1000, Duration::from_secs(5));
        assert_eq!(p.completed, 5);
        assert!((p.samples_per_second - 1.0).abs() < 1e-9);
        assert_eq!(p.eta, Duration::from_secs(4));
        assert!((p.percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn progress_with_zero_total() {
        let p = Progress::compute(0, 0, 0, 0, Duration::ZERO);
        assert_eq!(p.percentage, 100.0);
        assert_eq!(p.eta, Duration::ZERO);
    }
}
