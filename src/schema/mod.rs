//! Dataset schema engine.
//!
//! A [`Schema`] knows how to ask an LLM for one sample (prompt building),
//! how to turn the raw response into a [`Sample`] (parsing), and whether the
//! result is acceptable (validation). Four built-ins cover the supported
//! dataset styles: instruction, chat, preference, classification.

mod chat;
mod classification;
mod instruction;
mod preference;
mod registry;

pub use chat::ChatSchema;
pub use classification::ClassificationSchema;
pub use instruction::InstructionSchema;
pub use preference::PreferenceSchema;
pub use registry::SchemaRegistry;

use serde_json::Value;

use crate::models::{Result, Sample, SchemaError};

/// The dataset style a schema produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStyle {
    /// Instruction-response pairs
    Instruction,
    /// Multi-turn conversations
    Chat,
    /// Chosen/rejected pairs for DPO/RLHF
    Preference,
    /// Text + label(s)
    Classification,
}

/// Data type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    List,
    Object,
    Message,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Object => "object",
            Self::Message => "message",
        };
        f.write_str(s)
    }
}

/// Describes one field in a schema's payload.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub field_type: FieldType,
    pub description: &'static str,
    pub required: bool,
}

/// Options steering prompt generation for a single sample.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    /// Topic or seed for the sample
    pub topic: Option<String>,

    /// Category or domain
    pub category: Option<String>,

    /// Language for the sample
    pub language: Option<String>,

    /// Complexity level (1-5, 0 = unspecified)
    pub complexity: u8,

    /// Custom variables for the prompt template
    pub variables: serde_json::Map<String, Value>,

    /// Few-shot examples to include (0 = zero-shot)
    pub num_examples: usize,
    pub examples: Vec<Sample>,

    /// Free-form context paragraphs supplied by the user
    pub user_context: Option<String>,

    /// Extra instructions appended after the format section
    pub user_instruction: Option<String>,
}

/// A dataset schema: prompt contract, parse rules, validation rules.
pub trait Schema: Send + Sync {
    fn name(&self) -> &'static str;
    fn style(&self) -> DatasetStyle;
    fn description(&self) -> &'static str;

    fn fields(&self) -> Vec<FieldDefinition>;
    fn required_fields(&self) -> &'static [&'static str];

    /// Compose the user prompt for one sample.
    fn generate_prompt(&self, opts: &PromptOptions) -> Result<String>;

    /// Parse a raw LLM response into a sample. Strips surrounding code
    /// fences; unknown response fields are ignored.
    fn parse_response(&self, raw: &str) -> Result<Sample>;

    /// Check a parsed sample against the schema's quality rules.
    fn validate_sample(&self, sample: &Sample) -> std::result::Result<(), SchemaError>;
}

/// Remove a surrounding markdown code fence, if present.
///
/// Only the outermost pair is removed: a triple backtick inside the JSON
/// body (for example within a string literal) survives.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();

    let rest = if let Some(r) = trimmed.strip_prefix("```json") {
        r
    } else if let Some(r) = trimmed.strip_prefix("```") {
        r
    } else {
        return trimmed;
    };

    let rest = rest.trim_start();
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Shared prompt scaffolding: user context (or a default lead-in), topic and
/// category lines, then a blank separator.
pub(crate) fn push_common_header(out: &mut String, opts: &PromptOptions, default_context: &str) {
    match &opts.user_context {
        Some(ctx) if !ctx.is_empty() => {
            out.push_str(ctx);
            out.push_str("\n\n");
        }
        _ => {
            out.push_str(default_context);
            out.push_str("\n\n");
        }
    }
}

/// Shared prompt footer: user instructions and the JSON-only directive.
pub(crate) fn push_common_footer(out: &mut String, opts: &PromptOptions) {
    if let Some(instruction) = &opts.user_instruction {
        if !instruction.is_empty() {
            out.push_str("\n\nAdditional Instructions:\n");
            out.push_str(instruction);
        }
    }
    out.push_str("\n\nRespond with ONLY the JSON object, no additional text.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn missing_trailing_fence_is_tolerated() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn nested_backticks_survive() {
        let raw = "```json\n{\"output\": \"use ``` to fence code\"}\n```";
        assert_eq!(
            strip_code_fence(raw),
            "{\"output\": \"use ``` to fence code\"}"
        );
    }
}
