//! DPO/RLHF preference pair schema.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{KothasetError, Result, Sample, SchemaError};
use crate::schema::{
    push_common_footer, push_common_header, strip_code_fence, DatasetStyle, FieldDefinition,
    FieldType, PromptOptions, Schema,
};

/// Preference pairs with chosen and rejected responses.
#[derive(Debug, Default)]
pub struct PreferenceSchema;

impl PreferenceSchema {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct PreferenceFields {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    chosen: String,
    #[serde(default)]
    rejected: String,
}

impl Schema for PreferenceSchema {
    fn name(&self) -> &'static str {
        "preference"
    }

    fn style(&self) -> DatasetStyle {
        DatasetStyle::Preference
    }

    fn description(&self) -> &'static str {
        "DPO/RLHF preference pairs with chosen and rejected responses"
    }

    fn fields(&self) -> Vec<FieldDefinition> {
        vec![
            FieldDefinition {
                name: "prompt",
                field_type: FieldType::String,
                description: "The instruction or question",
                required: true,
            },
            FieldDefinition {
                name: "chosen",
                field_type: FieldType::String,
                description: "The preferred/better response",
                required: true,
            },
            FieldDefinition {
                name: "rejected",
                field_type: FieldType::String,
                description: "The less preferred/worse response",
                required: true,
            },
        ]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["prompt", "chosen", "rejected"]
    }

    fn generate_prompt(&self, opts: &PromptOptions) -> Result<String> {
        let mut prompt = String::new();

        push_common_header(
            &mut prompt,
            opts,
            "Generate a preference pair for training AI alignment.",
        );

        if let Some(topic) = &opts.topic {
            prompt.push_str(&format!("Topic: {topic}\n"));
        }
        if let Some(category) = &opts.category {
            prompt.push_str(&format!("Category: {category}\n"));
        }

        prompt.push('\n');

        prompt.push_str(
            r#"Generate a prompt with two responses - one better (chosen) and one worse (rejected):

{
  "prompt": "A clear question or instruction",
  "chosen": "The preferred response - helpful, accurate, safe, and well-written",
  "rejected": "A less preferred response - could be less helpful, less accurate, less safe, or lower quality"
}

The difference between chosen and rejected should represent clear quality distinctions:
- Accuracy: chosen is factually correct, rejected has minor errors
- Helpfulness: chosen directly addresses the need, rejected is vague
- Safety: chosen avoids harmful content, rejected may be borderline
- Clarity: chosen is well-organized, rejected is confusing
- Completeness: chosen is thorough, rejected is incomplete"#,
        );

        push_common_footer(&mut prompt, opts);
        Ok(prompt)
    }

    fn parse_response(&self, raw: &str) -> Result<Sample> {
        let cleaned = strip_code_fence(raw);

        let data: PreferenceFields = serde_json::from_str(cleaned)
            .map_err(|e| KothasetError::Parse(format!("invalid preference response: {e}")))?;

        let mut fields = Map::new();
        fields.insert("prompt".to_string(), Value::String(data.prompt));
        fields.insert("chosen".to_string(), Value::String(data.chosen));
        fields.insert("rejected".to_string(), Value::String(data.rejected));

        Ok(Sample::from_fields(fields))
    }

    fn validate_sample(&self, sample: &Sample) -> std::result::Result<(), SchemaError> {
        let prompt = sample.str_field("prompt");
        if prompt.is_empty() {
            return Err(SchemaError::new(self.name(), "prompt", "prompt is required"));
        }

        let chosen = sample.str_field("chosen");
        if chosen.is_empty() {
            return Err(SchemaError::new(self.name(), "chosen", "chosen is required"));
        }

        let rejected = sample.str_field("rejected");
        if rejected.is_empty() {
            return Err(SchemaError::new(
                self.name(),
                "rejected",
                "rejected is required",
            ));
        }

        if prompt.len() < 10 {
            return Err(SchemaError::new(
                self.name(),
                "prompt",
                "prompt is too short",
            ));
        }
        if chosen == rejected {
            return Err(SchemaError::new(
                self.name(),
                "chosen",
                "chosen and rejected should be different",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(prompt: &str, chosen: &str, rejected: &str) -> Sample {
        let mut fields = Map::new();
        fields.insert("prompt".to_string(), Value::String(prompt.to_string()));
        fields.insert("chosen".to_string(), Value::String(chosen.to_string()));
        fields.insert("rejected".to_string(), Value::String(rejected.to_string()));
        Sample::from_fields(fields)
    }

    #[test]
    fn parses_and_validates_pair() {
        let schema = PreferenceSchema::new();
        let raw = r#"{"prompt": "How do I reverse a list in Python?", "chosen": "Use list.reverse() or slicing with [::-1].", "rejected": "You can't."}"#;
        let sample = schema.parse_response(raw).unwrap();
        assert!(schema.validate_sample(&sample).is_ok());
    }

    #[test]
    fn rejects_identical_responses() {
        let schema = PreferenceSchema::new();
        let sample = pair("How do I reverse a list?", "same answer", "same answer");
        let err = schema.validate_sample(&sample).unwrap_err();
        assert_eq!(err.field, "chosen");
    }

    #[test]
    fn rejects_short_prompt() {
        let schema = PreferenceSchema::new();
        let sample = pair("Hi", "good answer", "bad answer");
        let err = schema.validate_sample(&sample).unwrap_err();
        assert!(err.message.contains("too short"));
    }
}
