//! Alpaca-style instruction-response schema.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{KothasetError, Result, Sample, SchemaError};
use crate::schema::{
    push_common_footer, push_common_header, strip_code_fence, DatasetStyle, FieldDefinition,
    FieldType, PromptOptions, Schema,
};

/// Instruction-response pairs for instruction-following tasks.
#[derive(Debug, Default)]
pub struct InstructionSchema;

impl InstructionSchema {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct InstructionFields {
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    output: String,
}

impl Schema for InstructionSchema {
    fn name(&self) -> &'static str {
        "instruction"
    }

    fn style(&self) -> DatasetStyle {
        DatasetStyle::Instruction
    }

    fn description(&self) -> &'static str {
        "Alpaca-style instruction-response pairs for instruction following tasks"
    }

    fn fields(&self) -> Vec<FieldDefinition> {
        vec![
            FieldDefinition {
                name: "instruction",
                field_type: FieldType::String,
                description: "The task instruction or question",
                required: true,
            },
            FieldDefinition {
                name: "input",
                field_type: FieldType::String,
                description: "Optional additional context or input for the task",
                required: false,
            },
            FieldDefinition {
                name: "output",
                field_type: FieldType::String,
                description: "The expected response or answer",
                required: true,
            },
        ]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["instruction", "output"]
    }

    fn generate_prompt(&self, opts: &PromptOptions) -> Result<String> {
        let mut prompt = String::new();

        push_common_header(
            &mut prompt,
            opts,
            "Generate a high-quality instruction-response pair for training an AI assistant.",
        );

        if let Some(topic) = &opts.topic {
            prompt.push_str(&format!("Topic/Seed: {topic}\n"));
        }
        if let Some(category) = &opts.category {
            prompt.push_str(&format!("Category: {category}\n"));
        }
        if let Some(language) = &opts.language {
            if language != "en" {
                prompt.push_str(&format!("Language: {language}\n"));
            }
        }
        if opts.complexity > 0 {
            prompt.push_str(&format!("Complexity level: {}/5\n", opts.complexity));
        }

        prompt.push('\n');

        if opts.num_examples > 0 && !opts.examples.is_empty() {
            prompt.push_str("Here are some examples of the expected format:\n\n");
            for (i, example) in opts.examples.iter().take(opts.num_examples).enumerate() {
                prompt.push_str(&format!("Example {}:\n", i + 1));
                prompt.push_str(&format!(
                    "Instruction: {}\n",
                    example.str_field("instruction")
                ));
                let input = example.str_field("input");
                if !input.is_empty() {
                    prompt.push_str(&format!("Input: {input}\n"));
                }
                prompt.push_str(&format!("Output: {}\n\n", example.str_field("output")));
            }
        }

        prompt.push_str(
            r#"Generate a new instruction-response pair in the following JSON format:
{
  "instruction": "A clear, specific instruction or question",
  "input": "Optional additional context (can be empty string)",
  "output": "A comprehensive, accurate response"
}

Requirements:
- The instruction should be clear and actionable
- The output should be helpful, accurate, and well-formatted
- Vary the style: questions, commands, requests, tasks
- Be creative and diverse in topics and approaches"#,
        );

        push_common_footer(&mut prompt, opts);
        Ok(prompt)
    }

    fn parse_response(&self, raw: &str) -> Result<Sample> {
        let cleaned = strip_code_fence(raw);

        let data: InstructionFields = serde_json::from_str(cleaned)
            .map_err(|e| KothasetError::Parse(format!("invalid instruction response: {e}")))?;

        let mut fields = Map::new();
        fields.insert("instruction".to_string(), Value::String(data.instruction));
        fields.insert("input".to_string(), Value::String(data.input));
        fields.insert("output".to_string(), Value::String(data.output));

        Ok(Sample::from_fields(fields))
    }

    fn validate_sample(&self, sample: &Sample) -> std::result::Result<(), SchemaError> {
        let instruction = sample.str_field("instruction");
        if instruction.is_empty() {
            return Err(SchemaError::new(
                self.name(),
                "instruction",
                "instruction is required",
            ));
        }

        let output = sample.str_field("output");
        if output.is_empty() {
            return Err(SchemaError::new(self.name(), "output", "output is required"));
        }

        if instruction.len() < 10 {
            return Err(SchemaError::new(
                self.name(),
                "instruction",
                "instruction is too short",
            ));
        }
        if output.len() < 10 {
            return Err(SchemaError::new(
                self.name(),
                "output",
                "output is too short",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(instruction: &str, output: &str) -> Sample {
        let mut fields = Map::new();
        fields.insert(
            "instruction".to_string(),
            Value::String(instruction.to_string()),
        );
        fields.insert("output".to_string(), Value::String(output.to_string()));
        Sample::from_fields(fields)
    }

    #[test]
    fn parses_fenced_response() {
        let schema = InstructionSchema::new();
        let raw = "```json\n{\"instruction\": \"Explain photosynthesis in detail\", \"output\": \"Photosynthesis converts light into chemical energy.\"}\n```";
        let sample = schema.parse_response(raw).unwrap();
        assert_eq!(
            sample.str_field("instruction"),
            "Explain photosynthesis in detail"
        );
        // Missing optional input defaults to an empty string.
        assert_eq!(sample.str_field("input"), "");
    }

    #[test]
    fn unknown_response_fields_are_ignored() {
        let schema = InstructionSchema::new();
        let raw = r#"{"instruction": "Write a haiku about autumn", "output": "Leaves drift on cold wind", "confidence": 0.9}"#;
        assert!(schema.parse_response(raw).is_ok());
    }

    #[test]
    fn rejects_non_json() {
        let schema = InstructionSchema::new();
        assert!(matches!(
            schema.parse_response("Sure! Here is a pair:"),
            Err(KothasetError::Parse(_))
        ));
    }

    #[test]
    fn validates_length_rules() {
        let schema = InstructionSchema::new();

        let ok = sample_with("Explain gravity to a child", "Gravity pulls things down.");
        assert!(schema.validate_sample(&ok).is_ok());

        let short = sample_with("Hi", "Gravity pulls things toward each other.");
        let err = schema.validate_sample(&short).unwrap_err();
        assert_eq!(err.field, "instruction");

        let missing = sample_with("Explain gravity to a child", "");
        let err = schema.validate_sample(&missing).unwrap_err();
        assert_eq!(err.field, "output");
    }

    #[test]
    fn prompt_embeds_topic_and_ends_with_json_directive() {
        let schema = InstructionSchema::new();
        let opts = PromptOptions {
            topic: Some("rust lifetimes".to_string()),
            ..Default::default()
        };
        let prompt = schema.generate_prompt(&opts).unwrap();
        assert!(prompt.contains("Topic/Seed: rust lifetimes"));
        assert!(prompt.ends_with("Respond with ONLY the JSON object, no additional text."));
    }
}
