//! Text classification schema.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{KothasetError, Result, Sample, SchemaError};
use crate::schema::{
    push_common_footer, strip_code_fence, DatasetStyle, FieldDefinition, FieldType, PromptOptions,
    Schema,
};

/// Text classification samples with labels.
#[derive(Debug, Default)]
pub struct ClassificationSchema;

impl ClassificationSchema {
    pub fn new() -> Self {
        Self
    }

    /// Label vocabulary supplied through `variables["labels"]`, if any.
    fn labels_from(opts: &PromptOptions) -> Vec<String> {
        opts.variables
            .get("labels")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct ClassificationFields {
    #[serde(default)]
    text: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    confidence: f64,
}

impl Schema for ClassificationSchema {
    fn name(&self) -> &'static str {
        "classification"
    }

    fn style(&self) -> DatasetStyle {
        DatasetStyle::Classification
    }

    fn description(&self) -> &'static str {
        "Text classification with labels for training classifiers"
    }

    fn fields(&self) -> Vec<FieldDefinition> {
        vec![
            FieldDefinition {
                name: "text",
                field_type: FieldType::String,
                description: "The text to classify",
                required: true,
            },
            FieldDefinition {
                name: "label",
                field_type: FieldType::String,
                description: "The classification label",
                required: true,
            },
            FieldDefinition {
                name: "labels",
                field_type: FieldType::List,
                description: "Multiple labels for multi-label classification",
                required: false,
            },
            FieldDefinition {
                name: "confidence",
                field_type: FieldType::Float,
                description: "Confidence score (0-1)",
                required: false,
            },
        ]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["text", "label"]
    }

    fn generate_prompt(&self, opts: &PromptOptions) -> Result<String> {
        let mut prompt = String::new();

        prompt.push_str("Generate a text classification example.\n\n");

        if let Some(topic) = &opts.topic {
            prompt.push_str(&format!("Category/Domain: {topic}\n"));
        }

        prompt.push('\n');

        let labels = Self::labels_from(opts);
        if !labels.is_empty() {
            prompt.push_str(&format!("Available labels: {}\n\n", labels.join(", ")));
            prompt.push_str(
                r#"Generate a text sample and assign the most appropriate label:

{
  "text": "The text content to classify",
  "label": "one_of_the_available_labels"
}"#,
            );
        } else {
            prompt.push_str(
                r#"Generate a text classification example with an appropriate label:

{
  "text": "The text content to classify",
  "label": "an_appropriate_category_label"
}

Common classification types:
- Sentiment: positive, negative, neutral
- Topic: sports, politics, technology, entertainment, etc.
- Intent: question, request, complaint, feedback, etc.
- Toxicity: toxic, non-toxic
- Language: en, es, fr, de, etc."#,
            );
        }

        push_common_footer(&mut prompt, opts);
        Ok(prompt)
    }

    fn parse_response(&self, raw: &str) -> Result<Sample> {
        let cleaned = strip_code_fence(raw);

        let data: ClassificationFields = serde_json::from_str(cleaned)
            .map_err(|e| KothasetError::Parse(format!("invalid classification response: {e}")))?;

        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String(data.text));
        fields.insert("label".to_string(), Value::String(data.label));
        if !data.labels.is_empty() {
            fields.insert(
                "labels".to_string(),
                Value::Array(data.labels.into_iter().map(Value::String).collect()),
            );
        }
        if data.confidence > 0.0 {
            fields.insert("confidence".to_string(), Value::from(data.confidence));
        }

        Ok(Sample::from_fields(fields))
    }

    fn validate_sample(&self, sample: &Sample) -> std::result::Result<(), SchemaError> {
        let text = sample.str_field("text");
        if text.is_empty() {
            return Err(SchemaError::new(self.name(), "text", "text is required"));
        }

        let label = sample.str_field("label");
        if label.is_empty() {
            return Err(SchemaError::new(self.name(), "label", "label is required"));
        }

        if text.len() < 5 {
            return Err(SchemaError::new(self.name(), "text", "text is too short"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let schema = ClassificationSchema::new();
        let raw = r#"{"text": "What a fantastic release!", "label": "positive", "confidence": 0.93}"#;
        let sample = schema.parse_response(raw).unwrap();
        assert_eq!(sample.str_field("label"), "positive");
        assert!(sample.fields.contains_key("confidence"));
        assert!(!sample.fields.contains_key("labels"));
        assert!(schema.validate_sample(&sample).is_ok());
    }

    #[test]
    fn prompt_lists_label_vocabulary() {
        let schema = ClassificationSchema::new();
        let mut variables = serde_json::Map::new();
        variables.insert(
            "labels".to_string(),
            serde_json::json!(["positive", "negative", "neutral"]),
        );
        let opts = PromptOptions {
            variables,
            ..Default::default()
        };
        let prompt = schema.generate_prompt(&opts).unwrap();
        assert!(prompt.contains("Available labels: positive, negative, neutral"));
    }

    #[test]
    fn rejects_short_text() {
        let schema = ClassificationSchema::new();
        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String("ok".to_string()));
        fields.insert("label".to_string(), Value::String("neutral".to_string()));
        let err = schema
            .validate_sample(&Sample::from_fields(fields))
            .unwrap_err();
        assert!(err.message.contains("too short"));
    }

    #[test]
    fn rejects_missing_label() {
        let schema = ClassificationSchema::new();
        let mut fields = Map::new();
        fields.insert(
            "text".to_string(),
            Value::String("A long enough text".to_string()),
        );
        let err = schema
            .validate_sample(&Sample::from_fields(fields))
            .unwrap_err();
        assert_eq!(err.field, "label");
    }
}
