//! ShareGPT-style multi-turn conversation schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{KothasetError, Result, Sample, SchemaError};
use crate::schema::{
    push_common_footer, push_common_header, strip_code_fence, DatasetStyle, FieldDefinition,
    FieldType, PromptOptions, Schema,
};

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// system, user, or assistant
    pub role: String,
    pub content: String,
}

/// Multi-turn conversations for conversational AI training.
#[derive(Debug, Default)]
pub struct ChatSchema;

impl ChatSchema {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct ChatFields {
    #[serde(default)]
    system: String,
    #[serde(default)]
    conversations: Vec<ChatMessage>,
}

impl Schema for ChatSchema {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn style(&self) -> DatasetStyle {
        DatasetStyle::Chat
    }

    fn description(&self) -> &'static str {
        "ShareGPT-style multi-turn conversations for conversational AI training"
    }

    fn fields(&self) -> Vec<FieldDefinition> {
        vec![
            FieldDefinition {
                name: "conversations",
                field_type: FieldType::List,
                description: "List of messages in the conversation",
                required: true,
            },
            FieldDefinition {
                name: "system",
                field_type: FieldType::String,
                description: "Optional system prompt for the conversation",
                required: false,
            },
        ]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["conversations"]
    }

    fn generate_prompt(&self, opts: &PromptOptions) -> Result<String> {
        let mut prompt = String::new();

        push_common_header(
            &mut prompt,
            opts,
            "Generate a high-quality multi-turn conversation between a user and an AI assistant.",
        );

        if let Some(topic) = &opts.topic {
            prompt.push_str(&format!("Topic/Context: {topic}\n"));
        }
        if let Some(category) = &opts.category {
            prompt.push_str(&format!("Category: {category}\n"));
        }
        if opts.complexity > 0 {
            prompt.push_str(&format!(
                "Conversation depth: {}/5 (more turns for higher values)\n",
                opts.complexity
            ));
        }

        prompt.push('\n');

        prompt.push_str(
            r#"Generate a conversation in the following JSON format:
{
  "system": "Optional system prompt defining the assistant's behavior",
  "conversations": [
    {"role": "user", "content": "User's first message"},
    {"role": "assistant", "content": "Assistant's helpful response"},
    {"role": "user", "content": "User's follow-up"},
    {"role": "assistant", "content": "Assistant's response"}
  ]
}

Requirements:
- Include 2-6 turns (exchanges between user and assistant)
- The conversation should be coherent and natural
- Assistant responses should be helpful, accurate, and engaging
- User messages can include questions, requests, or follow-ups
- Vary the conversation style and complexity"#,
        );

        push_common_footer(&mut prompt, opts);
        Ok(prompt)
    }

    fn parse_response(&self, raw: &str) -> Result<Sample> {
        let cleaned = strip_code_fence(raw);

        let data: ChatFields = serde_json::from_str(cleaned)
            .map_err(|e| KothasetError::Parse(format!("invalid chat response: {e}")))?;

        let mut fields = Map::new();
        fields.insert("system".to_string(), Value::String(data.system));
        fields.insert(
            "conversations".to_string(),
            serde_json::to_value(data.conversations)
                .map_err(|e| KothasetError::Parse(e.to_string()))?,
        );

        Ok(Sample::from_fields(fields))
    }

    fn validate_sample(&self, sample: &Sample) -> std::result::Result<(), SchemaError> {
        let conversations = sample.array_field("conversations").ok_or_else(|| {
            SchemaError::new(self.name(), "conversations", "conversations is required")
        })?;

        if conversations.len() < 2 {
            return Err(SchemaError::new(
                self.name(),
                "conversations",
                "at least 2 messages required",
            ));
        }

        for (i, message) in conversations.iter().enumerate() {
            let role = message.get("role").and_then(Value::as_str).unwrap_or("");
            if !matches!(role, "system" | "user" | "assistant") {
                return Err(SchemaError::new(
                    self.name(),
                    "conversations",
                    format!("invalid role at index {i}: {role}"),
                ));
            }

            let content = message.get("content").and_then(Value::as_str).unwrap_or("");
            if content.is_empty() {
                return Err(SchemaError::new(
                    self.name(),
                    "conversations",
                    format!("empty content at index {i}"),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation_sample(messages: Value) -> Sample {
        let mut fields = Map::new();
        fields.insert("conversations".to_string(), messages);
        Sample::from_fields(fields)
    }

    #[test]
    fn parses_conversation() {
        let schema = ChatSchema::new();
        let raw = r#"{
            "system": "You are helpful.",
            "conversations": [
                {"role": "user", "content": "Hello"},
                {"role": "assistant", "content": "Hi, how can I help?"}
            ]
        }"#;
        let sample = schema.parse_response(raw).unwrap();
        assert_eq!(sample.array_field("conversations").unwrap().len(), 2);
        assert!(schema.validate_sample(&sample).is_ok());
    }

    #[test]
    fn rejects_single_message() {
        let schema = ChatSchema::new();
        let sample = conversation_sample(serde_json::json!([
            {"role": "user", "content": "Hello"}
        ]));
        let err = schema.validate_sample(&sample).unwrap_err();
        assert!(err.message.contains("at least 2"));
    }

    #[test]
    fn rejects_bad_role() {
        let schema = ChatSchema::new();
        let sample = conversation_sample(serde_json::json!([
            {"role": "user", "content": "Hello"},
            {"role": "narrator", "content": "Meanwhile..."}
        ]));
        let err = schema.validate_sample(&sample).unwrap_err();
        assert!(err.message.contains("invalid role at index 1"));
    }

    #[test]
    fn rejects_empty_content() {
        let schema = ChatSchema::new();
        let sample = conversation_sample(serde_json::json!([
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "content": ""}
        ]));
        let err = schema.validate_sample(&sample).unwrap_err();
        assert!(err.message.contains("empty content at index 1"));
    }
}
