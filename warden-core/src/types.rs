//! Shared request/response types for tool calls and content generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a content entry in a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A single turn of content sent to (or received from) a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// Create a user turn with a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Create a model turn with a single text part
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenate all text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A part of a content entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text(String),
    /// A tool call requested by the model
    ToolCall(ToolCall),
}

/// A concrete tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (used to correlate confirmations and results)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool arguments as JSON
    pub args: Value,
}

impl ToolCall {
    /// Create a tool call with a generated ID
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            args,
        }
    }

    /// Create a tool call with an explicit ID
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Definition of a tool available to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for input parameters
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_text_joins_text_parts() {
        let content = Content {
            role: Role::Model,
            parts: vec![
                Part::Text("{\"a\":".into()),
                Part::ToolCall(ToolCall::with_id("1", "noop", Value::Null)),
                Part::Text("1}".into()),
            ],
        };
        assert_eq!(content.text(), "{\"a\":1}");
    }

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new("read_file", serde_json::json!({}));
        let b = ToolCall::new("read_file", serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }
}
