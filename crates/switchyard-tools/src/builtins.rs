//! Builtins - Side-effect-free tools shipped with Switchyard
//!
//! - echo: returns its `message` argument
//! - clock: returns the current UTC time
//! - word_count: counts words in `text`

use crate::error::{Error, Result};
use crate::registry::{ResourceUsage, Tool, ToolDefinition, ToolOutput, ToolRegistry};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Register all built-in tools with the registry
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(Arc::new(EchoTool::new()));
    registry.register(Arc::new(ClockTool::new()));
    registry.register(Arc::new(WordCountTool::new()));
}

/// Returns its `message` argument unchanged
pub struct EchoTool {
    definition: ToolDefinition,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoTool {
    /// Create the tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new("echo", "Return the given message")
                .with_parameters(json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }))
                .with_tag("builtin"),
        }
    }
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let message = input
            .get("message")
            .cloned()
            .ok_or_else(|| Error::InvalidInput("missing 'message'".to_string()))?;
        Ok(ToolOutput::new(json!({ "message": message })))
    }
}

/// Returns the current UTC time
pub struct ClockTool {
    definition: ToolDefinition,
}

impl Default for ClockTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockTool {
    /// Create the tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new("clock", "Return the current UTC time")
                .with_tag("builtin"),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ClockTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _input: Value) -> Result<ToolOutput> {
        Ok(ToolOutput::new(json!({ "now": Utc::now().to_rfc3339() })))
    }
}

/// Counts whitespace-separated words in `text`
pub struct WordCountTool {
    definition: ToolDefinition,
}

impl Default for WordCountTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WordCountTool {
    /// Create the tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new("word_count", "Count words in a text")
                .with_parameters(json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }))
                .with_tag("builtin")
                .with_tag("text"),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WordCountTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("'text' must be a string".to_string()))?;
        let words = text.split_whitespace().count();
        let usage = ResourceUsage {
            cpu_ms: 0,
            memory_mb: (text.len() as u64 / (1024 * 1024)).max(1),
        };
        Ok(ToolOutput::new(json!({ "words": words })).with_usage(usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_word_count() {
        let out = WordCountTool::new()
            .execute(json!({"text": "one two  three"}))
            .await
            .unwrap();
        assert_eq!(out.value["words"], 3);
    }

    #[tokio::test]
    async fn test_echo_requires_message() {
        let err = EchoTool::new().execute(json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_register_builtins() {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry);
        assert_eq!(registry.list(), vec!["clock", "echo", "word_count"]);
    }
}
