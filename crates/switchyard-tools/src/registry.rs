//! Registry - Tool registration and discovery
//!
//! Tools are registered with a definition describing what they need
//! (network, filesystem, memory) and who may call them. The registry also
//! offers a direct, role-checked `invoke` for callers that do not need a
//! sandbox policy.

use crate::error::{Error, Result, ViolationReason};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Risk level of a tool
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only, no side effects
    #[default]
    Low,
    /// Writes with limited scope
    Medium,
    /// System modifications or external side effects
    High,
}

impl RiskLevel {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool metadata and requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool id
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema for parameters
    pub parameters: Value,
    /// Risk level
    pub risk_level: RiskLevel,
    /// Roles allowed to invoke the tool (empty means any role)
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Needs outbound network
    #[serde(default)]
    pub requires_network: bool,
    /// Needs filesystem access
    #[serde(default)]
    pub requires_filesystem: bool,
    /// Declared peak memory in megabytes
    #[serde(default)]
    pub memory_mb: u64,
}

impl ToolDefinition {
    /// Create a new tool definition
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            risk_level: RiskLevel::Low,
            allowed_roles: Vec::new(),
            tags: Vec::new(),
            requires_network: false,
            requires_filesystem: false,
            memory_mb: 16,
        }
    }

    /// Set the parameters schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the risk level
    #[must_use]
    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// Restrict the tool to these roles
    #[must_use]
    pub fn with_allowed_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Mark the tool as needing network access
    #[must_use]
    pub fn with_network(mut self) -> Self {
        self.requires_network = true;
        self
    }

    /// Mark the tool as needing filesystem access
    #[must_use]
    pub fn with_filesystem(mut self) -> Self {
        self.requires_filesystem = true;
        self
    }

    /// Declare peak memory
    #[must_use]
    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_mb = mb;
        self
    }

    /// Whether `role` may call this tool
    #[must_use]
    pub fn permits_role(&self, role: &str) -> bool {
        self.allowed_roles.is_empty()
            || self
                .allowed_roles
                .iter()
                .any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Access metadata exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Roles allowed to invoke the tool (empty means any role)
    pub allowed_roles: Vec<String>,
    /// Free-form tags
    pub tags: Vec<String>,
}

/// Resources a tool reports having used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU time in milliseconds
    pub cpu_ms: u64,
    /// Peak memory in megabytes
    pub memory_mb: u64,
}

/// Output of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Output data
    pub value: Value,
    /// Reported resource usage
    #[serde(default)]
    pub usage: ResourceUsage,
}

impl ToolOutput {
    /// Output with no reported usage
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            usage: ResourceUsage::default(),
        }
    }

    /// Attach reported usage
    #[must_use]
    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Trait for tool implementations
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with given input
    async fn execute(&self, input: Value) -> Result<ToolOutput>;

    /// Validate input before execution
    fn validate_input(&self, input: &Value) -> Result<()> {
        if !input.is_object() {
            return Err(Error::InvalidInput("input must be an object".to_string()));
        }
        Ok(())
    }
}

/// Registry for managing tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by id
    #[must_use]
    pub fn get(&self, tool_id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(tool_id).cloned()
    }

    /// Access metadata for a tool
    #[must_use]
    pub fn get_metadata(&self, tool_id: &str) -> Option<ToolMetadata> {
        self.tools.get(tool_id).map(|t| {
            let def = t.definition();
            ToolMetadata {
                allowed_roles: def.allowed_roles.clone(),
                tags: def.tags.clone(),
            }
        })
    }

    /// Registered tool ids, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool directly after checking the caller's role
    pub async fn invoke(&self, tool_id: &str, caller_role: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .get(tool_id)
            .ok_or_else(|| Error::NotFound(tool_id.to_string()))?;
        if !tool.definition().permits_role(caller_role) {
            return Err(Error::Violation {
                tool: tool_id.to_string(),
                policy: "registry".to_string(),
                reason: ViolationReason::RoleNotAllowed(caller_role.to_string()),
            });
        }
        tool.validate_input(&arguments)?;
        Ok(tool.execute(arguments).await?.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::EchoTool;

    #[test]
    fn test_metadata_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));

        let meta = registry.get_metadata("echo").unwrap();
        assert!(meta.allowed_roles.is_empty());
        assert!(meta.tags.contains(&"builtin".to_string()));
        assert!(registry.get_metadata("missing").is_none());
        assert_eq!(registry.list(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_permits_role_case_insensitive() {
        let def = ToolDefinition::new("t", "d").with_allowed_roles(["Attorney"]);
        assert!(def.permits_role("attorney"));
        assert!(!def.permits_role("client"));
        assert!(ToolDefinition::new("open", "d").permits_role("guest"));
    }

    #[tokio::test]
    async fn test_invoke_checks_role() {
        struct Restricted(ToolDefinition);

        #[async_trait::async_trait]
        impl Tool for Restricted {
            fn definition(&self) -> &ToolDefinition {
                &self.0
            }
            async fn execute(&self, _input: Value) -> Result<ToolOutput> {
                Ok(ToolOutput::new(Value::Bool(true)))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Restricted(
            ToolDefinition::new("secret", "d").with_allowed_roles(["admin"]),
        )));

        let denied = registry
            .invoke("secret", "client", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(denied.is_violation());

        let ok = registry
            .invoke("secret", "admin", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(ok, Value::Bool(true));
    }
}
