//! Sandbox policy
//!
//! The resource/access envelope a tool executes under. Policies are
//! immutable per invocation; the executor only reads them.

use crate::registry::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allow-list entry matching every tool
pub const ANY_TOOL: &str = "*";

/// Resource and access limits for one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Policy name
    pub name: String,
    /// Tool ids that may run (`*` allows any)
    #[serde(default)]
    pub allowed_tools: BTreeSet<String>,
    /// Whether tools may use the network
    #[serde(default)]
    pub allow_network: bool,
    /// Whether tools may touch the filesystem
    #[serde(default)]
    pub allow_filesystem: bool,
    /// CPU budget in seconds
    #[serde(default = "default_max_cpu_seconds")]
    pub max_cpu_seconds: u64,
    /// Memory ceiling in megabytes
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    /// Highest tool risk level that may run
    #[serde(default)]
    pub max_risk: RiskLevel,
}

fn default_max_cpu_seconds() -> u64 {
    30
}

fn default_max_memory_mb() -> u64 {
    512
}

impl SandboxPolicy {
    /// Create an empty policy that allows nothing
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allowed_tools: BTreeSet::new(),
            allow_network: false,
            allow_filesystem: false,
            max_cpu_seconds: default_max_cpu_seconds(),
            max_memory_mb: default_max_memory_mb(),
            max_risk: RiskLevel::Low,
        }
    }

    /// No network, no filesystem, small budget, built-in tools only
    #[must_use]
    pub fn restricted() -> Self {
        Self::new("restricted")
            .allow_tools(["echo", "clock", "word_count"])
            .with_cpu_seconds(5)
            .with_memory_mb(128)
    }

    /// Any tool with network access, no filesystem
    #[must_use]
    pub fn standard() -> Self {
        Self::new("standard")
            .allow_tools([ANY_TOOL])
            .with_network(true)
            .with_max_risk(RiskLevel::Medium)
    }

    /// Any tool, network and filesystem, generous budget
    #[must_use]
    pub fn trusted() -> Self {
        Self::new("trusted")
            .allow_tools([ANY_TOOL])
            .with_network(true)
            .with_filesystem(true)
            .with_cpu_seconds(120)
            .with_memory_mb(2048)
            .with_max_risk(RiskLevel::High)
    }

    /// Look up a built-in preset by name
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "restricted" => Some(Self::restricted()),
            "standard" => Some(Self::standard()),
            "trusted" => Some(Self::trusted()),
            _ => None,
        }
    }

    /// Add tools to the allow-list
    #[must_use]
    pub fn allow_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Set network access
    #[must_use]
    pub fn with_network(mut self, allowed: bool) -> Self {
        self.allow_network = allowed;
        self
    }

    /// Set filesystem access
    #[must_use]
    pub fn with_filesystem(mut self, allowed: bool) -> Self {
        self.allow_filesystem = allowed;
        self
    }

    /// Set the CPU budget
    #[must_use]
    pub fn with_cpu_seconds(mut self, seconds: u64) -> Self {
        self.max_cpu_seconds = seconds;
        self
    }

    /// Set the memory ceiling
    #[must_use]
    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.max_memory_mb = mb;
        self
    }

    /// Set the highest tool risk level allowed
    #[must_use]
    pub fn with_max_risk(mut self, risk: RiskLevel) -> Self {
        self.max_risk = risk;
        self
    }

    /// Whether `tool_id` is on the allow-list
    #[must_use]
    pub fn allows_tool(&self, tool_id: &str) -> bool {
        self.allowed_tools.contains(ANY_TOOL) || self.allowed_tools.contains(tool_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let restricted = SandboxPolicy::restricted();
        assert!(restricted.allows_tool("echo"));
        assert!(!restricted.allows_tool("http_get"));
        assert!(!restricted.allow_network);

        let trusted = SandboxPolicy::preset("trusted").unwrap();
        assert!(trusted.allows_tool("anything"));
        assert!(trusted.allow_filesystem);
        assert_eq!(trusted.max_risk, RiskLevel::High);
        assert_eq!(SandboxPolicy::standard().max_risk, RiskLevel::Medium);

        assert!(SandboxPolicy::preset("unknown").is_none());
    }

    #[test]
    fn test_empty_policy_allows_nothing() {
        let policy = SandboxPolicy::new("locked");
        assert!(!policy.allows_tool("echo"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let policy: SandboxPolicy =
            serde_json::from_str(r#"{"name": "custom", "allowed_tools": ["echo"]}"#).unwrap();
        assert_eq!(policy.max_cpu_seconds, 30);
        assert_eq!(policy.max_memory_mb, 512);
        assert_eq!(policy.max_risk, RiskLevel::Low);
        assert!(policy.allows_tool("echo"));
    }
}
