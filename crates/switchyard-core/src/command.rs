//! Command model
//!
//! A [`Command`] is the unit of work entering the orchestrator. It is
//! immutable once dispatched; the builder methods exist for callers and
//! the planner, which derives new sub-commands instead of mutating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default priority for commands that do not set one
pub const DEFAULT_PRIORITY: u8 = 5;

/// Context key carrying the workflow/audit thread id
pub const CONTEXT_THREAD_ID: &str = "thread_id";
/// Context key set on planner sub-commands
pub const CONTEXT_PARENT_COMMAND: &str = "parent_command_id";
/// Context key set on planner sub-commands
pub const CONTEXT_PLAN_STEP: &str = "plan_step";
/// Context key set on planner sub-commands
pub const CONTEXT_PLAN_DEPTH: &str = "plan_depth";

/// Closed set of command types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Free-form question
    Ask,
    /// Retrieval over documents or cases
    Search,
    /// Direct tool invocation
    Tool,
    /// Case management
    Case,
    /// Document generation
    Generate,
    /// Document validation
    Validate,
    /// Explicit workflow run
    Workflow,
    /// Administrative operation
    Admin,
    /// High-value filing work
    HighValue,
}

impl CommandType {
    /// Every command type
    pub const ALL: [CommandType; 9] = [
        Self::Ask,
        Self::Search,
        Self::Tool,
        Self::Case,
        Self::Generate,
        Self::Validate,
        Self::Workflow,
        Self::Admin,
        Self::HighValue,
    ];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Search => "search",
            Self::Tool => "tool",
            Self::Case => "case",
            Self::Generate => "generate",
            Self::Validate => "validate",
            Self::Workflow => "workflow",
            Self::Admin => "admin",
            Self::HighValue => "high_value",
        }
    }

    /// Action assumed when a command leaves `action` empty
    #[must_use]
    pub fn default_action(&self) -> &'static str {
        match self {
            Self::Ask => "query",
            Self::Search => "documents",
            Self::Tool => "invoke",
            Self::Case => "read",
            Self::Generate => "draft",
            Self::Validate => "document",
            Self::Workflow => "run",
            Self::Admin => "audit_query",
            Self::HighValue => "full_petition",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown command type: {s}"))
    }
}

/// Execution depth assigned to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Direct handler call
    Fast,
    /// Handler backed by a workflow graph
    Graph,
    /// Planner decomposition into sub-commands
    Deep,
}

impl Tier {
    /// Lower bound (inclusive) of the graph tier
    pub const GRAPH_THRESHOLD: f64 = 0.40;
    /// Lower bound (inclusive) of the deep tier
    pub const DEEP_THRESHOLD: f64 = 0.75;

    /// Tier for a routing score
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= Self::DEEP_THRESHOLD {
            Self::Deep
        } else if score >= Self::GRAPH_THRESHOLD {
            Self::Graph
        } else {
            Self::Fast
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Graph => "graph",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "graph" => Ok(Self::Graph),
            "deep" => Ok(Self::Deep),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Inbound unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command id
    #[serde(default = "Uuid::new_v4", alias = "command_id")]
    pub id: Uuid,
    /// Who issued the command
    pub issuer_id: String,
    /// Command type
    #[serde(alias = "type")]
    pub command_type: CommandType,
    /// Action within the type (empty means the type's default action)
    #[serde(default)]
    pub action: String,
    /// Operation payload
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Caller context (thread id, MFA flag, tags, plan trace)
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Explicit handler override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_agent: Option<String>,
    /// Explicit tier override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_tier: Option<Tier>,
    /// Whether the tier router should score this command
    #[serde(default = "default_auto_route")]
    pub auto_route: bool,
    /// 1 (most urgent) to 10
    #[serde(default = "default_priority", deserialize_with = "deserialize_priority")]
    pub priority: u8,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_auto_route() -> bool {
    true
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn clamp_priority(priority: i64) -> u8 {
    priority.clamp(1, 10) as u8
}

fn deserialize_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(clamp_priority(i64::deserialize(deserializer)?))
}

impl Command {
    /// Create a command
    #[must_use]
    pub fn new(
        issuer_id: impl Into<String>,
        command_type: CommandType,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            issuer_id: issuer_id.into(),
            command_type,
            action: action.into(),
            payload: Map::new(),
            context: Map::new(),
            requested_agent: None,
            requested_tier: None,
            auto_route: true,
            priority: DEFAULT_PRIORITY,
            timestamp: Utc::now(),
        }
    }

    /// Replace the payload
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Set one payload field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Set one context field
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Set priority (clamped to 1..=10)
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = clamp_priority(priority);
        self
    }

    /// Request a specific handler
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.requested_agent = Some(agent.into());
        self
    }

    /// Request a specific tier
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.requested_tier = Some(tier);
        self
    }

    /// Disable tier scoring
    #[must_use]
    pub fn without_auto_route(mut self) -> Self {
        self.auto_route = false;
        self
    }

    /// Action, falling back to the type's default
    #[must_use]
    pub fn effective_action(&self) -> &str {
        let action = self.action.trim();
        if action.is_empty() {
            self.command_type.default_action()
        } else {
            action
        }
    }

    /// Whether the command carries an explicit agent or tier override
    #[must_use]
    pub fn has_override(&self) -> bool {
        self.requested_agent.is_some() || self.requested_tier.is_some()
    }

    /// Boolean payload flag (absent or non-boolean reads as false)
    #[must_use]
    pub fn payload_flag(&self, key: &str) -> bool {
        self.payload.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// String payload field
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Boolean context flag (absent or non-boolean reads as false)
    #[must_use]
    pub fn context_flag(&self, key: &str) -> bool {
        self.context.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Tags carried in `context.tags`
    #[must_use]
    pub fn context_tags(&self) -> Vec<String> {
        self.context
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(|t| t.to_ascii_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Thread id for audit and checkpoints (context value or the command id)
    #[must_use]
    pub fn thread_id(&self) -> String {
        self.context
            .get(CONTEXT_THREAD_ID)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Planner nesting depth (0 for top-level commands)
    #[must_use]
    pub fn plan_depth(&self) -> u32 {
        self.context
            .get(CONTEXT_PLAN_DEPTH)
            .and_then(Value::as_u64)
            .map_or(0, |d| d.min(u64::from(u32::MAX)) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_inbound_shape() {
        let cmd: Command = serde_json::from_value(json!({
            "command_id": "6f1c2d3e-0000-4000-8000-000000000001",
            "issuer_id": "u-1",
            "type": "high_value",
            "action": "full_petition",
            "payload": {"documents": ["d1"]},
            "priority": 42
        }))
        .unwrap();

        assert_eq!(cmd.command_type, CommandType::HighValue);
        assert_eq!(cmd.priority, 10);
        assert!(cmd.auto_route);
        assert_eq!(cmd.id.to_string(), "6f1c2d3e-0000-4000-8000-000000000001");
    }

    #[test]
    fn test_priority_clamped() {
        let cmd = Command::new("u", CommandType::Ask, "").with_priority(0);
        assert_eq!(cmd.priority, 1);
    }

    #[test]
    fn test_tier_boundaries_inclusive() {
        assert_eq!(Tier::from_score(0.3999), Tier::Fast);
        assert_eq!(Tier::from_score(0.40), Tier::Graph);
        assert_eq!(Tier::from_score(0.7499), Tier::Graph);
        assert_eq!(Tier::from_score(0.75), Tier::Deep);
        assert_eq!("DEEP".parse::<Tier>().unwrap(), Tier::Deep);
        assert!("medium".parse::<Tier>().is_err());
    }

    #[test]
    fn test_context_helpers() {
        let cmd = Command::new("u", CommandType::Case, "")
            .with_context("tags", json!(["Privileged", 3]))
            .with_context(CONTEXT_THREAD_ID, "t-9")
            .with_context(CONTEXT_PLAN_DEPTH, 2);

        assert_eq!(cmd.context_tags(), vec!["privileged".to_string()]);
        assert_eq!(cmd.thread_id(), "t-9");
        assert_eq!(cmd.plan_depth(), 2);
        assert_eq!(cmd.effective_action(), "read");
    }

    #[test]
    fn test_command_type_round_trip_names() {
        for t in CommandType::ALL {
            assert_eq!(t.as_str().parse::<CommandType>().unwrap(), t);
        }
    }
}
