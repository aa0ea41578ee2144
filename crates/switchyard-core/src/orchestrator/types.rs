//! Response type

use crate::command::{Command, Tier};
use crate::error::{Error, ErrorKind, UserFriendlyError};
use crate::router::RoutingDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Normalized result of one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Command this answers
    pub command_id: Uuid,
    /// Whether the command succeeded
    pub success: bool,
    /// Handler output (also set for failed plans, listing step outcomes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Human-readable error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// What the caller can do about the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Handler that ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<String>,
    /// Wall time in milliseconds
    pub execution_time_ms: u64,
    /// Tier the command ran at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Routing decision, including reason, score and adjustments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_metadata: Option<RoutingDecision>,
    /// When the response was assembled
    pub timestamp: DateTime<Utc>,
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl Response {
    /// Response for a command that never reached routing
    #[must_use]
    pub fn rejected(command: &Command, error: &Error, elapsed: Duration) -> Self {
        Self {
            command_id: command.id,
            success: false,
            result: None,
            error: Some(error.user_message()),
            error_kind: Some(error.kind()),
            suggestion: error.suggestion(),
            agent_used: None,
            execution_time_ms: millis(elapsed),
            tier: None,
            routing_metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Response for a routed command
    #[must_use]
    pub fn routed(
        command: &Command,
        decision: &RoutingDecision,
        result: Option<Value>,
        error: Option<&Error>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command_id: command.id,
            success: error.is_none(),
            result,
            error: error.map(UserFriendlyError::user_message),
            error_kind: error.map(Error::kind),
            suggestion: error.and_then(UserFriendlyError::suggestion),
            agent_used: Some(decision.chosen_agent.clone()),
            execution_time_ms: millis(elapsed),
            tier: Some(decision.tier),
            routing_metadata: Some(decision.clone()),
            timestamp: Utc::now(),
        }
    }
}
