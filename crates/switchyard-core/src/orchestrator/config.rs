//! Orchestrator configuration

use crate::roles::Role;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deadline for one command's dispatch, sub-commands included
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Sub-commands of one plan stage running at once
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,
    /// Plan nesting depth at which deep decisions are downgraded to graph
    #[serde(default = "default_max_plan_depth")]
    pub max_plan_depth: u32,
    /// Role given to issuers nobody knows
    #[serde(default = "default_role")]
    pub default_role: Role,
}

fn default_command_timeout_secs() -> u64 {
    120
}

fn default_max_fanout() -> usize {
    4
}

fn default_max_plan_depth() -> u32 {
    2
}

fn default_role() -> Role {
    Role::Guest
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            max_fanout: default_max_fanout(),
            max_plan_depth: default_max_plan_depth(),
            default_role: default_role(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-command deadline
    #[must_use]
    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Set the fan-out bound
    #[must_use]
    pub fn with_max_fanout(mut self, fanout: usize) -> Self {
        self.max_fanout = fanout;
        self
    }

    /// Set the plan depth bound
    #[must_use]
    pub fn with_max_plan_depth(mut self, depth: u32) -> Self {
        self.max_plan_depth = depth;
        self
    }

    /// Set the default role
    #[must_use]
    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    /// Dispatch deadline
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
