//! Error types for switchyard-tools

use crate::registry::RiskLevel;
use std::fmt;
use thiserror::Error;

/// Why a tool invocation breached its sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationReason {
    /// Tool is not in the policy's allow-list
    ToolNotAllowed,
    /// Caller role may not invoke this tool
    RoleNotAllowed(String),
    /// Tool needs network access the policy forbids
    NetworkDenied,
    /// Tool needs filesystem access the policy forbids
    FilesystemDenied,
    /// Declared or observed memory above the policy limit
    MemoryLimit {
        /// Megabytes requested or used
        used_mb: u64,
        /// Policy limit in megabytes
        limit_mb: u64,
    },
    /// Tool risk level above what the policy accepts
    RiskTooHigh {
        /// Tool's declared risk
        risk: RiskLevel,
        /// Policy ceiling
        limit: RiskLevel,
    },
    /// CPU budget exhausted
    CpuLimit {
        /// Policy limit in seconds
        limit_secs: u64,
    },
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolNotAllowed => write!(f, "tool is not allowed by policy"),
            Self::RoleNotAllowed(role) => write!(f, "role '{role}' may not invoke this tool"),
            Self::NetworkDenied => write!(f, "network access denied"),
            Self::FilesystemDenied => write!(f, "filesystem access denied"),
            Self::MemoryLimit { used_mb, limit_mb } => {
                write!(f, "memory {used_mb}MB exceeds limit {limit_mb}MB")
            }
            Self::RiskTooHigh { risk, limit } => {
                write!(f, "{risk} risk tool exceeds policy limit {limit}")
            }
            Self::CpuLimit { limit_secs } => write!(f, "cpu budget of {limit_secs}s exhausted"),
        }
    }
}

/// Tool error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Sandbox policy breach (never retried)
    #[error("sandbox violation in '{tool}' under policy '{policy}': {reason}")]
    Violation {
        /// Tool id
        tool: String,
        /// Policy name
        policy: String,
        /// What was breached
        reason: ViolationReason,
    },

    /// Caller deadline elapsed
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Transient failure worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// Tool execution failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the executor's retry wrapper may try again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }

    /// Whether this is a sandbox policy breach
    #[must_use]
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
