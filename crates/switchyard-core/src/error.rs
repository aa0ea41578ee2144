//! Error types for switchyard-core
//!
//! Every failure inside the pipeline maps onto one of these variants, and
//! each variant onto a serializable [`ErrorKind`] carried by the response.

use crate::workflow::WorkflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Permission gate refused the command
    #[error("permission denied for role '{role}' on '{action}': {reason}")]
    Security {
        /// Issuer role
        role: String,
        /// Permission action string
        action: String,
        /// Why it was refused
        reason: String,
    },

    /// Payload failed schema validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Handler failure
    #[error("command failed: {0}")]
    Command(String),

    /// Tool or sandbox error
    #[error("tool error: {0}")]
    Tool(#[from] switchyard_tools::Error),

    /// Provider routing error
    #[error("llm error: {0}")]
    Llm(#[from] switchyard_llm::Error),

    /// Workflow graph error
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Per-command deadline elapsed
    #[error("command timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error (serialization, invariants)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization: {e}"))
    }
}

/// Stable classification surfaced in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Permission denied
    Security,
    /// Bad payload shape
    Validation,
    /// Generic handler failure
    Command,
    /// Sandbox policy breach
    SandboxViolation,
    /// Provider rate limited
    ProviderRateLimited,
    /// Provider transient failure
    ProviderTransient,
    /// Provider timeout
    ProviderTimeout,
    /// Every provider failed
    RouterExhausted,
    /// Workflow step or graph failure
    Workflow,
    /// Per-command timeout
    Timeout,
    /// Misconfiguration
    Configuration,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Validation => "validation",
            Self::Command => "command",
            Self::SandboxViolation => "sandbox_violation",
            Self::ProviderRateLimited => "provider_rate_limited",
            Self::ProviderTransient => "provider_transient",
            Self::ProviderTimeout => "provider_timeout",
            Self::RouterExhausted => "router_exhausted",
            Self::Workflow => "workflow",
            Self::Timeout => "timeout",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use switchyard_llm::Error as Llm;
        use switchyard_tools::Error as Tool;

        match self {
            Self::Security { .. } => ErrorKind::Security,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Command(_) => ErrorKind::Command,
            Self::Tool(Tool::Violation { .. }) => ErrorKind::SandboxViolation,
            Self::Tool(Tool::Timeout(_)) => ErrorKind::Timeout,
            Self::Tool(Tool::InvalidInput(_)) => ErrorKind::Validation,
            Self::Tool(_) => ErrorKind::Command,
            Self::Llm(Llm::RateLimit { .. }) => ErrorKind::ProviderRateLimited,
            Self::Llm(Llm::Transient(_) | Llm::Network(_)) => ErrorKind::ProviderTransient,
            Self::Llm(Llm::Timeout(_)) => ErrorKind::ProviderTimeout,
            Self::Llm(Llm::Exhausted(_)) => ErrorKind::RouterExhausted,
            Self::Llm(_) => ErrorKind::Command,
            Self::Workflow(_) => ErrorKind::Workflow,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Security { role, action, .. } => {
                format!("Role '{role}' is not permitted to perform '{action}'.")
            }
            Error::Validation(msg) => format!("The request payload is invalid: {msg}"),
            Error::Command(msg) => format!("The command failed: {msg}"),
            Error::Tool(e) if e.is_violation() => format!("The tool call was blocked: {e}"),
            Error::Tool(e) => format!("The tool call failed: {e}"),
            Error::Llm(switchyard_llm::Error::Exhausted(failures)) => format!(
                "No language model was available ({} provider(s) tried).",
                failures.len()
            ),
            Error::Llm(e) => format!("The language model call failed: {e}"),
            Error::Workflow(e) => format!("The workflow failed: {e}"),
            Error::Timeout(ms) => format!("The command did not finish within {ms}ms."),
            Error::Configuration(msg) => format!("Configuration problem: {msg}"),
            Error::Internal(msg) => format!("Internal error: {msg}"),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self.kind() {
            ErrorKind::Security => {
                Some("Ask an administrator to grant the required permission.".to_string())
            }
            ErrorKind::Validation => {
                Some("Check the payload fields required for this action.".to_string())
            }
            ErrorKind::ProviderRateLimited | ErrorKind::RouterExhausted => {
                Some("Wait a moment and resubmit the command.".to_string())
            }
            ErrorKind::Timeout | ErrorKind::ProviderTimeout => {
                Some("Resubmit with a smaller request or a longer timeout.".to_string())
            }
            ErrorKind::Configuration => {
                Some("Check config/default.toml or SWITCHYARD_* environment variables.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
#[must_use]
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_llm::{FailureKind, ProviderFailure};

    #[test]
    fn test_kind_mapping() {
        let violation = Error::Tool(switchyard_tools::Error::Violation {
            tool: "t".into(),
            policy: "p".into(),
            reason: switchyard_tools::ViolationReason::ToolNotAllowed,
        });
        assert_eq!(violation.kind(), ErrorKind::SandboxViolation);

        let exhausted = Error::Llm(switchyard_llm::Error::Exhausted(vec![ProviderFailure {
            provider: "a".into(),
            attempts: 1,
            kind: FailureKind::Fatal,
            reason: "x".into(),
        }]));
        assert_eq!(exhausted.kind(), ErrorKind::RouterExhausted);
        assert_eq!(
            Error::Llm(switchyard_llm::Error::RateLimit { retry_after: None }).kind(),
            ErrorKind::ProviderRateLimited
        );
        assert_eq!(Error::Validation("x".into()).kind().as_str(), "validation");
    }

    #[test]
    fn test_cli_format_includes_suggestion() {
        let err = Error::Security {
            role: "client".into(),
            action: "case:create".into(),
            reason: "not in allowed set".into(),
        };
        let text = format_error_for_cli(&err);
        assert!(text.contains("case:create"));
        assert!(text.contains("administrator"));
    }
}
