//! Error types for switchyard-llm

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// LLM error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error (not retryable)
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit {
        /// Provider-supplied delay hint
        retry_after: Option<Duration>,
    },

    /// Transient upstream failure (5xx, overloaded, connection reset)
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Every provider in the priority list failed
    #[error("all providers exhausted: {}", summarize(.0))]
    Exhausted(Vec<ProviderFailure>),
}

impl Error {
    /// Classify the error for retry decisions and attempt records
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::RateLimit { .. } => FailureKind::RateLimited,
            Self::Transient(_) | Self::Network(_) => FailureKind::Transient,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::NotConfigured(_) => FailureKind::NotConfigured,
            Self::Api(_) | Self::InvalidResponse(_) | Self::Exhausted(_) => FailureKind::Fatal,
        }
    }

    /// Whether the router may retry the same provider after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.failure_kind(),
            FailureKind::RateLimited | FailureKind::Transient | FailureKind::Timeout
        )
    }
}

/// Coarse classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider rate limited the request
    RateLimited,
    /// Transient upstream or network failure
    Transient,
    /// Attempt exceeded its deadline
    Timeout,
    /// Provider is listed in the policy but not registered
    NotConfigured,
    /// Any other failure; falls through without retry
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::NotConfigured => "not_configured",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Final failure recorded for one provider in the priority list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider name
    pub provider: String,
    /// Number of attempts made against this provider
    pub attempts: u32,
    /// Classification of the last error
    pub kind: FailureKind,
    /// Human-readable reason
    pub reason: String,
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{} ({}: {})", f.provider, f.kind, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
