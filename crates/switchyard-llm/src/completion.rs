//! Completion types
//!
//! Request/response shapes shared by every provider and the router.

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Completion request handed to a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// User prompt
    pub prompt: String,
    /// Optional system instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Model override (provider default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request for a prompt
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Raw completion returned by a single provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Prompt tokens
    pub tokens_in: u32,
    /// Completion tokens
    pub tokens_out: u32,
    /// Latency reported by the provider (ms)
    pub latency_ms: u64,
    /// Model that served the request
    pub model: String,
}

/// Outcome of one attempt against one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Attempt returned a completion
    Success,
    /// Attempt failed
    Failure(FailureKind),
}

/// Cost/latency record for a single attempt, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Provider name
    pub provider: String,
    /// 1-based attempt number against this provider
    pub attempt: u32,
    /// What happened
    pub outcome: AttemptOutcome,
    /// Wall-clock latency (ms)
    pub latency_ms: u64,
    /// Prompt tokens billed
    pub tokens_in: u32,
    /// Completion tokens billed
    pub tokens_out: u32,
    /// Estimated cost (USD)
    pub cost_usd: f64,
    /// When the attempt finished
    pub at: DateTime<Utc>,
}

/// Normalized response of a routed invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text
    pub text: String,
    /// Provider that produced the text
    pub provider: String,
    /// Model that produced the text
    pub model: String,
    /// Prompt tokens of the successful attempt
    pub tokens_in: u32,
    /// Completion tokens of the successful attempt
    pub tokens_out: u32,
    /// Cost of the successful attempt (USD)
    pub cost: f64,
    /// Latency of the successful attempt (ms)
    pub latency_ms: u64,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Every attempt made during the invocation, in order
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl ProviderResponse {
    /// Cost summed over every attempt of the invocation
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.attempts.iter().map(|a| a.cost_usd).sum()
    }

    /// Whether the invocation stayed within an optional budget
    #[must_use]
    pub fn within_budget(&self, max_cost_usd: Option<f64>) -> bool {
        max_cost_usd.map_or(true, |max| self.total_cost() <= max)
    }
}
