//! LLM Provider trait definition
//!
//! This module defines the core trait that all LLM providers must implement.

use crate::completion::{Completion, CompletionRequest};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Per-million-token pricing used to cost each attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Cost per 1M input tokens (USD)
    #[serde(default)]
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens (USD)
    #[serde(default)]
    pub output_cost_per_million: f64,
}

impl Pricing {
    /// Create pricing from per-million rates
    #[must_use]
    pub fn new(input_cost_per_million: f64, output_cost_per_million: f64) -> Self {
        Self {
            input_cost_per_million,
            output_cost_per_million,
        }
    }

    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (f64::from(input_tokens) / 1_000_000.0) * self.input_cost_per_million;
        let output_cost = (f64::from(output_tokens) / 1_000_000.0) * self.output_cost_per_million;
        input_cost + output_cost
    }
}

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Pricing for cost accounting (free unless overridden)
    fn pricing(&self) -> Pricing {
        Pricing::default()
    }

    /// Complete a prompt
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
