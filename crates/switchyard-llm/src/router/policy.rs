//! Routing policy
//!
//! Describes which providers to try, in which order, and how hard to try
//! each one before falling through.

use crate::retry::{duration_ms, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy for one routed invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Candidate providers, highest priority first
    #[serde(default)]
    pub provider_priority: Vec<String>,
    /// Retries per provider on rate-limit or transient errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for a single attempt
    #[serde(default = "default_attempt_timeout", with = "duration_ms", rename = "attempt_timeout_ms")]
    pub attempt_timeout: Duration,
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff", with = "duration_ms", rename = "initial_backoff_ms")]
    pub initial_backoff: Duration,
    /// Upper bound on a single backoff delay
    #[serde(default = "default_max_backoff", with = "duration_ms", rename = "max_backoff_ms")]
    pub max_backoff: Duration,
    /// Add jitter to backoff delays
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    /// Spend ceiling enforced by the caller (USD)
    #[serde(default)]
    pub max_cost_usd: Option<f64>,
}

fn default_max_retries() -> u32 {
    2
}
fn default_attempt_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_initial_backoff() -> Duration {
    Duration::from_millis(250)
}
fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}
fn default_jitter() -> bool {
    true
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            provider_priority: Vec::new(),
            max_retries: default_max_retries(),
            attempt_timeout: default_attempt_timeout(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            jitter: default_jitter(),
            max_cost_usd: None,
        }
    }
}

impl RoutingPolicy {
    /// Create a policy over the given providers
    #[must_use]
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider_priority: providers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the per-provider retry budget
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the initial backoff delay
    #[must_use]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the spend ceiling
    #[must_use]
    pub fn with_max_cost(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = Some(max_cost_usd);
        self
    }

    /// Backoff schedule derived from this policy
    #[must_use]
    pub fn backoff(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.max_retries)
            .with_initial_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_jitter(self.jitter)
    }
}
