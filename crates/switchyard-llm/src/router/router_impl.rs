//! Provider Router Implementation
//!
//! Walks `RoutingPolicy::provider_priority` in order. Each provider gets its
//! own retry budget; only when that budget is spent (or the error is not
//! retryable) does the router fall through to the next provider.

use super::policy::RoutingPolicy;
use super::provider::LlmProvider;
use crate::completion::{AttemptOutcome, AttemptRecord, CompletionRequest, ProviderResponse};
use crate::cost::CostTracker;
use crate::error::{Error, FailureKind, ProviderFailure, Result};
use crate::retry::RetryConfig;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Routes completions across registered providers with retry and fallback
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    tracker: Arc<CostTracker>,
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRouter {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(Arc::new(CostTracker::new()))
    }

    /// Create a router recording into a shared tracker
    #[must_use]
    pub fn with_tracker(tracker: Arc<CostTracker>) -> Self {
        Self {
            providers: HashMap::new(),
            tracker,
        }
    }

    /// Register a provider under its own name
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registered provider");
        self.providers.insert(name, provider);
    }

    /// Get a provider by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Shared cost tracker
    #[must_use]
    pub fn tracker(&self) -> Arc<CostTracker> {
        Arc::clone(&self.tracker)
    }

    /// Complete `request` using the first provider in `policy` that succeeds
    ///
    /// Fails with [`Error::Exhausted`] carrying one failure per provider in
    /// priority order when nothing succeeds.
    #[instrument(skip(self, request, policy), fields(providers = ?policy.provider_priority))]
    pub async fn invoke(
        &self,
        request: &CompletionRequest,
        policy: &RoutingPolicy,
    ) -> Result<ProviderResponse> {
        let backoff = policy.backoff();
        let mut attempts = Vec::new();
        let mut failures = Vec::new();

        for name in &policy.provider_priority {
            let Some(provider) = self.providers.get(name) else {
                warn!(provider = %name, "Provider in priority list is not registered");
                failures.push(ProviderFailure {
                    provider: name.clone(),
                    attempts: 0,
                    kind: FailureKind::NotConfigured,
                    reason: "provider is not registered".to_string(),
                });
                continue;
            };

            match self
                .try_provider(provider.as_ref(), request, policy, &backoff, &mut attempts)
                .await
            {
                Ok(mut response) => {
                    response.attempts = attempts;
                    info!(
                        provider = %response.provider,
                        attempts = response.attempts.len(),
                        total_cost = response.total_cost(),
                        "Provider invocation succeeded"
                    );
                    return Ok(response);
                }
                Err(failure) => {
                    warn!(
                        provider = %failure.provider,
                        kind = %failure.kind,
                        reason = %failure.reason,
                        "Falling through to next provider"
                    );
                    failures.push(failure);
                }
            }
        }

        Err(Error::Exhausted(failures))
    }

    async fn try_provider(
        &self,
        provider: &dyn LlmProvider,
        request: &CompletionRequest,
        policy: &RoutingPolicy,
        backoff: &RetryConfig,
        attempts: &mut Vec<AttemptRecord>,
    ) -> std::result::Result<ProviderResponse, ProviderFailure> {
        let name = provider.name().to_string();
        let mut attempt = 0u32;
        let mut retries = 0u32;
        let mut timed_out = false;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result =
                match tokio::time::timeout(policy.attempt_timeout, provider.complete(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(policy.attempt_timeout.as_millis() as u64)),
                };
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(completion) => {
                    let cost = provider
                        .pricing()
                        .calculate_cost(completion.tokens_in, completion.tokens_out);
                    self.record(
                        attempts,
                        AttemptRecord {
                            provider: name.clone(),
                            attempt,
                            outcome: AttemptOutcome::Success,
                            latency_ms,
                            tokens_in: completion.tokens_in,
                            tokens_out: completion.tokens_out,
                            cost_usd: cost,
                            at: Utc::now(),
                        },
                    );

                    let mut metadata = Map::new();
                    metadata.insert("attempt".to_string(), Value::from(attempt));
                    metadata.insert("retries".to_string(), Value::from(retries));
                    return Ok(ProviderResponse {
                        text: completion.text,
                        provider: name,
                        model: completion.model,
                        tokens_in: completion.tokens_in,
                        tokens_out: completion.tokens_out,
                        cost,
                        latency_ms,
                        metadata,
                        attempts: Vec::new(),
                    });
                }
                Err(e) => {
                    let kind = e.failure_kind();
                    self.record(
                        attempts,
                        AttemptRecord {
                            provider: name.clone(),
                            attempt,
                            outcome: AttemptOutcome::Failure(kind),
                            latency_ms,
                            tokens_in: 0,
                            tokens_out: 0,
                            cost_usd: 0.0,
                            at: Utc::now(),
                        },
                    );

                    let may_retry = match kind {
                        FailureKind::RateLimited | FailureKind::Transient => {
                            retries < policy.max_retries
                        }
                        FailureKind::Timeout => !timed_out && retries < policy.max_retries,
                        FailureKind::NotConfigured | FailureKind::Fatal => false,
                    };
                    if !may_retry {
                        return Err(ProviderFailure {
                            provider: name,
                            attempts: attempt,
                            kind,
                            reason: e.to_string(),
                        });
                    }

                    retries += 1;
                    if kind == FailureKind::Timeout {
                        timed_out = true;
                    }
                    let delay = retry_delay(&e, backoff, retries);
                    warn!(
                        provider = %name,
                        attempt = attempt,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn record(&self, attempts: &mut Vec<AttemptRecord>, record: AttemptRecord) {
        self.tracker.record(record.clone());
        attempts.push(record);
    }
}

fn retry_delay(error: &Error, backoff: &RetryConfig, retry: u32) -> Duration {
    match error {
        Error::RateLimit {
            retry_after: Some(hint),
        } => (*hint).min(backoff.max_delay),
        _ => backoff.delay_for(retry),
    }
}
