//! Mock LLM Providers for testing and offline runs
//!
//! `MockProvider` replays a script of outcomes; `EchoProvider` answers every
//! prompt with the prompt itself.

use super::provider::{LlmProvider, Pricing};
use crate::completion::{Completion, CompletionRequest};
use crate::error::{Error, Result};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted outcome for [`MockProvider`]
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with this text
    Reply(String),
    /// Fail with a rate limit
    RateLimited,
    /// Fail with a transient error
    Transient,
    /// Fail with a non-retryable API error
    Fatal,
    /// Never answer (the router's attempt timeout fires)
    Hang,
}

/// A provider that replays queued outcomes, then replies with a default text
pub struct MockProvider {
    name: String,
    outcomes: Arc<Mutex<VecDeque<MockOutcome>>>,
    calls: AtomicU32,
    default_reply: String,
    pricing: Pricing,
}

impl MockProvider {
    /// Create a mock provider with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicU32::new(0),
            default_reply: "mock response".to_string(),
            pricing: Pricing::default(),
        }
    }

    /// Queue outcomes in order
    #[must_use]
    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(outcomes);
        self
    }

    /// Reply used once the script is exhausted
    #[must_use]
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Pricing applied to successful replies
    #[must_use]
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Queue one more outcome
    pub fn push(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Number of times `complete` was called
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count().min(u32::MAX as usize) as u32
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn pricing(&self) -> Pricing {
        self.pricing
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let text = match next {
            None => self.default_reply.clone(),
            Some(MockOutcome::Reply(text)) => text,
            Some(MockOutcome::RateLimited) => return Err(Error::RateLimit { retry_after: None }),
            Some(MockOutcome::Transient) => {
                return Err(Error::Transient("mock upstream overloaded".to_string()))
            }
            Some(MockOutcome::Fatal) => return Err(Error::Api("mock rejected request".to_string())),
            Some(MockOutcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(Error::Timeout(3_600_000));
            }
        };

        Ok(Completion {
            tokens_in: word_count(&request.prompt),
            tokens_out: word_count(&text),
            latency_ms: 0,
            model: request.model.unwrap_or_else(|| "mock-model".to_string()),
            text,
        })
    }
}

/// Offline provider that echoes the prompt back
pub struct EchoProvider {
    name: String,
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new("echo")
    }
}

impl EchoProvider {
    /// Create an echo provider with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait::async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let tokens = word_count(&request.prompt);
        Ok(Completion {
            text: request.prompt,
            tokens_in: tokens,
            tokens_out: tokens,
            latency_ms: 0,
            model: "echo".to_string(),
        })
    }
}
