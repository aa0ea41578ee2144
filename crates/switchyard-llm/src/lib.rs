//! Switchyard LLM - Provider abstraction and failover routing
//!
//! This crate provides the language-model side of Switchyard:
//! - Provider: the trait every model backend implements
//! - Router: ordered fallback across providers with per-provider retry
//! - Retry: exponential backoff with jitter, shared with the tool executor
//! - Cost: per-attempt cost and latency accounting
//! - Mock/Echo: scripted and offline providers for tests and local runs
//! - OpenAI-compatible: HTTP provider for any `/chat/completions` endpoint

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod cost;
pub mod error;
pub mod openai_compat;
pub mod retry;
pub mod router;

pub use completion::{AttemptOutcome, AttemptRecord, Completion, CompletionRequest, ProviderResponse};
pub use cost::{CostTracker, ProviderUsage};
pub use error::{Error, FailureKind, ProviderFailure, Result};
pub use openai_compat::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
pub use router::{
    EchoProvider, LlmProvider, MockOutcome, MockProvider, Pricing, ProviderRouter, RoutingPolicy,
};
