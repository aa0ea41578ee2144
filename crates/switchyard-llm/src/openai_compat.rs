//! OpenAI-compatible HTTP provider
//!
//! Talks to any endpoint exposing `POST {base_url}/chat/completions`.
//! HTTP failures are classified so the router can decide whether to retry:
//! 429 becomes a rate limit, 5xx and connection failures are transient,
//! request timeouts map to `Timeout`, anything else is a fatal API error.

use crate::completion::{Completion, CompletionRequest};
use crate::error::{Error, Result};
use crate::router::{LlmProvider, Pricing};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Configuration for an OpenAI-compatible endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiCompatibleConfig {
    /// Name the router knows this provider by
    pub name: String,
    /// API base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token (optional for local gateways)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model used when the request does not name one
    pub default_model: String,
    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pricing for cost accounting
    #[serde(default)]
    pub pricing: Pricing,
}

fn default_timeout_secs() -> u64 {
    60
}

impl std::fmt::Debug for OpenAiCompatibleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(mask_api_key))
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Mask API key for safe display
fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

impl OpenAiCompatibleConfig {
    /// Create a configuration
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            default_model: default_model.into(),
            timeout_secs: default_timeout_secs(),
            pricing: Pricing::default(),
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set pricing
    #[must_use]
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }
}

/// Provider for OpenAI-compatible chat completion APIs
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAiCompatibleProvider {
    /// Create a provider
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::NotConfigured(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Error {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Error::RateLimit { retry_after };
        }
        if status.is_server_error() {
            return Error::Transient(format!("HTTP {status}"));
        }
        let snippet: String = body.chars().take(200).collect();
        Error::Api(format!("HTTP {status}: {snippet}"))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn pricing(&self) -> Pricing {
        self.config.pricing
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(model = %model, "Sending chat completion request");

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let started = Instant::now();
        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.config.timeout_secs * 1000)
            } else if e.is_connect() {
                Error::Transient(format!("failed to connect to {}", self.config.base_url))
            } else {
                Error::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::classify_status(status, retry_after, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidResponse(format!("malformed completion body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::InvalidResponse("completion has no content".to_string()))?;
        let (tokens_in, tokens_out) = parsed
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));

        Ok(Completion {
            text: content,
            tokens_in,
            tokens_out,
            latency_ms: started.elapsed().as_millis() as u64,
            model: parsed.model,
        })
    }
}
