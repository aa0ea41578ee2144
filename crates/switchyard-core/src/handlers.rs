//! Agent handlers
//!
//! Graph- and fast-tier commands are dispatched to a named
//! [`AgentHandler`]. The built-ins cover the three generic paths: a direct
//! provider call, a sandboxed tool call, and a workflow run. Domain agents
//! register under their own names.

use crate::command::{Command, CommandType, Tier};
use crate::error::{Error, Result};
use crate::roles::Role;
use crate::router::{AGENT_ASSISTANT, AGENT_TOOL_RUNNER, AGENT_WORKFLOW_RUNNER};
use crate::workflow::{
    build_document_review, build_retrieval_answer, CheckpointStore, GraphCache, WorkflowDeps,
    WorkflowError, WorkflowKind, WorkflowState,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use switchyard_llm::{CompletionRequest, ProviderRouter, RetryConfig, RoutingPolicy};
use switchyard_tools::{SandboxPolicy, SandboxedExecutor};
use tracing::{debug, instrument, warn};

/// What a handler knows about the call besides the command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerContext {
    /// Issuer role
    pub role: Role,
    /// Tier the command was routed to
    pub tier: Tier,
}

/// A named command handler
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Execute the command
    async fn handle(&self, command: &Command, ctx: &HandlerContext) -> Result<Value>;
}

/// Handlers by name
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name
    pub fn register(&mut self, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Look up a handler
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Direct provider call
pub struct AssistantAgent {
    providers: Arc<ProviderRouter>,
    policy: RoutingPolicy,
}

impl AssistantAgent {
    /// Create the assistant
    #[must_use]
    pub fn new(providers: Arc<ProviderRouter>, policy: RoutingPolicy) -> Self {
        Self { providers, policy }
    }
}

#[async_trait]
impl AgentHandler for AssistantAgent {
    fn name(&self) -> &str {
        AGENT_ASSISTANT
    }

    #[instrument(skip(self, command, _ctx), fields(command_id = %command.id))]
    async fn handle(&self, command: &Command, _ctx: &HandlerContext) -> Result<Value> {
        let prompt = command
            .payload_str("query")
            .or_else(|| command.payload_str("prompt"))
            .ok_or_else(|| Error::Validation("assistant needs 'query' or 'prompt'".into()))?;

        let mut request = CompletionRequest::new(prompt);
        if let Some(system) = command.payload_str("system") {
            request = request.with_system(system);
        }
        if let Some(max_tokens) = command.payload.get("max_tokens").and_then(Value::as_u64) {
            request = request.with_max_tokens(u32::try_from(max_tokens).unwrap_or(u32::MAX));
        }

        let response = self.providers.invoke(&request, &self.policy).await?;
        let cost = response.total_cost();
        let budget_exceeded = !response.within_budget(self.policy.max_cost_usd);
        if budget_exceeded {
            warn!(
                cost_usd = cost,
                max_cost_usd = ?self.policy.max_cost_usd,
                provider = %response.provider,
                "Provider spend exceeded budget"
            );
        }

        Ok(json!({
            "text": response.text,
            "provider": response.provider,
            "model": response.model,
            "tokens_in": response.tokens_in,
            "tokens_out": response.tokens_out,
            "cost_usd": cost,
            "latency_ms": response.latency_ms,
            "attempts": response.attempts.len(),
            "budget_exceeded": budget_exceeded,
        }))
    }
}

/// Tool runner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Preset used when the payload names none
    #[serde(default = "default_policy_name")]
    pub default_policy: String,
    /// Presets each role may request beyond the default
    #[serde(default = "default_role_policies")]
    pub role_policies: BTreeMap<Role, Vec<String>>,
    /// Caller timeout when the payload sets none
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Retry budget for timeouts and transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_policy_name() -> String {
    "restricted".to_string()
}

fn default_role_policies() -> BTreeMap<Role, Vec<String>> {
    let presets = |names: &[&str]| names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (Role::Admin, presets(&["restricted", "standard", "trusted"])),
        (Role::Attorney, presets(&["restricted", "standard"])),
        (Role::Paralegal, presets(&["restricted"])),
    ])
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_policy: default_policy_name(),
            role_policies: default_role_policies(),
            default_timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Whether `role` may run tools under the preset `name`
    ///
    /// The default preset is open to every role.
    #[must_use]
    pub fn permits(&self, role: Role, name: &str) -> bool {
        name == self.default_policy
            || self
                .role_policies
                .get(&role)
                .is_some_and(|allowed| allowed.iter().any(|p| p == name))
    }

    /// Replace the presets a role may request
    #[must_use]
    pub fn with_role_policies<I, S>(mut self, role: Role, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_policies
            .insert(role, presets.into_iter().map(Into::into).collect());
        self
    }
}

/// Sandboxed tool call
pub struct ToolAgent {
    executor: Arc<SandboxedExecutor>,
    config: SandboxConfig,
}

impl ToolAgent {
    /// Create the tool runner
    #[must_use]
    pub fn new(executor: Arc<SandboxedExecutor>, config: SandboxConfig) -> Self {
        Self { executor, config }
    }

    fn policy(&self, command: &Command, role: Role) -> Result<SandboxPolicy> {
        let name = command
            .payload_str("policy")
            .unwrap_or(&self.config.default_policy);
        let policy = SandboxPolicy::preset(name)
            .ok_or_else(|| Error::Validation(format!("unknown sandbox policy: {name}")))?;
        if !self.config.permits(role, name) {
            warn!(role = %role, policy = %name, "Sandbox preset refused for role");
            return Err(Error::Security {
                role: role.to_string(),
                action: "tool:invoke".to_string(),
                reason: format!("sandbox policy '{name}' is not available to this role"),
            });
        }
        Ok(policy)
    }
}

#[async_trait]
impl AgentHandler for ToolAgent {
    fn name(&self) -> &str {
        AGENT_TOOL_RUNNER
    }

    #[instrument(skip(self, command, ctx), fields(command_id = %command.id, role = %ctx.role))]
    async fn handle(&self, command: &Command, ctx: &HandlerContext) -> Result<Value> {
        let tool_id = command
            .payload_str("tool_id")
            .ok_or_else(|| Error::Validation("tool runner needs 'tool_id'".into()))?;
        let arguments = command
            .payload
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let policy = self.policy(command, ctx.role)?;
        let timeout = Duration::from_secs(
            command
                .payload
                .get("timeout_secs")
                .and_then(Value::as_u64)
                .unwrap_or(self.config.default_timeout_secs),
        );

        let output = self
            .executor
            .run_with_retry(tool_id, arguments, &policy, timeout, Some(ctx.role.as_str()))
            .await?;

        Ok(json!({
            "tool_id": tool_id,
            "policy": policy.name,
            "output": output.value,
            "usage": output.usage,
        }))
    }
}

/// Workflow engine runner
pub struct WorkflowAgent {
    deps: WorkflowDeps,
    cache: GraphCache,
}

impl WorkflowAgent {
    /// Create the runner
    #[must_use]
    pub fn new(deps: WorkflowDeps) -> Self {
        Self {
            deps,
            cache: GraphCache::new(),
        }
    }

    /// Compiled graphs cached so far
    #[must_use]
    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    fn kind_for(command: &Command) -> Result<WorkflowKind> {
        if let Some(name) = command.payload_str("workflow") {
            return name.parse().map_err(Error::Validation);
        }
        match command.command_type {
            CommandType::Search | CommandType::Ask => Ok(WorkflowKind::RetrievalAnswer),
            CommandType::Validate => Ok(WorkflowKind::DocumentReview),
            other => Err(Error::Validation(format!(
                "no workflow for command type '{other}'; set payload.workflow"
            ))),
        }
    }

    fn initial_state(command: &Command, thread_id: String) -> WorkflowState {
        let mut state = WorkflowState::new(thread_id, command.issuer_id.clone());
        let input = match command.payload.get("input").and_then(Value::as_object) {
            Some(input) => input.clone(),
            None => command.payload.clone(),
        };
        for (key, value) in input {
            if !matches!(key.as_str(), "workflow" | "thread_id" | "input" | "steps") {
                state.set(key, value);
            }
        }
        state
    }
}

#[async_trait]
impl AgentHandler for WorkflowAgent {
    fn name(&self) -> &str {
        AGENT_WORKFLOW_RUNNER
    }

    #[instrument(skip(self, command, _ctx), fields(command_id = %command.id))]
    async fn handle(&self, command: &Command, _ctx: &HandlerContext) -> Result<Value> {
        let kind = Self::kind_for(command)?;
        let graph = self.cache.get_or_compile(kind, || match kind {
            WorkflowKind::RetrievalAnswer => build_retrieval_answer(&self.deps),
            WorkflowKind::DocumentReview => build_document_review(&self.deps),
        })?;

        let thread_id = command
            .payload_str("thread_id")
            .map_or_else(|| command.thread_id(), str::to_string);
        let store: &dyn CheckpointStore = self.deps.memory.as_ref();

        let state = if command.effective_action() == "resume" {
            debug!(workflow = %kind, thread_id = %thread_id, "Resuming workflow");
            graph.resume(&thread_id, store).await?
        } else {
            graph
                .invoke_with_checkpoints(Self::initial_state(command, thread_id.clone()), store)
                .await?
        };

        if let Some(error) = state.error {
            return Err(WorkflowError::Step(error).into());
        }
        Ok(json!({
            "workflow": kind,
            "thread_id": state.thread_id,
            "version": state.version,
            "iterations": state.iterations,
            "fields": state.fields,
            "results": state.results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditWriter, InMemoryAuditSink};
    use crate::memory::{InMemoryStore, MemoryRecord};
    use crate::workflow::WorkflowConfig;
    use switchyard_llm::{EchoProvider, MockOutcome, MockProvider, Pricing};
    use switchyard_tools::{register_builtins, ToolRegistry};

    fn ctx(role: Role) -> HandlerContext {
        HandlerContext {
            role,
            tier: Tier::Fast,
        }
    }

    fn echo_router() -> Arc<ProviderRouter> {
        let mut providers = ProviderRouter::new();
        providers.register(Arc::new(EchoProvider::default()));
        Arc::new(providers)
    }

    #[tokio::test]
    async fn test_assistant_flags_budget() {
        let provider = MockProvider::new("paid")
            .with_outcomes([MockOutcome::Reply("a long answer".into())])
            .with_pricing(Pricing::new(1_000_000.0, 1_000_000.0));
        let mut providers = ProviderRouter::new();
        providers.register(Arc::new(provider));
        let agent = AssistantAgent::new(
            Arc::new(providers),
            RoutingPolicy::new(["paid"]).with_max_cost(0.01),
        );

        let cmd = Command::new("u", CommandType::Ask, "query").with_field("query", "hi");
        let result = agent.handle(&cmd, &ctx(Role::Guest)).await.unwrap();
        assert_eq!(result["budget_exceeded"], true);
        assert_eq!(result["provider"], "paid");
    }

    #[tokio::test]
    async fn test_assistant_requires_prompt() {
        let agent = AssistantAgent::new(echo_router(), RoutingPolicy::new(["echo"]));
        let cmd = Command::new("u", CommandType::Generate, "draft");
        assert!(matches!(
            agent.handle(&cmd, &ctx(Role::Attorney)).await,
            Err(Error::Validation(_))
        ));
    }

    fn tool_agent() -> ToolAgent {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry);
        let retry = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        let executor = SandboxedExecutor::new(Arc::new(registry)).with_retry(retry);
        ToolAgent::new(Arc::new(executor), SandboxConfig::default())
    }

    #[tokio::test]
    async fn test_tool_agent_runs_builtin() {
        let cmd = Command::new("u", CommandType::Tool, "invoke")
            .with_field("tool_id", "word_count")
            .with_field("arguments", json!({"text": "one two three"}));
        let result = tool_agent().handle(&cmd, &ctx(Role::Attorney)).await.unwrap();
        assert_eq!(result["policy"], "restricted");
        assert_eq!(result["tool_id"], "word_count");
    }

    #[tokio::test]
    async fn test_tool_agent_refuses_preset_above_role() {
        let trusted = Command::new("u", CommandType::Tool, "invoke")
            .with_field("tool_id", "echo")
            .with_field("arguments", json!({"message": "hi"}))
            .with_field("policy", "trusted");

        let err = tool_agent().handle(&trusted, &ctx(Role::Paralegal)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Security);
        assert!(tool_agent().handle(&trusted, &ctx(Role::Attorney)).await.is_err());

        let result = tool_agent().handle(&trusted, &ctx(Role::Admin)).await.unwrap();
        assert_eq!(result["policy"], "trusted");

        let standard = Command::new("u", CommandType::Tool, "invoke")
            .with_field("tool_id", "echo")
            .with_field("arguments", json!({"message": "hi"}))
            .with_field("policy", "standard");
        let result = tool_agent().handle(&standard, &ctx(Role::Attorney)).await.unwrap();
        assert_eq!(result["policy"], "standard");
    }

    #[test]
    fn test_default_preset_open_to_every_role() {
        let config = SandboxConfig::default();
        for role in Role::ALL {
            assert!(config.permits(role, "restricted"));
        }
        assert!(!config.permits(Role::Client, "standard"));

        let widened = config.with_role_policies(Role::Paralegal, ["restricted", "trusted"]);
        assert!(widened.permits(Role::Paralegal, "trusted"));
    }

    #[tokio::test]
    async fn test_tool_agent_surfaces_violation() {
        let cmd = Command::new("u", CommandType::Tool, "invoke").with_field("tool_id", "shell");
        let err = tool_agent().handle(&cmd, &ctx(Role::Attorney)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Command);

        let unknown_policy = Command::new("u", CommandType::Tool, "invoke")
            .with_field("tool_id", "echo")
            .with_field("policy", "yolo");
        assert!(matches!(
            tool_agent().handle(&unknown_policy, &ctx(Role::Attorney)).await,
            Err(Error::Validation(_))
        ));
    }

    async fn workflow_agent() -> (WorkflowAgent, Arc<InMemoryStore>) {
        let memory = Arc::new(
            InMemoryStore::with_records(vec![MemoryRecord::new(
                "u",
                "Appeals must be filed within thirty days of judgment",
            )])
            .await,
        );
        let deps = WorkflowDeps {
            providers: echo_router(),
            policy: RoutingPolicy::new(["echo"]),
            memory: memory.clone(),
            audit: AuditWriter::new(Arc::new(InMemoryAuditSink::new())),
            config: WorkflowConfig::default(),
        };
        (WorkflowAgent::new(deps), memory)
    }

    #[tokio::test]
    async fn test_workflow_agent_picks_kind_and_caches() {
        let (agent, memory) = workflow_agent().await;
        let search = Command::new("u", CommandType::Search, "documents")
            .with_field("query", "appeals judgment deadline")
            .with_context("thread_id", "thread-1");

        let result = agent.handle(&search, &ctx(Role::Attorney)).await.unwrap();
        assert_eq!(result["workflow"], "retrieval_answer");
        assert_eq!(result["thread_id"], "thread-1");
        assert_eq!(result["fields"]["grade"], "grounded");
        assert_eq!(memory.checkpoint_history("thread-1").await.unwrap().len(), 5);

        agent.handle(&search, &ctx(Role::Attorney)).await.unwrap();
        assert_eq!(agent.cache().len(), 1);

        let review = Command::new("u", CommandType::Validate, "document")
            .with_field("document", "Either party may seek arbitration.");
        let result = agent.handle(&review, &ctx(Role::Attorney)).await.unwrap();
        assert_eq!(result["workflow"], "document_review");
        assert_eq!(result["fields"]["risk_level"], "medium");
        assert_eq!(agent.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_workflow_agent_reports_failure_and_resumes() {
        let (agent, _memory) = workflow_agent().await;
        let bad = Command::new("u", CommandType::Workflow, "run").with_field("workflow", "document_review");
        let err = agent.handle(&bad, &ctx(Role::Attorney)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Workflow);

        let run = Command::new("u", CommandType::Workflow, "run")
            .with_field("workflow", "document_review")
            .with_field("thread_id", "t-resume")
            .with_field("input", json!({"document": "plain text"}));
        let first = agent.handle(&run, &ctx(Role::Attorney)).await.unwrap();

        let resume = Command::new("u", CommandType::Workflow, "resume")
            .with_field("workflow", "document_review")
            .with_field("thread_id", "t-resume");
        let resumed = agent.handle(&resume, &ctx(Role::Attorney)).await.unwrap();
        assert_eq!(resumed["version"], first["version"]);
    }

    #[test]
    fn test_unknown_workflow_name() {
        let cmd = Command::new("u", CommandType::Workflow, "run").with_field("workflow", "tax_return");
        assert!(matches!(WorkflowAgent::kind_for(&cmd), Err(Error::Validation(_))));
        let case = Command::new("u", CommandType::Case, "read");
        assert!(WorkflowAgent::kind_for(&case).is_err());
    }
}
