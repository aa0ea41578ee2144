//! Orchestrator tests

use super::config::OrchestratorConfig;
use super::core::Orchestrator;
use crate::audit::{AuditWriter, InMemoryAuditSink, COMMAND_COMPLETED, COMMAND_ERROR, COMMAND_STARTED};
use crate::command::{Command, CommandType, Tier, CONTEXT_PLAN_DEPTH};
use crate::error::{ErrorKind, Result};
use crate::handlers::{AgentHandler, AssistantAgent, HandlerContext, HandlerRegistry};
use crate::roles::Role;
use crate::router::{DecisionSource, AGENT_ASSISTANT, AGENT_CASE};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_llm::{EchoProvider, ProviderRouter, RoutingPolicy};

struct TimedAgent {
    name: String,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl TimedAgent {
    fn new(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AgentHandler for TimedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, command: &Command, ctx: &HandlerContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"agent": self.name, "action": command.effective_action(), "tier": ctx.tier}))
    }
}

fn build(
    extra: Vec<Arc<dyn AgentHandler>>,
    config: OrchestratorConfig,
) -> (Orchestrator, Arc<InMemoryAuditSink>) {
    let mut providers = ProviderRouter::new();
    providers.register(Arc::new(EchoProvider::default()));

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(AssistantAgent::new(
        Arc::new(providers),
        RoutingPolicy::new(["echo"]),
    )));
    for handler in extra {
        handlers.register(handler);
    }

    let sink = Arc::new(InMemoryAuditSink::new());
    let orchestrator = Orchestrator::new(handlers, AuditWriter::new(sink.clone()), config);
    (orchestrator, sink)
}

fn actions(sink: &InMemoryAuditSink, command: &Command) -> Vec<String> {
    sink.for_thread(&command.id.to_string())
        .into_iter()
        .map(|e| e.action)
        .collect()
}

#[test]
fn test_orchestrator_config() {
    let config = OrchestratorConfig::new()
        .with_max_fanout(8)
        .with_max_plan_depth(3)
        .with_default_role(Role::Client);
    assert_eq!(config.max_fanout, 8);
    assert_eq!(config.max_plan_depth, 3);
    assert_eq!(config.command_timeout(), Duration::from_secs(120));

    let parsed: OrchestratorConfig = serde_json::from_str(r#"{"max_fanout": 2}"#).unwrap();
    assert_eq!(parsed.default_role, Role::Guest);
    assert_eq!(parsed.max_fanout, 2);
}

#[tokio::test]
async fn test_simple_ask_runs_fast_tier() {
    let (orchestrator, sink) = build(Vec::new(), OrchestratorConfig::default());
    let cmd = Command::new("visitor", CommandType::Ask, "query")
        .with_field("query", "x")
        .with_priority(5);

    let response = orchestrator.handle(cmd.clone(), None).await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.tier, Some(Tier::Fast));
    assert_eq!(response.agent_used.as_deref(), Some(AGENT_ASSISTANT));
    let routing = response.routing_metadata.unwrap();
    assert!(!routing.requires_escalation);
    assert!((routing.score - 0.2).abs() < 1e-9);
    assert_eq!(response.result.unwrap()["text"], "x");

    assert_eq!(actions(&sink, &cmd), vec![COMMAND_STARTED, COMMAND_COMPLETED]);
}

#[tokio::test]
async fn test_denied_command_is_audited() {
    let (orchestrator, sink) = build(Vec::new(), OrchestratorConfig::default());
    orchestrator.roles().assign("carol", Role::Client);
    let cmd = Command::new("carol", CommandType::Case, "create").with_field("title", "Mine");

    let response = orchestrator.handle(cmd.clone(), None).await;
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::Security));
    assert!(response.tier.is_none());
    assert!(response.suggestion.is_some());

    let events = sink.for_thread(&cmd.id.to_string());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, COMMAND_ERROR);
    assert_eq!(events[0].payload["details"]["stage"], "permission");
}

#[tokio::test]
async fn test_validation_aborts_before_handler() {
    let case = TimedAgent::new(AGENT_CASE, Duration::ZERO);
    let (orchestrator, sink) = build(vec![case.clone()], OrchestratorConfig::default());
    let cmd = Command::new("alice", CommandType::Case, "create");

    let response = orchestrator.handle(cmd.clone(), Some(Role::Attorney)).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Validation));
    assert_eq!(case.calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.agent_used.as_deref(), Some(AGENT_CASE));
    assert_eq!(actions(&sink, &cmd), vec![COMMAND_STARTED, COMMAND_ERROR]);
}

#[tokio::test]
async fn test_unknown_agent_is_command_error() {
    let (orchestrator, _sink) = build(Vec::new(), OrchestratorConfig::default());
    let cmd = Command::new("alice", CommandType::Case, "read").with_field("case_id", "c-1");

    let response = orchestrator.handle(cmd, Some(Role::Attorney)).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Command));
    assert!(response.routing_metadata.is_some());
}

#[tokio::test]
async fn test_override_is_trusted() {
    let worker = TimedAgent::new("worker", Duration::ZERO);
    let (orchestrator, _sink) = build(vec![worker.clone()], OrchestratorConfig::default());
    let cmd = Command::new("alice", CommandType::Ask, "query")
        .with_field("query", "anything")
        .with_agent("worker")
        .with_tier(Tier::Graph);

    let response = orchestrator.handle(cmd, Some(Role::Attorney)).await;
    assert!(response.success);
    assert_eq!(response.tier, Some(Tier::Graph));
    assert_eq!(
        response.routing_metadata.unwrap().metadata.source,
        DecisionSource::Override
    );
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deep_plan_respects_fanout() {
    let worker = TimedAgent::new("worker", Duration::from_millis(30));
    let config = OrchestratorConfig::default().with_max_fanout(2);
    let (orchestrator, _sink) = build(vec![worker.clone()], config);

    let step = json!({"command_type": "ask", "action": "query", "payload": {"query": "q"},
        "parallel": true, "agent": "worker", "tier": "fast"});
    let cmd = Command::new("alice", CommandType::Ask, "query")
        .with_field("query", "fan out")
        .with_field("steps", json!([step, step, step, step, step, step]))
        .with_tier(Tier::Deep);

    let response = orchestrator.handle(cmd, Some(Role::Attorney)).await;
    assert!(response.success, "{:?}", response.error);
    let result = response.result.unwrap();
    assert_eq!(result["stages"], 1);
    assert_eq!(result["succeeded"], 6);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 6);
    assert!(worker.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_failed_stage_skips_the_rest() {
    let worker = TimedAgent::new("worker", Duration::ZERO);
    let (orchestrator, _sink) = build(vec![worker.clone()], OrchestratorConfig::default());

    let cmd = Command::new("alice", CommandType::Ask, "query")
        .with_field("query", "plan")
        .with_field(
            "steps",
            json!([
                {"command_type": "case", "action": "create", "agent": "worker"},
                {"command_type": "ask", "action": "query", "payload": {"query": "q"}, "agent": "worker"}
            ]),
        )
        .with_tier(Tier::Deep);

    let response = orchestrator.handle(cmd, Some(Role::Attorney)).await;
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::Command));
    let result = response.result.unwrap();
    assert_eq!(result["failed"], 1);
    assert_eq!(result["skipped"], 1);
    assert_eq!(result["steps"][0]["response"]["error_kind"], "validation");
    assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plan_depth_downgrades_deep() {
    let (orchestrator, _sink) = build(Vec::new(), OrchestratorConfig::default());
    let cmd = Command::new("alice", CommandType::HighValue, "full_petition")
        .with_field("documents", json!(["d1", "d2"]))
        .with_context(CONTEXT_PLAN_DEPTH, 2);

    let decision = orchestrator.route(&cmd).await;
    assert_eq!(decision.tier, Tier::Graph);
    assert_eq!(decision.metadata.downgraded_from, Some(Tier::Deep));
    assert!(!decision.requires_escalation);

    let shallow = cmd.with_context(CONTEXT_PLAN_DEPTH, 1);
    assert_eq!(orchestrator.route(&shallow).await.tier, Tier::Deep);
}

#[tokio::test]
async fn test_deadline_yields_timeout_response() {
    let slow = TimedAgent::new("slow", Duration::from_secs(30));
    let config = OrchestratorConfig::default().with_command_timeout_secs(1);
    let (orchestrator, sink) = build(vec![slow], config);
    let cmd = Command::new("alice", CommandType::Ask, "query")
        .with_field("query", "wait")
        .with_agent("slow");

    let response = orchestrator.handle(cmd.clone(), Some(Role::Attorney)).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(actions(&sink, &cmd), vec![COMMAND_STARTED, COMMAND_ERROR]);
}

#[tokio::test]
async fn test_plan_deadline_audits_every_step_and_keeps_listing() {
    let quick = TimedAgent::new("quick", Duration::from_millis(600));
    let stalled = TimedAgent::new("stalled", Duration::from_secs(5));
    let config = OrchestratorConfig::default().with_command_timeout_secs(1);
    let (orchestrator, sink) = build(vec![quick.clone(), stalled.clone()], config);

    let cmd = Command::new("alice", CommandType::Ask, "query")
        .with_field("query", "plan")
        .with_field(
            "steps",
            json!([
                {"command_type": "ask", "action": "query", "payload": {"query": "a"}, "agent": "quick"},
                {"command_type": "ask", "action": "query", "payload": {"query": "b"}, "agent": "stalled"},
                {"command_type": "ask", "action": "query", "payload": {"query": "c"}, "agent": "quick"}
            ]),
        )
        .with_tier(Tier::Deep);

    let response = orchestrator.handle(cmd.clone(), Some(Role::Attorney)).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Timeout));
    assert!(response.execution_time_ms < 3_000);

    let result = response.result.unwrap();
    assert_eq!(result["steps"][0]["status"], "succeeded");
    assert_eq!(result["steps"][1]["status"], "failed");
    assert_eq!(result["steps"][1]["response"]["error_kind"], "timeout");
    assert_eq!(result["steps"][2]["status"], "skipped");
    assert_eq!(quick.calls.load(Ordering::SeqCst), 1);

    let events = sink.events();
    let started: Vec<String> = events
        .iter()
        .filter(|e| e.action == COMMAND_STARTED)
        .map(|e| e.payload["command_id"].to_string())
        .collect();
    assert_eq!(started.len(), 3);
    for id in &started {
        let terminal = events.iter().filter(|e| {
            e.payload["command_id"].to_string() == *id
                && (e.action == COMMAND_COMPLETED || e.action == COMMAND_ERROR)
        });
        assert_eq!(terminal.count(), 1, "command {id} has no single terminal event");
    }
    assert_eq!(actions(&sink, &cmd), vec![COMMAND_STARTED, COMMAND_ERROR]);
}
