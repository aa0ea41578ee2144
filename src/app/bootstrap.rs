//! Orchestrator construction from configuration

use super::config::AppConfig;
use super::providers::resolve_providers;
use anyhow::Result;
use std::sync::Arc;
use switchyard_core::{
    AssistantAgent, AuditSink, AuditSinkKind, AuditWriter, HandlerRegistry, InMemoryAuditSink,
    InMemoryStore, LlmPlanner, LlmRefiner, Orchestrator, PayloadPlanner, PermissionGate, Planner,
    SchemaRegistry, TierRouter, ToolAgent, TracingAuditSink, WorkflowAgent, WorkflowDeps,
};
use switchyard_tools::{register_builtins, SandboxedExecutor, ToolRegistry};
use tracing::info;

/// Build a fully wired orchestrator
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let providers = Arc::new(resolve_providers(&config.providers, &config.routing_policy)?);
    let policy = config.routing_policy.clone();

    let sink: Arc<dyn AuditSink> = match config.audit.sink {
        AuditSinkKind::Memory => Arc::new(InMemoryAuditSink::new()),
        AuditSinkKind::Tracing => Arc::new(TracingAuditSink),
    };
    let audit = AuditWriter::new(sink).with_retry(config.audit.retry.clone());

    let mut tools = ToolRegistry::new();
    register_builtins(&mut tools);
    info!(tools = ?tools.list(), "Registered tools");
    let executor = SandboxedExecutor::new(Arc::new(tools)).with_retry(config.sandbox.retry.clone());

    let deps = WorkflowDeps {
        providers: Arc::clone(&providers),
        policy: policy.clone(),
        memory: Arc::new(InMemoryStore::new()),
        audit: audit.clone(),
        config: config.workflow.clone(),
    };

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(AssistantAgent::new(Arc::clone(&providers), policy.clone())));
    handlers.register(Arc::new(ToolAgent::new(Arc::new(executor), config.sandbox.clone())));
    handlers.register(Arc::new(WorkflowAgent::new(deps)));
    info!(handlers = ?handlers.names(), "Registered handlers");

    let mut router = TierRouter::new(config.router.clone());
    if config.router.llm_refinement {
        router = router.with_refiner(Arc::new(LlmRefiner::new(Arc::clone(&providers), policy.clone())));
    }

    let planner: Arc<dyn Planner> = if config.planner.use_llm {
        Arc::new(LlmPlanner::new(Arc::clone(&providers), policy))
    } else {
        Arc::new(PayloadPlanner)
    };

    Ok(
        Orchestrator::new(handlers, audit, config.orchestrator.clone())
            .with_gate(PermissionGate::new(config.permissions.clone()))
            .with_router(router)
            .with_schemas(SchemaRegistry::new(&config.validation))
            .with_planner(planner),
    )
}
