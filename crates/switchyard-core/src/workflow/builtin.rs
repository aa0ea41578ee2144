//! Built-in workflows
//!
//! `retrieval_answer`:
//! retrieve → generate → grade → (rewrite → retrieve)* → persist → audit
//!
//! `document_review`:
//! (summarize ∥ risk_scan) → combine → audit

use super::graph::{CompiledGraph, FnStep, StateGraph, Step};
use super::parallel::ParallelStep;
use super::state::WorkflowState;
use super::WorkflowError;
use crate::audit::{AuditEvent, AuditWriter};
use crate::memory::{MemoryRecord, MemoryStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use switchyard_llm::{CompletionRequest, ProviderRouter, RoutingPolicy};
use tracing::debug;

const RISK_TERMS: &[&str] = &[
    "indemnif",
    "liquidated damages",
    "penalty",
    "termination",
    "waive",
    "arbitration",
    "non-compete",
    "exclusive",
];

/// Workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Rewrite/retrieve loops allowed in `retrieval_answer`
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Node executions allowed per run
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    /// Records retrieved per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_max_iterations() -> u32 {
    2
}

fn default_recursion_limit() -> usize {
    25
}

fn default_top_k() -> usize {
    4
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            recursion_limit: default_recursion_limit(),
            top_k: default_top_k(),
        }
    }
}

impl WorkflowConfig {
    /// Set the loop bound
    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the recursion limit
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
}

/// Collaborators the built-in steps call
#[derive(Clone)]
pub struct WorkflowDeps {
    /// Provider router for generation steps
    pub providers: Arc<ProviderRouter>,
    /// Routing policy for those calls
    pub policy: RoutingPolicy,
    /// Memory for retrieval and persistence
    pub memory: Arc<dyn MemoryStore>,
    /// Audit writer for the cleanup node
    pub audit: AuditWriter,
    /// Settings
    pub config: WorkflowConfig,
}

fn step_err(e: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::Step(e.to_string())
}

fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .collect()
}

fn add_cost(state: &mut WorkflowState, cost: f64) {
    let total = state.get("cost_usd").and_then(Value::as_f64).unwrap_or(0.0) + cost;
    state.set("cost_usd", total);
}

async fn complete(
    providers: &ProviderRouter,
    policy: &RoutingPolicy,
    state: &mut WorkflowState,
    prompt: String,
) -> Result<String, WorkflowError> {
    let response = providers
        .invoke(&CompletionRequest::new(prompt), policy)
        .await
        .map_err(step_err)?;
    add_cost(state, response.total_cost());
    state.set("provider", response.provider.clone());
    Ok(response.text)
}

struct RetrieveStep {
    memory: Arc<dyn MemoryStore>,
    top_k: usize,
}

#[async_trait]
impl Step for RetrieveStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let query = state
            .get_str("rewritten_query")
            .or_else(|| state.get_str("query"))
            .ok_or_else(|| WorkflowError::Step("missing query".into()))?
            .to_string();
        let top_k = state
            .get("top_k")
            .and_then(Value::as_u64)
            .map_or(self.top_k, |k| k as usize);

        let hits = self
            .memory
            .retrieve(&query, &state.user_id, top_k)
            .await
            .map_err(step_err)?;
        debug!(query = %query, hits = hits.len(), "Retrieved documents");

        let documents: Vec<Value> = hits.into_iter().map(|r| Value::String(r.content)).collect();
        state.set("retrieved_count", documents.len());
        state.set("documents", documents);
        Ok(())
    }
}

struct GenerateStep {
    providers: Arc<ProviderRouter>,
    policy: RoutingPolicy,
}

#[async_trait]
impl Step for GenerateStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let question = state
            .get_str("query")
            .ok_or_else(|| WorkflowError::Step("missing query".into()))?
            .to_string();
        let context: Vec<String> = state
            .get("documents")
            .and_then(Value::as_array)
            .map(|docs| {
                docs.iter()
                    .filter_map(Value::as_str)
                    .map(|d| format!("- {d}"))
                    .collect()
            })
            .unwrap_or_default();

        let prompt = format!(
            "Answer the question using only the context.\n\nContext:\n{}\n\nQuestion: {question}",
            context.join("\n")
        );
        let answer = complete(&self.providers, &self.policy, state, prompt).await?;
        state.set("answer", answer);
        Ok(())
    }
}

fn grade(state: &mut WorkflowState) -> Result<(), WorkflowError> {
    let answer = words(state.get_str("answer").unwrap_or_default());
    let documents: BTreeSet<String> = state
        .get("documents")
        .and_then(Value::as_array)
        .map(|docs| docs.iter().filter_map(Value::as_str).flat_map(words).collect())
        .unwrap_or_default();

    let grounded = !documents.is_empty() && !answer.is_disjoint(&documents);
    state.set("grade", if grounded { "grounded" } else { "insufficient" });
    Ok(())
}

fn rewrite(state: &mut WorkflowState) -> Result<(), WorkflowError> {
    let iteration = state.bump_iteration();
    let query = state.get_str("query").unwrap_or_default().to_string();
    let keywords: Vec<String> = words(&query).into_iter().collect();
    let rewritten = if keywords.is_empty() { query } else { keywords.join(" ") };
    debug!(iteration, rewritten = %rewritten, "Rewrote retrieval query");
    state.set("rewritten_query", rewritten);
    Ok(())
}

struct PersistStep {
    memory: Arc<dyn MemoryStore>,
}

#[async_trait]
impl Step for PersistStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let content = format!(
            "Q: {}\nA: {}",
            state.get_str("query").unwrap_or_default(),
            state.get_str("answer").unwrap_or_default()
        );
        let record = MemoryRecord::new(state.user_id.clone(), content)
            .with_metadata(json!({"thread_id": state.thread_id}));
        let reflections = self.memory.write(vec![record]).await.map_err(step_err)?;
        if let Some(reflection) = reflections.into_iter().next() {
            state.set("reflection", serde_json::to_value(reflection).map_err(step_err)?);
        }
        Ok(())
    }
}

struct AuditStep {
    workflow: &'static str,
    audit: AuditWriter,
}

#[async_trait]
impl Step for AuditStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let action = if state.has_error() {
            "workflow_error"
        } else {
            "workflow_completed"
        };
        let event = AuditEvent::new(state.user_id.clone(), state.thread_id.clone(), "workflow", action)
            .with_payload(json!({
                "workflow": self.workflow,
                "version": state.version,
                "iterations": state.iterations,
                "fields": state.fields.keys().collect::<Vec<_>>(),
                "error": state.error,
            }));
        self.audit.write(event).await;
        state.push_result(json!({
            "workflow": self.workflow,
            "status": if state.has_error() { "failed" } else { "completed" },
        }));
        Ok(())
    }
}

/// Compile the retrieval-answer workflow
pub fn build_retrieval_answer(deps: &WorkflowDeps) -> Result<CompiledGraph, WorkflowError> {
    let max_iterations = deps.config.max_iterations;
    let mut graph = StateGraph::new("retrieval_answer");
    graph
        .add_node(
            "retrieve",
            RetrieveStep {
                memory: Arc::clone(&deps.memory),
                top_k: deps.config.top_k,
            },
        )
        .add_node(
            "generate",
            GenerateStep {
                providers: Arc::clone(&deps.providers),
                policy: deps.policy.clone(),
            },
        )
        .add_node("grade", FnStep::new(grade))
        .add_node("rewrite", FnStep::new(rewrite))
        .add_node(
            "persist",
            PersistStep {
                memory: Arc::clone(&deps.memory),
            },
        )
        .add_cleanup_node(
            "audit",
            AuditStep {
                workflow: "retrieval_answer",
                audit: deps.audit.clone(),
            },
        )
        .set_entry_point("retrieve")
        .add_edge("retrieve", "generate")
        .add_edge("generate", "grade")
        .add_conditional_edges(
            "grade",
            move |state: &WorkflowState| {
                let done = state.has_error()
                    || state.get_str("grade") == Some("grounded")
                    || state.iterations >= max_iterations;
                let label = if done { "done" } else { "retry" };
                label.to_string()
            },
            [("done", "persist"), ("retry", "rewrite")],
        )
        .add_edge("rewrite", "retrieve")
        .add_edge("persist", "audit")
        .set_finish_point("audit")
        .set_recursion_limit(deps.config.recursion_limit);
    graph.compile()
}

struct SummarizeStep {
    providers: Arc<ProviderRouter>,
    policy: RoutingPolicy,
}

#[async_trait]
impl Step for SummarizeStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let document = state
            .get_str("document")
            .ok_or_else(|| WorkflowError::Step("missing document".into()))?
            .to_string();
        let prompt = format!("Summarize the following document in three sentences.\n\n{document}");
        let summary = complete(&self.providers, &self.policy, state, prompt).await?;
        state.set("summary", summary);
        Ok(())
    }
}

fn risk_scan(state: &mut WorkflowState) -> Result<(), WorkflowError> {
    let document = state
        .get_str("document")
        .ok_or_else(|| WorkflowError::Step("missing document".into()))?
        .to_lowercase();
    let risks: Vec<&str> = RISK_TERMS
        .iter()
        .copied()
        .filter(|term| document.contains(term))
        .collect();
    let level = match risks.len() {
        0 => "low",
        1 | 2 => "medium",
        _ => "high",
    };
    state.set("risks", risks);
    state.set("risk_level", level);
    Ok(())
}

fn combine(state: &mut WorkflowState) -> Result<(), WorkflowError> {
    let review = json!({
        "summary": state.get("summary").cloned().unwrap_or(Value::Null),
        "risks": state.get("risks").cloned().unwrap_or_else(|| json!([])),
        "risk_level": state.get("risk_level").cloned().unwrap_or(Value::Null),
    });
    state.set("review", review.clone());
    state.push_result(review);
    Ok(())
}

fn single_node(name: &str, step: impl Step + 'static) -> Result<Arc<CompiledGraph>, WorkflowError> {
    let mut graph = StateGraph::new(name);
    graph
        .add_node(name, step)
        .set_entry_point(name)
        .set_finish_point(name);
    graph.compile().map(Arc::new)
}

/// Compile the document-review workflow
pub fn build_document_review(deps: &WorkflowDeps) -> Result<CompiledGraph, WorkflowError> {
    let summarize = single_node(
        "summarize",
        SummarizeStep {
            providers: Arc::clone(&deps.providers),
            policy: deps.policy.clone(),
        },
    )?;
    let risk = single_node("risk_scan", FnStep::new(risk_scan))?;

    let mut graph = StateGraph::new("document_review");
    graph
        .add_node(
            "review",
            ParallelStep::new()
                .branch("summarize", summarize)
                .branch("risk_scan", risk),
        )
        .add_node("combine", FnStep::new(combine))
        .add_cleanup_node(
            "audit",
            AuditStep {
                workflow: "document_review",
                audit: deps.audit.clone(),
            },
        )
        .set_entry_point("review")
        .add_edge("review", "combine")
        .add_edge("combine", "audit")
        .set_finish_point("audit")
        .set_recursion_limit(deps.config.recursion_limit);
    graph.compile()
}
