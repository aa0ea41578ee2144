//! Planner - Deep-tier decomposition into sub-commands
//!
//! A [`Plan`] is a list of stages run in order; the steps inside one stage
//! run concurrently. In `payload.steps`, consecutive steps marked
//! `parallel: true` share a stage and every other step is a stage of its
//! own.

use crate::command::{
    Command, CommandType, Tier, CONTEXT_PARENT_COMMAND, CONTEXT_PLAN_DEPTH, CONTEXT_PLAN_STEP,
};
use crate::error::{Error, Result};
use crate::router::RoutingDecision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use switchyard_llm::{CompletionRequest, ProviderRouter, RoutingPolicy};
use tracing::{debug, instrument, warn};

/// Upper bound on steps in one plan
pub const MAX_PLAN_STEPS: usize = 32;

/// One planned sub-command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Sub-command type
    #[serde(alias = "type")]
    pub command_type: CommandType,
    /// Sub-command action
    #[serde(default)]
    pub action: String,
    /// Sub-command payload
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Run concurrently with adjacent parallel steps
    #[serde(default)]
    pub parallel: bool,
    /// Pin a handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Pin a tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

/// Ordered stages of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Stages, run in order
    pub stages: Vec<Vec<PlanStep>>,
}

impl Plan {
    /// Group flat steps into stages
    #[must_use]
    pub fn from_steps(steps: Vec<PlanStep>) -> Self {
        let mut stages: Vec<Vec<PlanStep>> = Vec::new();
        let mut open_parallel = false;
        for step in steps {
            match stages.last_mut() {
                Some(stage) if step.parallel && open_parallel => stage.push(step),
                _ => {
                    open_parallel = step.parallel;
                    stages.push(vec![step]);
                }
            }
        }
        Self { stages }
    }

    /// Total number of steps
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Whether there is nothing to run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.step_count() == 0
    }
}

/// Build the sub-command for step `index` of `parent`'s plan
///
/// The child inherits the parent's issuer, priority and context, and
/// carries the parent id, its step index and the nesting depth.
#[must_use]
pub fn derive_command(parent: &Command, step: &PlanStep, index: usize) -> Command {
    let mut child = Command::new(parent.issuer_id.clone(), step.command_type, step.action.clone())
        .with_payload(step.payload.clone())
        .with_priority(i64::from(parent.priority));
    child.context = parent.context.clone();
    child.context.insert(
        CONTEXT_PARENT_COMMAND.to_string(),
        Value::String(parent.id.to_string()),
    );
    child
        .context
        .insert(CONTEXT_PLAN_STEP.to_string(), Value::from(index));
    child.context.insert(
        CONTEXT_PLAN_DEPTH.to_string(),
        Value::from(parent.plan_depth() + 1),
    );
    child.requested_agent = step.agent.clone();
    child.requested_tier = step.tier;
    child
}

/// Deep-tier decomposition
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan a command the router sent to the deep tier
    async fn plan(&self, command: &Command, decision: &RoutingDecision) -> Result<Plan>;
}

/// Planner reading `payload.steps`
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadPlanner;

impl PayloadPlanner {
    fn parse_steps(value: &Value) -> Result<Vec<PlanStep>> {
        let steps: Vec<PlanStep> = serde_json::from_value(value.clone())
            .map_err(|e| Error::Validation(format!("invalid plan steps: {e}")))?;
        if steps.len() > MAX_PLAN_STEPS {
            return Err(Error::Validation(format!(
                "plan has {} steps, limit is {MAX_PLAN_STEPS}",
                steps.len()
            )));
        }
        Ok(steps)
    }
}

#[async_trait]
impl Planner for PayloadPlanner {
    async fn plan(&self, command: &Command, decision: &RoutingDecision) -> Result<Plan> {
        if let Some(steps) = command.payload.get("steps") {
            let steps = Self::parse_steps(steps)?;
            if !steps.is_empty() {
                return Ok(Plan::from_steps(steps));
            }
        }

        // No explicit steps: run the command itself once, pinned below deep
        let mut payload = command.payload.clone();
        payload.remove("steps");
        debug!(command_id = %command.id, agent = %decision.chosen_agent, "Single-step plan");
        Ok(Plan::from_steps(vec![PlanStep {
            command_type: command.command_type,
            action: command.action.clone(),
            payload,
            parallel: false,
            agent: Some(decision.chosen_agent.clone()),
            tier: Some(Tier::Graph),
        }]))
    }
}

#[derive(Deserialize)]
struct PlanReply {
    steps: Vec<PlanStep>,
}

/// Planner asking a model for steps, falling back to [`PayloadPlanner`]
pub struct LlmPlanner {
    providers: Arc<ProviderRouter>,
    policy: RoutingPolicy,
    fallback: PayloadPlanner,
}

impl LlmPlanner {
    /// Create a planner
    #[must_use]
    pub fn new(providers: Arc<ProviderRouter>, policy: RoutingPolicy) -> Self {
        Self {
            providers,
            policy,
            fallback: PayloadPlanner,
        }
    }

    fn prompt(command: &Command) -> Result<String> {
        let types: Vec<&str> = CommandType::ALL.iter().map(CommandType::as_str).collect();
        Ok(format!(
            "Decompose this command into sub-commands.\n\
             Allowed command types: {}\n\
             command_type: {}\naction: {}\npayload: {}\n\
             Reply with JSON only: {{\"steps\": [{{\"command_type\": \"...\", \"action\": \"...\", \
             \"payload\": {{}}, \"parallel\": false}}]}}",
            types.join(", "),
            command.command_type,
            command.effective_action(),
            serde_json::to_string(&command.payload)?,
        ))
    }

    async fn ask(&self, command: &Command) -> Result<Plan> {
        let request = CompletionRequest::new(Self::prompt(command)?).with_temperature(0.0);
        let response = self.providers.invoke(&request, &self.policy).await?;
        let text = response.text.as_str();
        let json = match (text.find('{'), text.rfind('}')) {
            (Some(s), Some(e)) if s < e => &text[s..=e],
            _ => return Err(Error::Validation("planner reply contains no JSON object".into())),
        };
        let reply: PlanReply = serde_json::from_str(json)?;
        if reply.steps.is_empty() || reply.steps.len() > MAX_PLAN_STEPS {
            return Err(Error::Validation(format!(
                "planner returned {} steps",
                reply.steps.len()
            )));
        }
        Ok(Plan::from_steps(reply.steps))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    #[instrument(skip(self, command, decision), fields(command_id = %command.id))]
    async fn plan(&self, command: &Command, decision: &RoutingDecision) -> Result<Plan> {
        if command.payload.contains_key("steps") {
            return self.fallback.plan(command, decision).await;
        }
        match self.ask(command).await {
            Ok(plan) => Ok(plan),
            Err(e) => {
                warn!(error = %e, "Model planning failed, using payload planner");
                self.fallback.plan(command, decision).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{RouterConfig, TierRouter};
    use serde_json::json;
    use switchyard_llm::{MockOutcome, MockProvider};

    fn step(command_type: CommandType, parallel: bool) -> PlanStep {
        PlanStep {
            command_type,
            action: String::new(),
            payload: Map::new(),
            parallel,
            agent: None,
            tier: None,
        }
    }

    fn decision_for(command: &Command) -> RoutingDecision {
        TierRouter::new(RouterConfig::default()).analyze_heuristic(command)
    }

    #[test]
    fn test_stage_grouping() {
        let plan = Plan::from_steps(vec![
            step(CommandType::Search, false),
            step(CommandType::Ask, true),
            step(CommandType::Ask, true),
            step(CommandType::Ask, true),
            step(CommandType::Generate, false),
            step(CommandType::Validate, true),
        ]);
        let sizes: Vec<usize> = plan.stages.iter().map(Vec::len).collect();
        assert_eq!(sizes, [1, 3, 1, 1]);
        assert_eq!(plan.step_count(), 6);
    }

    #[test]
    fn test_derive_command_carries_trace() {
        let parent = Command::new("atty", CommandType::HighValue, "full_petition")
            .with_context("mfa_verified", true)
            .with_priority(2);
        let child = derive_command(&parent, &step(CommandType::Search, false), 3);

        assert_eq!(child.issuer_id, "atty");
        assert_eq!(child.priority, 2);
        assert!(child.context_flag("mfa_verified"));
        assert_eq!(child.context[CONTEXT_PARENT_COMMAND], json!(parent.id.to_string()));
        assert_eq!(child.context[CONTEXT_PLAN_STEP], json!(3));
        assert_eq!(child.plan_depth(), 1);
        assert_ne!(child.id, parent.id);

        let grandchild = derive_command(&child, &step(CommandType::Ask, false), 0);
        assert_eq!(grandchild.plan_depth(), 2);
    }

    #[tokio::test]
    async fn test_payload_steps_parsed() {
        let cmd = Command::new("u", CommandType::HighValue, "full_petition").with_field(
            "steps",
            json!([
                {"command_type": "search", "action": "documents", "payload": {"query": "x"}},
                {"type": "ask", "payload": {"query": "a"}, "parallel": true},
                {"type": "ask", "payload": {"query": "b"}, "parallel": true}
            ]),
        );
        let plan = PayloadPlanner.plan(&cmd, &decision_for(&cmd)).await.unwrap();
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.stages[1].len(), 2);
    }

    #[tokio::test]
    async fn test_no_steps_yields_single_pinned_step() {
        let cmd = Command::new("u", CommandType::Workflow, "run").with_field("workflow", "document_review");
        let plan = PayloadPlanner.plan(&cmd, &decision_for(&cmd)).await.unwrap();
        assert_eq!(plan.step_count(), 1);
        let only = &plan.stages[0][0];
        assert_eq!(only.tier, Some(Tier::Graph));
        assert_eq!(only.agent.as_deref(), Some("workflow_runner"));
        assert_eq!(only.payload["workflow"], "document_review");
    }

    #[tokio::test]
    async fn test_malformed_steps_rejected() {
        let cmd = Command::new("u", CommandType::HighValue, "full_petition")
            .with_field("steps", json!([{"command_type": "teleport"}]));
        let err = PayloadPlanner.plan(&cmd, &decision_for(&cmd)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_llm_planner_uses_model_steps_then_falls_back() {
        let provider = MockProvider::new("m").with_outcomes([
            MockOutcome::Reply(r#"{"steps": [{"command_type": "search", "payload": {"query": "q"}}, {"command_type": "generate", "payload": {"prompt": "p"}}]}"#.into()),
            MockOutcome::Reply("I cannot plan that".into()),
        ]);
        let mut providers = ProviderRouter::new();
        providers.register(Arc::new(provider));
        let planner = LlmPlanner::new(Arc::new(providers), RoutingPolicy::new(["m"]));

        let cmd = Command::new("u", CommandType::HighValue, "case_strategy");
        let plan = planner.plan(&cmd, &decision_for(&cmd)).await.unwrap();
        assert_eq!(plan.step_count(), 2);

        let fallback = planner.plan(&cmd, &decision_for(&cmd)).await.unwrap();
        assert_eq!(fallback.step_count(), 1);
        assert_eq!(fallback.stages[0][0].tier, Some(Tier::Graph));
    }
}
