//! Tier router
//!
//! Scores a command from a fixed per-type base plus capped additive
//! adjustments, maps the score to a [`Tier`], and picks a handler from the
//! static agent table. An optional [`RoutingRefiner`] may override the
//! heuristic; its answer is validated, bounded by a timeout, and dropped on
//! any failure.

use crate::command::{Command, CommandType, Tier};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use switchyard_llm::retry::duration_ms;
use switchyard_llm::{CompletionRequest, ProviderRouter, RoutingPolicy};
use tracing::{debug, info, warn};

/// Direct provider calls
pub const AGENT_ASSISTANT: &str = "assistant";
/// Workflow engine runs
pub const AGENT_WORKFLOW_RUNNER: &str = "workflow_runner";
/// Sandboxed tool calls
pub const AGENT_TOOL_RUNNER: &str = "tool_runner";
/// Case management (external)
pub const AGENT_CASE: &str = "case_agent";
/// Administration (external)
pub const AGENT_ADMIN: &str = "admin_agent";
/// Petition drafting (external)
pub const AGENT_PETITION: &str = "petition_agent";

const MAX_SCORE: f64 = 0.99;

/// Base score of a command type
#[must_use]
pub fn base_score(command_type: CommandType) -> f64 {
    match command_type {
        CommandType::Ask => 0.2,
        CommandType::Search => 0.3,
        CommandType::Tool => 0.35,
        CommandType::Case => 0.55,
        CommandType::Generate => 0.65,
        CommandType::Validate => 0.6,
        CommandType::Workflow => 0.75,
        CommandType::Admin => 0.7,
        CommandType::HighValue => 0.85,
    }
}

/// Handler recommended for a command type
#[must_use]
pub fn static_agent(command_type: CommandType) -> &'static str {
    match command_type {
        CommandType::Ask | CommandType::Generate => AGENT_ASSISTANT,
        CommandType::Search | CommandType::Validate | CommandType::Workflow => AGENT_WORKFLOW_RUNNER,
        CommandType::Tool => AGENT_TOOL_RUNNER,
        CommandType::Case => AGENT_CASE,
        CommandType::Admin => AGENT_ADMIN,
        CommandType::HighValue => AGENT_PETITION,
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn clamp_score(x: f64) -> f64 {
    round4(x.clamp(0.0, MAX_SCORE))
}

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Base score plus adjustments
    Heuristic,
    /// Heuristic overridden by the refiner
    LlmRefined,
    /// Explicit agent/tier on the command
    Override,
    /// `auto_route = false`
    StaticTable,
}

/// One applied score adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    /// What triggered it
    pub name: String,
    /// Amount added
    pub delta: f64,
}

/// Why the router decided what it did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    /// Type base score
    pub base_score: f64,
    /// Applied adjustments, in evaluation order
    pub adjustments: Vec<Adjustment>,
    /// Decision source
    pub source: DecisionSource,
    /// Heuristic score before refinement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heuristic_score: Option<f64>,
    /// Set when a deep decision was downgraded because of plan depth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downgraded_from: Option<Tier>,
}

/// Routing result for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Assigned tier
    pub tier: Tier,
    /// Score in `[0, 0.99]`
    pub score: f64,
    /// Handler name
    pub chosen_agent: String,
    /// Human-readable reason
    pub reason: String,
    /// Whether the command escalates to the deep tier
    pub requires_escalation: bool,
    /// Diagnostics
    pub metadata: RoutingMetadata,
}

impl RoutingDecision {
    /// Force a tier, keeping everything else
    #[must_use]
    pub fn downgraded_to(mut self, tier: Tier) -> Self {
        self.metadata.downgraded_from = Some(self.tier);
        self.tier = tier;
        self.requires_escalation = tier == Tier::Deep;
        self
    }
}

/// Structured override returned by a refiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedRoute {
    /// Tier label; must be `fast`, `graph` or `deep`
    pub tier: String,
    /// Proposed score
    pub score: f64,
    /// Proposed handler
    #[serde(default)]
    pub recommended_agent: Option<String>,
    /// Why
    #[serde(default)]
    pub reason: String,
}

/// Second opinion on a heuristic decision
#[async_trait]
pub trait RoutingRefiner: Send + Sync {
    /// Propose an override
    async fn refine(&self, command: &Command, heuristic: &RoutingDecision) -> Result<RefinedRoute>;
}

/// Refiner asking a model through the provider router
pub struct LlmRefiner {
    providers: Arc<ProviderRouter>,
    policy: RoutingPolicy,
}

impl LlmRefiner {
    /// Create a refiner
    #[must_use]
    pub fn new(providers: Arc<ProviderRouter>, policy: RoutingPolicy) -> Self {
        Self { providers, policy }
    }

    fn prompt(command: &Command, heuristic: &RoutingDecision) -> String {
        let mut keys: Vec<&str> = command.payload.keys().map(String::as_str).collect();
        keys.sort_unstable();
        format!(
            "Classify the execution tier for this command.\n\
             Tiers: fast (single handler call), graph (multi-step workflow), deep (planned decomposition).\n\
             command_type: {}\naction: {}\npayload_keys: {}\npriority: {}\n\
             heuristic: tier={} score={:.2} agent={}\n\
             Reply with JSON only: {{\"tier\": \"fast|graph|deep\", \"score\": 0.0-0.99, \
             \"recommended_agent\": \"<name>\", \"reason\": \"<short>\"}}",
            command.command_type,
            command.effective_action(),
            keys.join(","),
            command.priority,
            heuristic.tier,
            heuristic.score,
            heuristic.chosen_agent,
        )
    }
}

/// Extract the outermost JSON object from free text
fn parse_refinement(text: &str) -> Result<RefinedRoute> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(serde_json::from_str(&text[s..=e])?),
        _ => Err(Error::Validation("refinement reply contains no JSON object".into())),
    }
}

#[async_trait]
impl RoutingRefiner for LlmRefiner {
    async fn refine(&self, command: &Command, heuristic: &RoutingDecision) -> Result<RefinedRoute> {
        let request = CompletionRequest::new(Self::prompt(command, heuristic))
            .with_max_tokens(200)
            .with_temperature(0.0);
        let response = self.providers.invoke(&request, &self.policy).await?;
        parse_refinement(&response.text)
    }
}

/// Router settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Actions that earn the deep-action bonus
    #[serde(default = "default_deep_actions")]
    pub deep_actions: Vec<String>,
    /// Consult the refiner when one is attached
    #[serde(default)]
    pub llm_refinement: bool,
    /// Deadline for one refinement
    #[serde(
        default = "default_refinement_timeout",
        with = "duration_ms",
        rename = "refinement_timeout_ms"
    )]
    pub refinement_timeout: Duration,
}

fn default_deep_actions() -> Vec<String> {
    ["full_petition", "appeal_brief", "case_strategy", "multi_document_review"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_refinement_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            deep_actions: default_deep_actions(),
            llm_refinement: false,
            refinement_timeout: default_refinement_timeout(),
        }
    }
}

impl RouterConfig {
    /// Enable or disable refinement
    #[must_use]
    pub fn with_llm_refinement(mut self, enabled: bool) -> Self {
        self.llm_refinement = enabled;
        self
    }

    /// Set the refinement deadline
    #[must_use]
    pub fn with_refinement_timeout(mut self, timeout: Duration) -> Self {
        self.refinement_timeout = timeout;
        self
    }
}

/// Scores commands into tiers
pub struct TierRouter {
    config: RouterConfig,
    refiner: Option<Arc<dyn RoutingRefiner>>,
}

impl TierRouter {
    /// Heuristic-only router
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            refiner: None,
        }
    }

    /// Attach a refiner (used only when `llm_refinement` is on)
    #[must_use]
    pub fn with_refiner(mut self, refiner: Arc<dyn RoutingRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Router settings
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    fn adjustments(&self, command: &Command) -> Vec<Adjustment> {
        let mut applied = Vec::new();
        let mut push = |name: &str, delta: f64| {
            if delta > 0.0 {
                applied.push(Adjustment {
                    name: name.to_string(),
                    delta: round4(delta),
                });
            }
        };

        let extra_fields = command.payload.len().saturating_sub(3);
        push("payload_richness", (0.02 * extra_fields as f64).min(0.10));

        let documents = command
            .payload
            .get("documents")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        push("documents", (0.03 * documents as f64).min(0.20));

        if command.payload_flag("requires_human_review") {
            push("human_review", 0.10);
        }
        if command.payload_flag("parallel_execution") {
            push("parallel_execution", 0.05);
        }
        let action = command.effective_action();
        if self
            .config
            .deep_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(action))
        {
            push("deep_action", 0.15);
        }
        if command.priority <= 2 {
            push("urgent_priority", 0.05);
        }
        applied
    }

    /// Deterministic decision from base score and adjustments
    #[must_use]
    pub fn analyze_heuristic(&self, command: &Command) -> RoutingDecision {
        let base = base_score(command.command_type);
        let adjustments = self.adjustments(command);
        let score = clamp_score(base + adjustments.iter().map(|a| a.delta).sum::<f64>());
        let tier = Tier::from_score(score);

        let reason = if adjustments.is_empty() {
            format!("{} base score {base:.2}", command.command_type)
        } else {
            let names: Vec<&str> = adjustments.iter().map(|a| a.name.as_str()).collect();
            format!(
                "{} base score {base:.2} adjusted by {}",
                command.command_type,
                names.join(", ")
            )
        };

        RoutingDecision {
            tier,
            score,
            chosen_agent: static_agent(command.command_type).to_string(),
            reason,
            requires_escalation: tier == Tier::Deep,
            metadata: RoutingMetadata {
                base_score: base,
                adjustments,
                source: DecisionSource::Heuristic,
                heuristic_score: None,
                downgraded_from: None,
            },
        }
    }

    /// Heuristic decision, optionally refined
    pub async fn analyze(&self, command: &Command) -> RoutingDecision {
        let heuristic = self.analyze_heuristic(command);

        let refiner = match &self.refiner {
            Some(refiner) if self.config.llm_refinement => refiner,
            _ => return heuristic,
        };
        if command.payload_flag("disable_llm_routing") {
            debug!(command_id = %command.id, "Refinement disabled by payload");
            return heuristic;
        }

        let refined = tokio::time::timeout(
            self.config.refinement_timeout,
            refiner.refine(command, &heuristic),
        )
        .await;

        match refined {
            Ok(Ok(route)) => match Self::apply_refinement(heuristic.clone(), route) {
                Some(decision) => {
                    info!(
                        command_id = %command.id,
                        heuristic_tier = %heuristic.tier,
                        tier = %decision.tier,
                        "Routing refined"
                    );
                    decision
                }
                None => {
                    warn!(command_id = %command.id, "Refinement returned an invalid tier, keeping heuristic");
                    heuristic
                }
            },
            Ok(Err(e)) => {
                warn!(command_id = %command.id, error = %e, "Refinement failed, keeping heuristic");
                heuristic
            }
            Err(_) => {
                warn!(
                    command_id = %command.id,
                    timeout_ms = self.config.refinement_timeout.as_millis() as u64,
                    "Refinement timed out, keeping heuristic"
                );
                heuristic
            }
        }
    }

    fn apply_refinement(heuristic: RoutingDecision, route: RefinedRoute) -> Option<RoutingDecision> {
        let tier: Tier = route.tier.parse().ok()?;
        if !route.score.is_finite() {
            return None;
        }
        let agent = route
            .recommended_agent
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(heuristic.chosen_agent);
        let reason = if route.reason.trim().is_empty() {
            heuristic.reason
        } else {
            route.reason
        };

        Some(RoutingDecision {
            tier,
            score: clamp_score(route.score),
            chosen_agent: agent,
            reason,
            requires_escalation: tier == Tier::Deep,
            metadata: RoutingMetadata {
                source: DecisionSource::LlmRefined,
                heuristic_score: Some(heuristic.score),
                ..heuristic.metadata
            },
        })
    }

    /// Decision for a command carrying an explicit agent or tier
    #[must_use]
    pub fn override_decision(&self, command: &Command) -> RoutingDecision {
        let tier = command.requested_tier.unwrap_or(Tier::Fast);
        let agent = command
            .requested_agent
            .clone()
            .unwrap_or_else(|| static_agent(command.command_type).to_string());
        RoutingDecision {
            tier,
            score: 0.0,
            chosen_agent: agent,
            reason: "explicit override".to_string(),
            requires_escalation: tier == Tier::Deep,
            metadata: RoutingMetadata {
                base_score: base_score(command.command_type),
                adjustments: Vec::new(),
                source: DecisionSource::Override,
                heuristic_score: None,
                downgraded_from: None,
            },
        }
    }

    /// Decision for `auto_route = false`
    #[must_use]
    pub fn static_decision(&self, command: &Command) -> RoutingDecision {
        let base = base_score(command.command_type);
        RoutingDecision {
            tier: Tier::Fast,
            score: base,
            chosen_agent: static_agent(command.command_type).to_string(),
            reason: "auto-routing disabled, static agent table".to_string(),
            requires_escalation: false,
            metadata: RoutingMetadata {
                base_score: base,
                adjustments: Vec::new(),
                source: DecisionSource::StaticTable,
                heuristic_score: None,
                downgraded_from: None,
            },
        }
    }

    /// Full routing: override, then static table, then scoring
    pub async fn decide(&self, command: &Command) -> RoutingDecision {
        if command.has_override() {
            self.override_decision(command)
        } else if !command.auto_route {
            self.static_decision(command)
        } else {
            self.analyze(command).await
        }
    }
}

#[cfg(test)]
mod tests;
