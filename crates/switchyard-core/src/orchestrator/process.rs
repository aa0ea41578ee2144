//! Per-command pipeline

use super::core::Orchestrator;
use super::types::Response;
use crate::audit::{AuditEvent, COMMAND_COMPLETED, COMMAND_ERROR, COMMAND_STARTED};
use crate::command::{Command, Tier};
use crate::error::{Error, Result};
use crate::handlers::HandlerContext;
use crate::roles::Role;
use crate::router::RoutingDecision;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const AUDIT_SOURCE: &str = "orchestrator";

/// What dispatch produced
///
/// Failed plans carry both: the step listing and the failure.
pub(super) struct Outcome {
    pub(super) result: Option<Value>,
    pub(super) error: Option<Error>,
}

impl Outcome {
    pub(super) fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self {
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                result: None,
                error: Some(e),
            },
        }
    }
}

/// Absolute deadline shared by a command and its plan steps
#[derive(Debug, Clone, Copy)]
pub(super) struct Deadline {
    at: Instant,
    budget_ms: u64,
}

impl Deadline {
    /// `budget` from now, or the inherited deadline if that comes first
    fn starting_at(now: Instant, budget: Duration, inherited: Option<Deadline>) -> Self {
        let own = now + budget;
        match inherited {
            Some(parent) if parent.at < own => Self {
                at: parent.at,
                budget_ms: duration_ms(parent.at.saturating_duration_since(now)),
            },
            _ => Self {
                at: own,
                budget_ms: duration_ms(budget),
            },
        }
    }

    pub(super) fn at(&self) -> Instant {
        self.at
    }

    pub(super) fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub(super) fn error(&self) -> Error {
        Error::Timeout(self.budget_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Orchestrator {
    /// Run one command through the pipeline
    ///
    /// `role` skips resolution when the caller already knows it. Every
    /// failure comes back as an unsuccessful [`Response`].
    pub async fn handle(&self, command: Command, role: Option<Role>) -> Response {
        self.run_command(command, role, None).await
    }

    /// Pipeline body; plan steps pass their parent's deadline
    #[instrument(
        skip(self, command, role, inherited),
        fields(command_id = %command.id, command_type = %command.command_type, depth = command.plan_depth())
    )]
    pub(super) async fn run_command(
        &self,
        command: Command,
        role: Option<Role>,
        inherited: Option<Deadline>,
    ) -> Response {
        let started = Instant::now();
        let deadline = Deadline::starting_at(started, self.config.command_timeout(), inherited);
        let role = match role {
            Some(role) => role,
            None => self.roles.resolve(&command.issuer_id).await,
        };

        let target = match self.gate.enforce(role, &command) {
            Ok(target) => target,
            Err(e) => {
                warn!(role = %role, error = %e, "Command denied");
                self.audit_event(&command, COMMAND_ERROR, json!({
                    "role": role,
                    "stage": "permission",
                    "error": e.to_string(),
                    "error_kind": e.kind(),
                }))
                .await;
                return Response::rejected(&command, &e, started.elapsed());
            }
        };

        self.audit_event(&command, COMMAND_STARTED, json!({
            "role": role,
            "permission": target.action,
            "resource": target.resource,
            "action": command.effective_action(),
        }))
        .await;

        let decision = self.route(&command).await;
        info!(
            tier = %decision.tier,
            agent = %decision.chosen_agent,
            score = decision.score,
            "Command routed"
        );

        let outcome = match self.schemas.validate(&command) {
            Ok(()) => {
                self.dispatch_with_deadline(&command, role, &decision, deadline)
                    .await
            }
            Err(e) => Outcome::from_result(Err(e)),
        };

        let response = Response::routed(
            &command,
            &decision,
            outcome.result,
            outcome.error.as_ref(),
            started.elapsed(),
        );

        let action = if response.success {
            COMMAND_COMPLETED
        } else {
            COMMAND_ERROR
        };
        self.audit_event(&command, action, json!({
            "role": role,
            "success": response.success,
            "tier": decision.tier,
            "agent": decision.chosen_agent,
            "execution_time_ms": response.execution_time_ms,
            "error": outcome.error.as_ref().map(ToString::to_string),
            "error_kind": response.error_kind,
        }))
        .await;

        if let Some(e) = &outcome.error {
            warn!(error = %e, elapsed_ms = response.execution_time_ms, "Command failed");
        } else {
            debug!(elapsed_ms = response.execution_time_ms, "Command completed");
        }
        response
    }

    /// Routing decision with the plan-depth bound applied
    pub(super) async fn route(&self, command: &Command) -> RoutingDecision {
        let decision = self.router.decide(command).await;
        let depth = command.plan_depth();
        if decision.tier == Tier::Deep && depth >= self.config.max_plan_depth {
            info!(
                depth,
                max_plan_depth = self.config.max_plan_depth,
                "Plan depth reached, downgrading deep to graph"
            );
            return decision.downgraded_to(Tier::Graph);
        }
        decision
    }

    /// Dispatch bounded by `deadline`
    ///
    /// Plans are not cancelled from outside: each step inherits the
    /// deadline, times out on its own and writes its own audit events.
    async fn dispatch_with_deadline(
        &self,
        command: &Command,
        role: Role,
        decision: &RoutingDecision,
        deadline: Deadline,
    ) -> Outcome {
        if decision.tier == Tier::Deep {
            return self.run_plan(command, role, decision, deadline).await;
        }

        match tokio::time::timeout_at(deadline.at(), self.dispatch(command, role, decision)).await {
            Ok(result) => Outcome::from_result(result),
            Err(_) => {
                let error = deadline.error();
                warn!(error = %error, "Command deadline elapsed");
                Outcome::from_result(Err(error))
            }
        }
    }

    async fn dispatch(
        &self,
        command: &Command,
        role: Role,
        decision: &RoutingDecision,
    ) -> Result<Value> {
        let handler = self.handlers.get(&decision.chosen_agent).ok_or_else(|| {
            Error::Command(format!(
                "no handler registered for agent '{}'",
                decision.chosen_agent
            ))
        })?;
        let ctx = HandlerContext {
            role,
            tier: decision.tier,
        };
        handler.handle(command, &ctx).await
    }

    async fn audit_event(&self, command: &Command, action: &str, payload: Value) {
        let event = AuditEvent::new(
            command.issuer_id.clone(),
            command.thread_id(),
            AUDIT_SOURCE,
            action,
        )
        .with_payload(json!({
            "command_id": command.id,
            "command_type": command.command_type,
            "details": payload,
        }))
        .with_tags(command.context_tags());
        self.audit.write(event).await;
    }
}
