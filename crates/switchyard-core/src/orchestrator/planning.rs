//! Deep-tier plan execution
//!
//! Stages run in order. Steps inside a stage run concurrently, at most
//! `max_fanout` at a time, and the stage is joined before the next starts.
//! Every step re-enters [`Orchestrator::handle`] with the parent's role and
//! deadline. Once the deadline passes, stages not yet started are skipped.

use super::core::Orchestrator;
use super::process::{Deadline, Outcome};
use super::types::Response;
use crate::command::Command;
use crate::error::Error;
use crate::planner::derive_command;
use crate::roles::Role;
use crate::router::RoutingDecision;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::{info, warn};

impl Orchestrator {
    fn handle_child(
        &self,
        child: Command,
        role: Role,
        deadline: Deadline,
    ) -> BoxFuture<'_, Response> {
        Box::pin(self.run_command(child, Some(role), Some(deadline)))
    }

    pub(super) async fn run_plan(
        &self,
        command: &Command,
        role: Role,
        decision: &RoutingDecision,
        deadline: Deadline,
    ) -> Outcome {
        let planning = self.planner.plan(command, decision);
        let plan = match tokio::time::timeout_at(deadline.at(), planning).await {
            Err(_) => return Outcome::from_result(Err(deadline.error())),
            Ok(Ok(plan)) if plan.is_empty() => {
                return Outcome::from_result(Err(Error::Validation("plan has no steps".into())))
            }
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => return Outcome::from_result(Err(e)),
        };
        info!(
            stages = plan.stages.len(),
            steps = plan.step_count(),
            "Executing plan"
        );

        let fanout = self.config.max_fanout.max(1);
        let mut steps: Vec<Value> = Vec::with_capacity(plan.step_count());
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut index = 0usize;
        let mut timed_out = false;

        for (stage_no, stage) in plan.stages.iter().enumerate() {
            timed_out = timed_out || deadline.expired();
            if failed > 0 || timed_out {
                for step in stage {
                    steps.push(json!({
                        "plan_step": index,
                        "stage": stage_no,
                        "command_type": step.command_type,
                        "action": step.action,
                        "status": "skipped",
                    }));
                    index += 1;
                    skipped += 1;
                }
                continue;
            }

            let children: Vec<Command> = stage
                .iter()
                .enumerate()
                .map(|(offset, step)| derive_command(command, step, index + offset))
                .collect();
            let responses: Vec<Response> = stream::iter(
                children
                    .iter()
                    .cloned()
                    .map(|child| self.handle_child(child, role, deadline)),
            )
            .buffered(fanout)
            .collect()
            .await;

            for (child, response) in children.iter().zip(responses) {
                if !response.success {
                    failed += 1;
                }
                steps.push(json!({
                    "plan_step": index,
                    "stage": stage_no,
                    "command_id": child.id,
                    "command_type": child.command_type,
                    "action": child.effective_action(),
                    "status": if response.success { "succeeded" } else { "failed" },
                    "response": response,
                }));
                index += 1;
            }
        }

        let total = steps.len();
        let result = json!({
            "stages": plan.stages.len(),
            "succeeded": total - failed - skipped,
            "skipped": skipped,
            "failed": failed,
            "steps": steps,
        });

        let error = if timed_out || (failed > 0 && deadline.expired()) {
            warn!(failed, skipped, total, "Plan deadline elapsed");
            Some(deadline.error())
        } else if failed > 0 {
            warn!(failed, total, "Plan finished with failed steps");
            Some(Error::Command(format!("{failed} of {total} plan steps failed")))
        } else {
            None
        };
        Outcome {
            result: Some(result),
            error,
        }
    }
}
