//! Concurrent sub-graphs

use super::graph::{CompiledGraph, Step};
use super::state::WorkflowState;
use super::WorkflowError;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// Runs named sub-graphs on clones of the state and joins them
///
/// Branch results are merged in declaration order regardless of which
/// finished first, so a later branch wins any field both wrote. A branch
/// that ends with an error contributes only that error.
pub struct ParallelStep {
    branches: Vec<(String, Arc<CompiledGraph>)>,
}

impl ParallelStep {
    /// Empty fan-out
    #[must_use]
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
        }
    }

    /// Add a branch
    #[must_use]
    pub fn branch(mut self, name: impl Into<String>, graph: Arc<CompiledGraph>) -> Self {
        self.branches.push((name.into(), graph));
        self
    }
}

impl Default for ParallelStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for ParallelStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        let base = state.clone();
        let outcomes = join_all(
            self.branches
                .iter()
                .map(|(_, graph)| graph.invoke(base.clone())),
        )
        .await;

        let mut failures = Vec::new();
        for ((name, _), outcome) in self.branches.iter().zip(outcomes) {
            match outcome {
                Ok(branch) => {
                    debug!(branch = %name, failed = branch.has_error(), "Parallel branch joined");
                    state.merge_branch(&base, branch);
                }
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Step(failures.join("; ")))
        }
    }
}
