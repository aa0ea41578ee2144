//! Graph builder and executor

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::state::WorkflowState;
use super::WorkflowError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Edge target meaning "stop here"
pub const END: &str = "__end__";

const DEFAULT_RECURSION_LIMIT: usize = 25;

/// One node's work
#[async_trait]
pub trait Step: Send + Sync {
    /// Mutate the state; an `Err` is recorded in `state.error`
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError>;
}

type StepFn = dyn Fn(&mut WorkflowState) -> Result<(), WorkflowError> + Send + Sync;

/// Synchronous closure as a [`Step`]
pub struct FnStep {
    f: Box<StepFn>,
}

impl FnStep {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut WorkflowState) -> Result<(), WorkflowError> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Step for FnStep {
    async fn run(&self, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        (self.f)(state)
    }
}

type RouteFn = dyn Fn(&WorkflowState) -> String + Send + Sync;

#[derive(Clone)]
enum Edge {
    Fixed(String),
    Conditional {
        router: Arc<RouteFn>,
        targets: HashMap<String, String>,
    },
}

#[derive(Clone)]
struct Node {
    step: Arc<dyn Step>,
    cleanup: bool,
}

/// Mutable graph builder
pub struct StateGraph {
    name: String,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    finish: HashSet<String>,
    recursion_limit: usize,
}

impl StateGraph {
    /// Start a graph
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            finish: HashSet::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Add a business node
    pub fn add_node(&mut self, name: impl Into<String>, step: impl Step + 'static) -> &mut Self {
        self.nodes.insert(
            name.into(),
            Node {
                step: Arc::new(step),
                cleanup: false,
            },
        );
        self
    }

    /// Add a node that still runs after `state.error` is set
    pub fn add_cleanup_node(
        &mut self,
        name: impl Into<String>,
        step: impl Step + 'static,
    ) -> &mut Self {
        self.nodes.insert(
            name.into(),
            Node {
                step: Arc::new(step),
                cleanup: true,
            },
        );
        self
    }

    /// Unconditional edge
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.insert(from.into(), Edge::Fixed(to.into()));
        self
    }

    /// Edge chosen by `router`, whose label is looked up in `targets`
    pub fn add_conditional_edges<R, I, L, T>(
        &mut self,
        from: impl Into<String>,
        router: R,
        targets: I,
    ) -> &mut Self
    where
        R: Fn(&WorkflowState) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        self.edges.insert(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                targets: targets
                    .into_iter()
                    .map(|(l, t)| (l.into(), t.into()))
                    .collect(),
            },
        );
        self
    }

    /// First node to run
    pub fn set_entry_point(&mut self, node: impl Into<String>) -> &mut Self {
        self.entry = Some(node.into());
        self
    }

    /// Node after which execution stops
    pub fn set_finish_point(&mut self, node: impl Into<String>) -> &mut Self {
        self.finish.insert(node.into());
        self
    }

    /// Cap on node executions per run
    pub fn set_recursion_limit(&mut self, limit: usize) -> &mut Self {
        self.recursion_limit = limit.max(1);
        self
    }

    /// Validate and freeze the graph
    pub fn compile(&self) -> Result<CompiledGraph, WorkflowError> {
        let entry = self.entry.clone().ok_or(WorkflowError::NoEntryPoint)?;
        let known = |name: &str| name == END || self.nodes.contains_key(name);

        if !self.nodes.contains_key(&entry) {
            return Err(WorkflowError::UnknownNode(entry));
        }
        for name in &self.finish {
            if !self.nodes.contains_key(name) {
                return Err(WorkflowError::UnknownNode(name.clone()));
            }
        }
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::UnknownNode(from.clone()));
            }
            let targets: Vec<&String> = match edge {
                Edge::Fixed(to) => vec![to],
                Edge::Conditional { targets, .. } => targets.values().collect(),
            };
            if let Some(missing) = targets.into_iter().find(|t| !known(t)) {
                return Err(WorkflowError::UnknownNode(missing.clone()));
            }
        }
        if let Some(dangling) = self
            .nodes
            .keys()
            .find(|n| !self.edges.contains_key(*n) && !self.finish.contains(*n))
        {
            return Err(WorkflowError::MissingEdge(dangling.clone()));
        }

        Ok(CompiledGraph {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            entry,
            finish: self.finish.clone(),
            recursion_limit: self.recursion_limit,
        })
    }
}

/// Immutable, shareable graph
pub struct CompiledGraph {
    name: String,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    entry: String,
    finish: HashSet<String>,
    recursion_limit: usize,
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&String> = self.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &nodes)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}

impl CompiledGraph {
    /// Graph name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry node
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Run from the entry point without checkpoints
    pub async fn invoke(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        self.run_from(self.entry.clone(), state, None, 0).await
    }

    /// Run from the entry point, checkpointing after every node
    #[instrument(skip(self, state, store), fields(graph = %self.name, thread_id = %state.thread_id))]
    pub async fn invoke_with_checkpoints(
        &self,
        state: WorkflowState,
        store: &dyn CheckpointStore,
    ) -> Result<WorkflowState, WorkflowError> {
        self.run_from(self.entry.clone(), state, Some(store), 0).await
    }

    /// Continue a thread from its latest checkpoint
    #[instrument(skip(self, store), fields(graph = %self.name))]
    pub async fn resume(
        &self,
        thread_id: &str,
        store: &dyn CheckpointStore,
    ) -> Result<WorkflowState, WorkflowError> {
        let checkpoint = store
            .get_checkpoint(thread_id)
            .await?
            .ok_or_else(|| WorkflowError::NoCheckpoint(thread_id.to_string()))?;

        match checkpoint.next {
            None => {
                debug!(thread_id, "Thread already finished, returning stored state");
                Ok(checkpoint.state)
            }
            Some(next) => {
                debug!(thread_id, next = %next, step = checkpoint.step, "Resuming thread");
                self.run_from(next, checkpoint.state, Some(store), checkpoint.step)
                    .await
            }
        }
    }

    async fn run_from(
        &self,
        start: String,
        mut state: WorkflowState,
        store: Option<&dyn CheckpointStore>,
        mut step: usize,
    ) -> Result<WorkflowState, WorkflowError> {
        let mut current = start;
        let mut executed = 0usize;

        loop {
            if executed >= self.recursion_limit {
                warn!(graph = %self.name, limit = self.recursion_limit, "Recursion limit reached");
                return Err(WorkflowError::RecursionLimit(self.recursion_limit));
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| WorkflowError::UnknownNode(current.clone()))?;

            if state.has_error() && !node.cleanup {
                debug!(graph = %self.name, node = %current, "Skipping business node after error");
            } else if let Err(e) = node.step.run(&mut state).await {
                warn!(graph = %self.name, node = %current, error = %e, "Workflow step failed");
                state.fail(format!("{current}: {e}"));
            }
            executed += 1;
            step += 1;

            let next = self.next_node(&current, &state)?;
            if let Some(store) = store {
                store
                    .put_checkpoint(Checkpoint {
                        thread_id: state.thread_id.clone(),
                        node: current.clone(),
                        next: next.clone(),
                        step,
                        state: state.clone(),
                        created_at: Utc::now(),
                    })
                    .await?;
            }

            match next {
                Some(next) => current = next,
                None => break,
            }
        }

        debug!(graph = %self.name, steps = executed, failed = state.has_error(), "Workflow finished");
        Ok(state)
    }

    fn next_node(&self, current: &str, state: &WorkflowState) -> Result<Option<String>, WorkflowError> {
        if self.finish.contains(current) {
            return Ok(None);
        }
        let target = match self.edges.get(current) {
            Some(Edge::Fixed(to)) => to.clone(),
            Some(Edge::Conditional { router, targets }) => {
                let label = router(state);
                targets
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| WorkflowError::InvalidRoute {
                        node: current.to_string(),
                        label,
                    })?
            }
            None => return Err(WorkflowError::MissingEdge(current.to_string())),
        };
        Ok((target != END).then_some(target))
    }
}
