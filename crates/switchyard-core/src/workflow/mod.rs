//! Workflow engine
//!
//! A directed graph of named steps over one [`WorkflowState`]. Edges are
//! fixed or chosen by a routing function reading the state; cycles are
//! allowed and must be bounded by a counter the steps keep in state.
//!
//! # Module Structure
//!
//! - `state`: the state value threaded through steps
//! - `graph`: `StateGraph` builder and the immutable `CompiledGraph`
//! - `checkpoint`: checkpoint records and the store trait
//! - `parallel`: concurrent sub-graphs joined in declaration order
//! - `cache`: per-kind cache of compiled graphs
//! - `builtin`: retrieval-answer and document-review workflows

mod builtin;
mod cache;
mod checkpoint;
mod graph;
mod parallel;
mod state;


pub use builtin::{build_document_review, build_retrieval_answer, WorkflowConfig, WorkflowDeps};
pub use cache::{GraphCache, WorkflowKind};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use graph::{CompiledGraph, FnStep, StateGraph, Step, END};
pub use parallel::ParallelStep;
pub use state::WorkflowState;

use thiserror::Error;

/// Workflow errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// A referenced node does not exist
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Graph has no entry point
    #[error("graph has no entry point")]
    NoEntryPoint,

    /// Node has no outgoing edge and is not a finish point
    #[error("node '{0}' has no outgoing edge")]
    MissingEdge(String),

    /// Routing function returned a label with no mapping
    #[error("node '{node}' routed to unmapped label '{label}'")]
    InvalidRoute {
        /// Node whose router ran
        node: String,
        /// Label it returned
        label: String,
    },

    /// A step failed
    #[error("step failed: {0}")]
    Step(String),

    /// Too many node executions in one run
    #[error("recursion limit of {0} node executions reached")]
    RecursionLimit(usize),

    /// No checkpoint to resume from
    #[error("no checkpoint for thread '{0}'")]
    NoCheckpoint(String),

    /// Checkpoint store failure
    #[error("checkpoint store: {0}")]
    Checkpoint(String),
}
