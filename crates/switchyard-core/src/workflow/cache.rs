//! Compiled graph cache

use super::graph::CompiledGraph;
use super::WorkflowError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Built-in workflow kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Retrieve, answer, grade, retry with a rewritten query
    RetrievalAnswer,
    /// Parallel summary and risk scan of one document
    DocumentReview,
}

impl WorkflowKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetrievalAnswer => "retrieval_answer",
            Self::DocumentReview => "document_review",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retrieval_answer" => Ok(Self::RetrievalAnswer),
            "document_review" => Ok(Self::DocumentReview),
            other => Err(format!("unknown workflow: {other}")),
        }
    }
}

/// Lazily compiled, read-shared graphs
#[derive(Default)]
pub struct GraphCache {
    graphs: DashMap<WorkflowKind, Arc<CompiledGraph>>,
}

impl GraphCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached graph for `kind`, compiling it with `build` on first use
    pub fn get_or_compile<F>(
        &self,
        kind: WorkflowKind,
        build: F,
    ) -> Result<Arc<CompiledGraph>, WorkflowError>
    where
        F: FnOnce() -> Result<CompiledGraph, WorkflowError>,
    {
        if let Some(graph) = self.graphs.get(&kind) {
            return Ok(Arc::clone(&graph));
        }
        let entry = self.graphs.entry(kind).or_try_insert_with(|| {
            info!(workflow = %kind, "Compiling workflow graph");
            build().map(Arc::new)
        })?;
        Ok(Arc::clone(&entry))
    }

    /// Number of compiled graphs
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether nothing is compiled yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}
