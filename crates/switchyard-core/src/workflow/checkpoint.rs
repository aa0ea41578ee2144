//! Checkpoints

use super::state::WorkflowState;
use super::WorkflowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot taken after a node runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Thread the snapshot belongs to
    pub thread_id: String,
    /// Node that just ran
    pub node: String,
    /// Node that would run next; `None` once the graph finished
    pub next: Option<String>,
    /// Node executions so far in this thread
    pub step: usize,
    /// State after the node
    pub state: WorkflowState,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether the graph had finished at this snapshot
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Storage for checkpoints, keyed by thread id
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store the latest checkpoint for its thread
    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), WorkflowError>;

    /// Latest checkpoint for a thread
    async fn get_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, WorkflowError>;

    /// Every checkpoint for a thread, oldest first
    async fn checkpoint_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, WorkflowError>;
}
