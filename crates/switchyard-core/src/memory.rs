//! Memory and checkpoint storage
//!
//! [`MemoryStore`] is what workflow steps consume: write records (getting
//! back short reflections), retrieve by query, and checkpoint state.
//! [`InMemoryStore`] is the non-durable default; a durable backend plugs
//! in behind the same traits.

use crate::error::Result;
use crate::workflow::{Checkpoint, CheckpointStore, WorkflowError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const SUMMARY_CHARS: usize = 160;
const MAX_KEYWORDS: usize = 8;

/// A stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Record id
    pub id: Uuid,
    /// Owner
    pub user_id: String,
    /// Text content
    pub content: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Value,
    /// When it was written
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a record
    #[must_use]
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            metadata: Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Digest produced when a record is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Record it describes
    pub record_id: Uuid,
    /// First sentence, truncated
    pub summary: String,
    /// Distinct content keywords
    pub keywords: Vec<String>,
}

/// Memory collaborator used by workflow steps
#[async_trait]
pub trait MemoryStore: CheckpointStore {
    /// Append records, returning one reflection each
    async fn write(&self, records: Vec<MemoryRecord>) -> Result<Vec<Reflection>>;

    /// Best `top_k` records of `user_id` for `query`
    async fn retrieve(&self, query: &str, user_id: &str, top_k: usize) -> Result<Vec<MemoryRecord>>;
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn reflect(record: &MemoryRecord) -> Reflection {
    let first = record
        .content
        .split_terminator(['.', '!', '?', '\n'])
        .next()
        .unwrap_or_default()
        .trim();
    let summary: String = first.chars().take(SUMMARY_CHARS).collect();

    let mut seen = BTreeSet::new();
    let keywords = record
        .content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .take(MAX_KEYWORDS)
        .collect();

    Reflection {
        record_id: record.id,
        summary,
        keywords,
    }
}

/// Non-durable store for records and checkpoints
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
    checkpoints: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with records
    pub async fn with_records(records: Vec<MemoryRecord>) -> Self {
        let store = Self::new();
        store.records.write().await.extend(records);
        store
    }

    /// Number of stored records
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> std::result::Result<(), WorkflowError> {
        self.checkpoints
            .write()
            .await
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn get_checkpoint(
        &self,
        thread_id: &str,
    ) -> std::result::Result<Option<Checkpoint>, WorkflowError> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(thread_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn checkpoint_history(
        &self,
        thread_id: &str,
    ) -> std::result::Result<Vec<Checkpoint>, WorkflowError> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn write(&self, records: Vec<MemoryRecord>) -> Result<Vec<Reflection>> {
        let reflections: Vec<Reflection> = records.iter().map(reflect).collect();
        self.records.write().await.extend(records);
        debug!(count = reflections.len(), "Stored memory records");
        Ok(reflections)
    }

    async fn retrieve(&self, query: &str, user_id: &str, top_k: usize) -> Result<Vec<MemoryRecord>> {
        let wanted = tokens(query);
        if wanted.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let records = self.records.read().await;
        let mut scored: Vec<(usize, &MemoryRecord)> = records
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| {
                let overlap = tokens(&r.content).intersection(&wanted).count();
                (overlap > 0).then_some((overlap, r))
            })
            .collect();

        // best overlap first, newest first on ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowState;

    #[tokio::test]
    async fn test_retrieve_ranks_by_overlap_and_scopes_user() {
        let store = InMemoryStore::with_records(vec![
            MemoryRecord::new("u1", "Statute of limitations for contract claims is six years"),
            MemoryRecord::new("u1", "Contract claims need a signed agreement"),
            MemoryRecord::new("u2", "Contract claims limitations statute"),
            MemoryRecord::new("u1", "Parking rules downtown"),
        ])
        .await;

        let hits = store.retrieve("statute limitations contract", "u1", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].content.starts_with("Statute"));
        assert!(hits.iter().all(|r| r.user_id == "u1"));

        let top1 = store.retrieve("contract", "u1", 1).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_write_returns_reflections() {
        let store = InMemoryStore::new();
        let reflections = store
            .write(vec![MemoryRecord::new("u", "Filing deadline moved. Notify the client today.")])
            .await
            .unwrap();

        assert_eq!(reflections.len(), 1);
        assert_eq!(reflections[0].summary, "Filing deadline moved");
        assert!(reflections[0].keywords.contains(&"filing".to_string()));
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_checkpoints_keyed_by_thread() {
        let store = InMemoryStore::new();
        for (thread, node) in [("a", "one"), ("b", "one"), ("a", "two")] {
            store
                .put_checkpoint(Checkpoint {
                    thread_id: thread.into(),
                    node: node.into(),
                    next: None,
                    step: 1,
                    state: WorkflowState::new(thread, "u"),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.get_checkpoint("a").await.unwrap().unwrap().node, "two");
        assert_eq!(store.checkpoint_history("a").await.unwrap().len(), 2);
        assert_eq!(store.checkpoint_history("b").await.unwrap().len(), 1);
        assert!(store.get_checkpoint("c").await.unwrap().is_none());
    }
}
