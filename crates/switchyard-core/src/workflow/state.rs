//! Workflow state

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Versioned bag of fields threaded through graph steps
///
/// Each execution owns its state exclusively. Once `error` is set the
/// engine skips business steps; only cleanup nodes see the state again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Thread id used for checkpoints and audit
    pub thread_id: String,
    /// User the workflow runs for
    pub user_id: String,
    /// Incremented on every write
    pub version: u64,
    /// Named fields
    pub fields: BTreeMap<String, Value>,
    /// Accumulated results
    pub results: Vec<Value>,
    /// First failure, if any
    pub error: Option<String>,
    /// Loop counter for bounded cycles
    pub iterations: u32,
}

impl WorkflowState {
    /// Create an empty state
    #[must_use]
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Seed a field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Write a field
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
        self.version += 1;
    }

    /// Explicitly clear a field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.fields.remove(key);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    /// Read a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Read a string field
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Append a result
    pub fn push_result(&mut self, result: Value) {
        self.results.push(result);
        self.version += 1;
    }

    /// Record a failure; the first one wins
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
            self.version += 1;
        }
    }

    /// Whether a failure was recorded
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Advance the loop counter
    pub fn bump_iteration(&mut self) -> u32 {
        self.iterations += 1;
        self.version += 1;
        self.iterations
    }

    /// Fold a branch's changes relative to `base` into this state
    ///
    /// Fields the branch wrote (added or changed) overwrite ours and results
    /// it appended are appended. A failed branch contributes only its error.
    pub fn merge_branch(&mut self, base: &WorkflowState, branch: WorkflowState) {
        self.iterations = self.iterations.max(branch.iterations);
        if let Some(error) = branch.error {
            if base.error.is_none() {
                self.fail(error);
            }
            return;
        }
        for (key, value) in branch.fields {
            if base.fields.get(&key) != Some(&value) {
                self.set(key, value);
            }
        }
        for result in branch.results.into_iter().skip(base.results.len()) {
            self.push_result(result);
        }
    }
}
