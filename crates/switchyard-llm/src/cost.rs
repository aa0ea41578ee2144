//! Cost Tracking - per-attempt usage and cost accounting
//!
//! Every attempt the router makes is recorded here, successful or not,
//! so callers can enforce spend limits and inspect provider health.

use crate::completion::{AttemptOutcome, AttemptRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Maximum records to keep in memory by default
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Aggregated usage for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Attempts made
    pub attempts: u64,
    /// Attempts that failed
    pub failures: u64,
    /// Prompt tokens
    pub tokens_in: u64,
    /// Completion tokens
    pub tokens_out: u64,
    /// Total cost (USD)
    pub cost_usd: f64,
    /// Total latency (ms)
    pub latency_ms: u64,
}

/// Bounded in-memory ledger of attempt records
pub struct CostTracker {
    records: Mutex<VecDeque<AttemptRecord>>,
    max_records: usize,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    /// Create a tracker with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    /// Create a tracker keeping at most `max_records` records
    #[must_use]
    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    /// Record one attempt, evicting the oldest record when full
    pub fn record(&self, record: AttemptRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Number of retained records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total cost across retained records
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.cost_usd)
            .sum()
    }

    /// Snapshot of retained records, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Usage aggregated per provider
    #[must_use]
    pub fn usage_by_provider(&self) -> HashMap<String, ProviderUsage> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut usage: HashMap<String, ProviderUsage> = HashMap::new();
        for r in records.iter() {
            let entry = usage.entry(r.provider.clone()).or_default();
            entry.attempts += 1;
            if matches!(r.outcome, AttemptOutcome::Failure(_)) {
                entry.failures += 1;
            }
            entry.tokens_in += u64::from(r.tokens_in);
            entry.tokens_out += u64::from(r.tokens_out);
            entry.cost_usd += r.cost_usd;
            entry.latency_ms += r.latency_ms;
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use chrono::Utc;

    fn record(provider: &str, outcome: AttemptOutcome, cost: f64) -> AttemptRecord {
        AttemptRecord {
            provider: provider.to_string(),
            attempt: 1,
            outcome,
            latency_ms: 10,
            tokens_in: 5,
            tokens_out: 7,
            cost_usd: cost,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_usage_by_provider() {
        let tracker = CostTracker::new();
        tracker.record(record("a", AttemptOutcome::Failure(FailureKind::Transient), 0.0));
        tracker.record(record("a", AttemptOutcome::Success, 0.002));
        tracker.record(record("b", AttemptOutcome::Success, 0.001));

        let usage = tracker.usage_by_provider();
        assert_eq!(usage["a"].attempts, 2);
        assert_eq!(usage["a"].failures, 1);
        assert_eq!(usage["b"].tokens_out, 7);
        assert!((tracker.total_cost() - 0.003).abs() < 1e-9);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let tracker = CostTracker::with_capacity(2);
        tracker.record(record("first", AttemptOutcome::Success, 0.0));
        tracker.record(record("second", AttemptOutcome::Success, 0.0));
        tracker.record(record("third", AttemptOutcome::Success, 0.0));

        let names: Vec<_> = tracker.records().into_iter().map(|r| r.provider).collect();
        assert_eq!(names, vec!["second", "third"]);
    }
}
