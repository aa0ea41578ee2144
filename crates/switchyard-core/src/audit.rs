//! Audit trail
//!
//! Append-only [`AuditEvent`]s are written for every state-changing
//! attempt. Writes go through [`AuditWriter`], which retries a failing
//! sink briefly and then logs; an audit failure never fails the command.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_llm::{retry_with_backoff, RetryConfig};
use tracing::{error, info};
use uuid::Uuid;

/// Action written when a command enters the pipeline
pub const COMMAND_STARTED: &str = "command_started";
/// Action written when a command succeeds
pub const COMMAND_COMPLETED: &str = "command_completed";
/// Action written when a command fails or is denied
pub const COMMAND_ERROR: &str = "command_error";

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event id
    pub id: Uuid,
    /// Issuer of the command
    pub issuer: String,
    /// Thread the event belongs to
    pub thread_id: String,
    /// Component that wrote the event
    pub source: String,
    /// What happened
    pub action: String,
    /// Event details
    pub payload: Value,
    /// Free-form tags
    pub tags: Vec<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event with an empty payload
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        thread_id: impl Into<String>,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            issuer: issuer.into(),
            thread_id: thread_id.into(),
            source: source.into(),
            action: action.into(),
            payload: Value::Null,
            tags: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach details
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach tags
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Append-only destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event
    async fn write(&self, event: &AuditEvent) -> Result<()>;
}

/// In-process sink, mostly for tests and the CLI
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event written so far
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events for one thread, in write order
    #[must_use]
    pub fn for_thread(&self, thread_id: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.thread_id == thread_id)
            .cloned()
            .collect()
    }

    /// Number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, event: &AuditEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Sink that emits events on the `audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, event: &AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        info!(
            target: "audit",
            event_id = %event.id,
            issuer = %event.issuer,
            thread_id = %event.thread_id,
            source = %event.source,
            action = %event.action,
            tags = ?event.tags,
            payload = %payload,
            "audit"
        );
        Ok(())
    }
}

/// Which built-in sink the binary wires up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Keep events in memory
    Memory,
    /// Emit on the `audit` tracing target
    #[default]
    Tracing,
}

/// Audit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Sink to use
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Retry budget for a failing sink
    #[serde(default = "default_audit_retry")]
    pub retry: RetryConfig,
}

fn default_audit_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(2)
        .with_initial_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(200))
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::default(),
            retry: default_audit_retry(),
        }
    }
}

/// Best-effort writer in front of a sink
#[derive(Clone)]
pub struct AuditWriter {
    sink: Arc<dyn AuditSink>,
    retry: RetryConfig,
}

impl AuditWriter {
    /// Create a writer with the default retry budget
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            retry: default_audit_retry(),
        }
    }

    /// Override the retry budget
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Write an event; returns whether it was stored
    pub async fn write(&self, event: AuditEvent) -> bool {
        let result = retry_with_backoff(
            &self.retry,
            || self.sink.write(&event),
            |_| true,
        )
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    event_id = %event.id,
                    thread_id = %event.thread_id,
                    action = %event.action,
                    attempts = e.attempts,
                    error = %e.last_error,
                    "Dropping audit event after retries"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        failures_left: AtomicU32,
        inner: InMemoryAuditSink,
    }

    #[async_trait]
    impl AuditSink for FlakySink {
        async fn write(&self, event: &AuditEvent) -> Result<()> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Internal("sink unavailable".into()));
            }
            self.inner.write(event).await
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_in_memory_sink_filters_by_thread() {
        let sink = InMemoryAuditSink::new();
        sink.write(&AuditEvent::new("u", "t1", "orchestrator", COMMAND_STARTED)).await.unwrap();
        sink.write(&AuditEvent::new("u", "t2", "orchestrator", COMMAND_STARTED)).await.unwrap();
        sink.write(&AuditEvent::new("u", "t1", "orchestrator", COMMAND_COMPLETED)).await.unwrap();

        let t1 = sink.for_thread("t1");
        assert_eq!(t1.len(), 2);
        assert_eq!(t1[1].action, COMMAND_COMPLETED);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn test_writer_retries_flaky_sink() {
        let sink = Arc::new(FlakySink {
            failures_left: AtomicU32::new(1),
            inner: InMemoryAuditSink::new(),
        });
        let writer = AuditWriter::new(sink.clone()).with_retry(fast_retry(2));

        assert!(writer.write(AuditEvent::new("u", "t", "test", COMMAND_ERROR)).await);
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_writer_gives_up_without_panicking() {
        let sink = Arc::new(FlakySink {
            failures_left: AtomicU32::new(10),
            inner: InMemoryAuditSink::new(),
        });
        let writer = AuditWriter::new(sink.clone()).with_retry(fast_retry(1));

        assert!(!writer.write(AuditEvent::new("u", "t", "test", COMMAND_ERROR)).await);
        assert!(sink.inner.is_empty());
        // two attempts consumed
        assert_eq!(sink.failures_left.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        let event = AuditEvent::new("u", "t", "test", COMMAND_STARTED)
            .with_payload(serde_json::json!({"k": 1}))
            .with_tags(vec!["x".into()]);
        tokio_test::assert_ok!(TracingAuditSink.write(&event).await);
    }
}
