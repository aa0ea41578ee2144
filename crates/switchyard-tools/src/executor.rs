//! Executor - Sandboxed tool execution
//!
//! Enforces a [`SandboxPolicy`] around every tool call:
//! - allow-list, caller role, risk level, network and filesystem checks
//!   before running
//! - a deadline of `min(timeout, max_cpu_seconds)` while running
//! - reported memory/cpu usage checked after running
//!
//! Policy breaches are [`Error::Violation`] and never retried. Caller
//! timeouts and transient failures are retryable through
//! [`SandboxedExecutor::run_with_retry`].

use crate::error::{Error, Result, ViolationReason};
use crate::registry::{ToolOutput, ToolRegistry};
use crate::sandbox::SandboxPolicy;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_llm::RetryConfig;
use tracing::{debug, instrument, warn};

/// Runs registered tools under sandbox policies
pub struct SandboxedExecutor {
    registry: Arc<ToolRegistry>,
    retry: RetryConfig,
}

impl SandboxedExecutor {
    /// Create an executor with the default retry schedule
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            retry: RetryConfig::default(),
        }
    }

    /// Set the retry schedule used by [`Self::run_with_retry`]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the registry
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a tool once under `policy`
    #[instrument(skip(self, args, policy), fields(tool = %tool_id, policy = %policy.name))]
    pub async fn run(
        &self,
        tool_id: &str,
        args: Value,
        policy: &SandboxPolicy,
        timeout: Duration,
        caller_role: Option<&str>,
    ) -> Result<ToolOutput> {
        let violation = |reason: ViolationReason| Error::Violation {
            tool: tool_id.to_string(),
            policy: policy.name.clone(),
            reason,
        };

        let tool = self
            .registry
            .get(tool_id)
            .ok_or_else(|| Error::NotFound(tool_id.to_string()))?;
        let def = tool.definition();

        if !policy.allows_tool(tool_id) {
            return Err(violation(ViolationReason::ToolNotAllowed));
        }
        if let Some(role) = caller_role {
            if !def.permits_role(role) {
                return Err(violation(ViolationReason::RoleNotAllowed(role.to_string())));
            }
        }
        if def.risk_level > policy.max_risk {
            return Err(violation(ViolationReason::RiskTooHigh {
                risk: def.risk_level,
                limit: policy.max_risk,
            }));
        }
        if def.requires_network && !policy.allow_network {
            return Err(violation(ViolationReason::NetworkDenied));
        }
        if def.requires_filesystem && !policy.allow_filesystem {
            return Err(violation(ViolationReason::FilesystemDenied));
        }
        if def.memory_mb > policy.max_memory_mb {
            return Err(violation(ViolationReason::MemoryLimit {
                used_mb: def.memory_mb,
                limit_mb: policy.max_memory_mb,
            }));
        }
        tool.validate_input(&args)?;

        let cpu_budget = Duration::from_secs(policy.max_cpu_seconds);
        let deadline = timeout.min(cpu_budget);
        let started = Instant::now();

        let output = match tokio::time::timeout(deadline, tool.execute(args)).await {
            Ok(result) => result?,
            Err(_) if cpu_budget < timeout => {
                return Err(violation(ViolationReason::CpuLimit {
                    limit_secs: policy.max_cpu_seconds,
                }));
            }
            Err(_) => return Err(Error::Timeout(timeout.as_millis() as u64)),
        };

        if output.usage.memory_mb > policy.max_memory_mb {
            return Err(violation(ViolationReason::MemoryLimit {
                used_mb: output.usage.memory_mb,
                limit_mb: policy.max_memory_mb,
            }));
        }
        if output.usage.cpu_ms > policy.max_cpu_seconds.saturating_mul(1000) {
            return Err(violation(ViolationReason::CpuLimit {
                limit_secs: policy.max_cpu_seconds,
            }));
        }

        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool execution completed"
        );
        Ok(output)
    }

    /// Run a tool, retrying timeouts and transient failures
    ///
    /// Transient failures share the `max_retries` budget; a timeout is
    /// retried at most once. Violations are returned immediately.
    pub async fn run_with_retry(
        &self,
        tool_id: &str,
        args: Value,
        policy: &SandboxPolicy,
        timeout: Duration,
        caller_role: Option<&str>,
    ) -> Result<ToolOutput> {
        let mut retries = 0u32;
        let mut timed_out = false;
        loop {
            let e = match self
                .run(tool_id, args.clone(), policy, timeout, caller_role)
                .await
            {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            let may_retry = match e {
                Error::Timeout(_) => !timed_out && retries < self.retry.max_retries,
                Error::Transient(_) => retries < self.retry.max_retries,
                _ => false,
            };
            if !may_retry {
                if e.is_violation() {
                    warn!(tool = %tool_id, error = %e, "Sandbox violation");
                }
                return Err(e);
            }

            retries += 1;
            if matches!(e, Error::Timeout(_)) {
                timed_out = true;
            }
            let delay = self.retry.delay_for(retries);
            warn!(
                tool = %tool_id,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "Tool run failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use crate::registry::{ResourceUsage, RiskLevel, Tool, ToolDefinition};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    struct FlakyTool {
        definition: ToolDefinition,
        failures: u32,
        calls: AtomicU32,
        stall: Option<Duration>,
        stall_calls: u32,
        usage: ResourceUsage,
    }

    impl FlakyTool {
        fn new(name: &str) -> Self {
            Self {
                definition: ToolDefinition::new(name, "test tool"),
                failures: 0,
                calls: AtomicU32::new(0),
                stall: None,
                stall_calls: 1,
                usage: ResourceUsage::default(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for FlakyTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(&self, _input: Value) -> Result<ToolOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                if call < self.stall_calls {
                    tokio::time::sleep(stall).await;
                }
            }
            if call < self.failures {
                return Err(Error::Transient("flaky".to_string()));
            }
            Ok(ToolOutput::new(json!({"call": call})).with_usage(self.usage))
        }
    }

    fn executor_with(tool: Arc<FlakyTool>) -> SandboxedExecutor {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry);
        registry.register(tool);
        SandboxedExecutor::new(Arc::new(registry)).with_retry(
            RetryConfig::new()
                .with_max_retries(2)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    fn open_policy() -> SandboxPolicy {
        SandboxPolicy::standard()
    }

    #[tokio::test]
    async fn test_allowed_builtin_runs() {
        let executor = executor_with(Arc::new(FlakyTool::new("flaky")));
        let out = assert_ok!(
            executor
                .run(
                    "echo",
                    json!({"message": "hi"}),
                    &SandboxPolicy::restricted(),
                    Duration::from_secs(1),
                    None,
                )
                .await
        );
        assert_eq!(out.value["message"], "hi");
    }

    #[tokio::test]
    async fn test_disallowed_tool_is_violation_and_not_retried() {
        let tool = Arc::new(FlakyTool::new("flaky"));
        let executor = executor_with(tool.clone());

        let err = executor
            .run_with_retry(
                "flaky",
                json!({}),
                &SandboxPolicy::restricted(),
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap_err();

        assert!(err.is_violation());
        assert!(!err.is_retryable());
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_requirement_checked() {
        let mut tool = FlakyTool::new("fetch");
        tool.definition = tool.definition.clone().with_network();
        let executor = executor_with(Arc::new(tool));

        let policy = SandboxPolicy::new("offline").allow_tools(["fetch"]);
        let err = executor
            .run("fetch", json!({}), &policy, Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Violation {
                reason: ViolationReason::NetworkDenied,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_role_checked() {
        let mut tool = FlakyTool::new("billing");
        tool.definition = tool.definition.clone().with_allowed_roles(["admin"]);
        let executor = executor_with(Arc::new(tool));

        let err = executor
            .run(
                "billing",
                json!({}),
                &open_policy(),
                Duration::from_secs(1),
                Some("client"),
            )
            .await
            .unwrap_err();
        assert!(err.is_violation());
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let mut tool = FlakyTool::new("flaky");
        tool.failures = 2;
        let tool = Arc::new(tool);
        let executor = executor_with(tool.clone());

        let out = executor
            .run_with_retry("flaky", json!({}), &open_policy(), Duration::from_secs(1), None)
            .await
            .unwrap();
        assert_eq!(out.value["call"], 2);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let mut tool = FlakyTool::new("slow");
        tool.stall = Some(Duration::from_millis(200));
        let tool = Arc::new(tool);
        let executor = executor_with(tool.clone());

        let first = executor
            .run("slow", json!({}), &open_policy(), Duration::from_millis(10), None)
            .await
            .unwrap_err();
        assert!(matches!(first, Error::Timeout(10)));
        assert!(first.is_retryable());

        let out = executor
            .run_with_retry("slow", json!({}), &open_policy(), Duration::from_millis(10), None)
            .await
            .unwrap();
        assert_eq!(out.value["call"], 1);
    }

    #[tokio::test]
    async fn test_reported_memory_over_limit_is_violation() {
        let mut tool = FlakyTool::new("hungry");
        tool.usage = ResourceUsage {
            cpu_ms: 0,
            memory_mb: 4096,
        };
        let executor = executor_with(Arc::new(tool));

        let err = executor
            .run("hungry", json!({}), &open_policy(), Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Violation {
                reason: ViolationReason::MemoryLimit { used_mb: 4096, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let executor = executor_with(Arc::new(FlakyTool::new("flaky")));
        let err = assert_err!(
            executor
                .run("nope", json!({}), &open_policy(), Duration::from_secs(1), None)
                .await
        );
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stalled_tool_timeout_retried_once() {
        let mut tool = FlakyTool::new("stuck");
        tool.stall = Some(Duration::from_millis(200));
        tool.stall_calls = u32::MAX;
        let tool = Arc::new(tool);
        let executor = executor_with(tool.clone());

        let err = assert_err!(
            executor
                .run_with_retry("stuck", json!({}), &open_policy(), Duration::from_millis(10), None)
                .await
        );
        assert!(matches!(err, Error::Timeout(10)));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_after_timeout_uses_remaining_budget() {
        let mut tool = FlakyTool::new("wobbly");
        tool.stall = Some(Duration::from_millis(200));
        tool.failures = 3;
        let tool = Arc::new(tool);
        let executor = executor_with(tool.clone());

        let err = assert_err!(
            executor
                .run_with_retry("wobbly", json!({}), &open_policy(), Duration::from_millis(10), None)
                .await
        );
        assert!(matches!(err, Error::Transient(_)));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_risk_level_above_policy_is_violation() {
        let mut tool = FlakyTool::new("wire_funds");
        tool.definition = tool.definition.clone().with_risk_level(RiskLevel::High);
        let tool = Arc::new(tool);
        let executor = executor_with(tool.clone());

        let err = assert_err!(
            executor
                .run("wire_funds", json!({}), &open_policy(), Duration::from_secs(1), None)
                .await
        );
        assert!(matches!(
            err,
            Error::Violation {
                reason: ViolationReason::RiskTooHigh {
                    risk: RiskLevel::High,
                    limit: RiskLevel::Medium,
                },
                ..
            }
        ));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);

        assert_ok!(
            executor
                .run("wire_funds", json!({}), &SandboxPolicy::trusted(), Duration::from_secs(1), None)
                .await
        );
    }
}
