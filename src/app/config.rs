//! Application configuration types

use serde::{Deserialize, Serialize};
use switchyard_core::{
    AuditConfig, OrchestratorConfig, PermissionConfig, RouterConfig, SandboxConfig,
    ValidationConfig, WorkflowConfig,
};
use switchyard_llm::{OpenAiCompatibleConfig, RoutingPolicy};
use switchyard_tools::SandboxPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub routing_policy: RoutingPolicy,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub planner: PlannerSettings,
}

/// Provider backends to register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Register the offline echo provider
    #[serde(default = "default_echo")]
    pub echo: bool,
    /// OpenAI-compatible endpoints, registered in order
    #[serde(default)]
    pub openai_compatible: Vec<OpenAiCompatibleConfig>,
}

fn default_echo() -> bool {
    true
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            echo: default_echo(),
            openai_compatible: Vec::new(),
        }
    }
}

/// Deep-tier planner selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Ask a model for steps when the payload has none
    #[serde(default)]
    pub use_llm: bool,
}

impl AppConfig {
    /// Copy safe to print: API keys masked
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for endpoint in &mut copy.providers.openai_compatible {
            if endpoint.api_key.is_some() {
                endpoint.api_key = Some("****".to_string());
            }
        }
        copy
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.permissions.validate()?;
        if self.orchestrator.max_fanout == 0 {
            anyhow::bail!("orchestrator.max_fanout must be at least 1");
        }
        if self.routing_policy.provider_priority.is_empty() {
            anyhow::bail!("routing_policy.provider_priority must name at least one provider");
        }
        let presets = std::iter::once(&self.sandbox.default_policy)
            .chain(self.sandbox.role_policies.values().flatten());
        for name in presets {
            if SandboxPolicy::preset(name).is_none() {
                anyhow::bail!("sandbox names unknown policy preset '{name}'");
            }
        }
        Ok(())
    }
}
