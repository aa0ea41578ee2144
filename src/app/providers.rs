//! LLM provider resolution
//!
//! Registers the configured providers and checks that the routing policy
//! only names providers that exist.

use super::config::ProvidersConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use switchyard_llm::{EchoProvider, OpenAiCompatibleProvider, ProviderRouter, RoutingPolicy};
use tracing::{info, warn};

/// Build the provider router
pub fn resolve_providers(config: &ProvidersConfig, policy: &RoutingPolicy) -> Result<ProviderRouter> {
    let mut router = ProviderRouter::new();

    if config.echo {
        router.register(Arc::new(EchoProvider::default()));
        info!("Registered echo provider");
    }

    for endpoint in &config.openai_compatible {
        let name = endpoint.name.clone();
        if endpoint.api_key.is_none() {
            warn!(provider = %name, "No API key configured, sending unauthenticated requests");
        }
        let provider = OpenAiCompatibleProvider::new(endpoint.clone())
            .with_context(|| format!("Failed to initialize provider '{name}'"))?;
        router.register(Arc::new(provider));
        info!(provider = %name, base_url = %endpoint.base_url, "Registered OpenAI-compatible provider");
    }

    let known = router.provider_names();
    let missing: Vec<&String> = policy
        .provider_priority
        .iter()
        .filter(|name| !known.contains(name))
        .collect();
    if missing.len() == policy.provider_priority.len() {
        anyhow::bail!(
            "none of the providers in routing_policy.provider_priority are registered: {:?}",
            policy.provider_priority
        );
    }
    for name in missing {
        warn!(provider = %name, "Provider in routing policy is not registered and will be skipped");
    }

    Ok(router)
}
