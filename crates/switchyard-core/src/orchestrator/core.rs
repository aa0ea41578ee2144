//! Orchestrator core structure
//!
//! Contains the main `Orchestrator` struct and its builder methods.

use crate::audit::AuditWriter;
use crate::handlers::HandlerRegistry;
use crate::permissions::{PermissionConfig, PermissionGate};
use crate::planner::{PayloadPlanner, Planner};
use crate::roles::RoleResolver;
use crate::router::{RouterConfig, TierRouter};
use crate::schema::{SchemaRegistry, ValidationConfig};
use std::sync::Arc;

use super::config::OrchestratorConfig;

/// Gate → route → dispatch → audit
pub struct Orchestrator {
    pub(crate) roles: Arc<RoleResolver>,
    pub(crate) gate: PermissionGate,
    pub(crate) router: TierRouter,
    pub(crate) schemas: SchemaRegistry,
    pub(crate) planner: Arc<dyn Planner>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) audit: AuditWriter,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the default gate, router, schemas and
    /// payload planner
    #[must_use]
    pub fn new(handlers: HandlerRegistry, audit: AuditWriter, config: OrchestratorConfig) -> Self {
        Self {
            roles: Arc::new(RoleResolver::new(config.default_role)),
            gate: PermissionGate::new(PermissionConfig::default()),
            router: TierRouter::new(RouterConfig::default()),
            schemas: SchemaRegistry::new(&ValidationConfig::default()),
            planner: Arc::new(PayloadPlanner),
            handlers,
            audit,
            config,
        }
    }

    /// Set the role resolver
    #[must_use]
    pub fn with_roles(mut self, roles: Arc<RoleResolver>) -> Self {
        self.roles = roles;
        self
    }

    /// Set the permission gate
    #[must_use]
    pub fn with_gate(mut self, gate: PermissionGate) -> Self {
        self.gate = gate;
        self
    }

    /// Set the tier router
    #[must_use]
    pub fn with_router(mut self, router: TierRouter) -> Self {
        self.router = router;
        self
    }

    /// Set the payload schemas
    #[must_use]
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    /// Set the deep-tier planner
    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    /// Get the role resolver
    #[must_use]
    pub fn roles(&self) -> &Arc<RoleResolver> {
        &self.roles
    }

    /// Get the tier router
    #[must_use]
    pub fn router(&self) -> &TierRouter {
        &self.router
    }

    /// Get the handler registry
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}
