//! Switchyard Core - Command Orchestration
//!
//! This crate routes and executes inbound commands:
//! - Command: the command model and its closed type/operation tables
//! - Router: heuristic tier scoring with optional model refinement
//! - Permissions: role-based gating with MFA, tag and time-window rules
//! - Schema: per-operation payload validation
//! - Workflow: an explicit state-graph engine with checkpoints
//! - Handlers: the assistant, tool runner and workflow runner agents
//! - Planner: deep-tier decomposition into staged sub-commands
//! - Orchestrator: gate → route → dispatch → audit → response

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod command;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod operations;
pub mod orchestrator;
pub mod permissions;
pub mod planner;
pub mod roles;
pub mod router;
pub mod schema;
pub mod workflow;

pub use audit::{
    AuditConfig, AuditEvent, AuditSink, AuditSinkKind, AuditWriter, InMemoryAuditSink,
    TracingAuditSink,
};
pub use command::{Command, CommandType, Tier};
pub use error::{format_error_for_cli, Error, ErrorKind, Result, UserFriendlyError};
pub use handlers::{
    AgentHandler, AssistantAgent, HandlerContext, HandlerRegistry, SandboxConfig, ToolAgent,
    WorkflowAgent,
};
pub use memory::{InMemoryStore, MemoryRecord, MemoryStore, Reflection};
pub use operations::{Operation, OperationTable, PermissionTarget, Resource};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Response};
pub use permissions::{PermissionConfig, PermissionGate, RolePolicy, TimeWindow};
pub use planner::{LlmPlanner, PayloadPlanner, Plan, PlanStep, Planner};
pub use roles::{Role, RoleDirectory, RoleResolver};
pub use router::{
    DecisionSource, LlmRefiner, RouterConfig, RoutingDecision, RoutingMetadata, RoutingRefiner,
    TierRouter,
};
pub use schema::{FieldKind, PayloadSchema, SchemaRegistry, ValidationConfig};
pub use workflow::{
    CompiledGraph, GraphCache, StateGraph, WorkflowConfig, WorkflowDeps, WorkflowError,
    WorkflowKind, WorkflowState,
};
