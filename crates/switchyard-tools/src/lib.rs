//! Switchyard Tools - Tool Registry and Sandboxed Execution
//!
//! This crate provides the tool system for Switchyard:
//! - Registry: tool registration, metadata lookup, role-checked invocation
//! - Sandbox: the resource/access policy a tool runs under
//! - Executor: policy enforcement, deadlines, and retry of transient failures
//! - Builtins: a handful of side-effect-free tools

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod executor;
pub mod registry;
pub mod sandbox;

pub use builtins::register_builtins;
pub use error::{Error, Result, ViolationReason};
pub use executor::SandboxedExecutor;
pub use registry::{
    ResourceUsage, RiskLevel, Tool, ToolDefinition, ToolMetadata, ToolOutput, ToolRegistry,
};
pub use sandbox::SandboxPolicy;
