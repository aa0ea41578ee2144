//! Orchestrator - Command entry point
//!
//! Every command runs the same pipeline: resolve the issuer role, gate,
//! audit the start, route, validate, dispatch under a deadline, assemble a
//! [`Response`], audit the outcome.
//!
//! # Module Structure
//!
//! - `config`: `OrchestratorConfig`
//! - `core`: `Orchestrator` struct and builder methods
//! - `process`: the per-command pipeline
//! - `planning`: deep-tier plan execution
//! - `types`: `Response`

mod config;
mod core;
mod planning;
mod process;
mod types;

#[cfg(test)]
mod tests;

pub use config::OrchestratorConfig;
pub use core::Orchestrator;
pub use types::Response;
