//! Application wiring
//!
//! Loads layered configuration and builds an [`Orchestrator`] with the
//! built-in handlers, providers and tools.
//!
//! [`Orchestrator`]: switchyard_core::Orchestrator

pub mod bootstrap;
pub mod config;
pub mod loader;
pub mod providers;

pub use bootstrap::build_orchestrator;
pub use loader::load_config;
