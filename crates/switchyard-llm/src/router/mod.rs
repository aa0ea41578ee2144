//! Router - Provider trait and ordered failover
//!
//! This module contains:
//! - `provider`: the `LlmProvider` trait and pricing
//! - `policy`: `RoutingPolicy` (priority list, retry budget, timeouts, budget)
//! - `router_impl`: `ProviderRouter`, which walks the priority list
//! - `mock`: scripted and echo providers

mod mock;
mod policy;
mod provider;
mod router_impl;


pub use mock::{EchoProvider, MockOutcome, MockProvider};
pub use policy::RoutingPolicy;
pub use provider::{LlmProvider, Pricing};
pub use router_impl::ProviderRouter;
