//! Router - task-based routing across providers
//!
//! # Module Structure
//!
//! - `types`: task categories and their default budgets
//! - `config`: provider credentials, routing rules and retry policy
//! - `mock`: scriptable provider for tests
//! - `router_impl`: LlmRouter and the fallback chain

mod config;
mod mock;
mod router_impl;
mod types;


pub use config::{ModelChoice, ProviderConfig, RouterConfig, RoutingRule};
pub use mock::{MockProvider, MockReply};
pub use router_impl::{AttemptOutcome, AttemptRecord, LlmRouter, ProviderStatus, RouteReport};
pub use types::TaskType;
