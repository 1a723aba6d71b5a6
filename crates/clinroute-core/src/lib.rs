//! Clinroute Core - failure isolation for the routing layer
//!
//! This crate provides:
//! - A windowed circuit breaker with a single half-open probe
//! - A registry handing out one shared breaker per provider name
//! - An exponential backoff policy
//! - The observability sink that receives structured events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod observability;
pub mod utils;

pub use observability::{BroadcastSink, EventKind, ObservabilityEvent, ObservabilitySink, TracingSink};
pub use utils::{
    Backoff, BreakerOutcome, BreakerRegistry, BreakerSnapshot, CircuitBreaker,
    CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
