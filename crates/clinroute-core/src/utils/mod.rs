//! Failure isolation utilities

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    BreakerOutcome, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitState,
};
pub use registry::BreakerRegistry;
pub use retry::Backoff;
