//! Shared, get-or-create access to one circuit breaker per provider name.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::observability::ObservabilitySink;

/// Registry of named circuit breakers.
///
/// Breakers are created lazily on first lookup and live until the registry
/// is dropped. All callers asking for the same name share one breaker.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    overrides: DashMap<String, CircuitBreakerConfig>,
    sink: Option<Arc<dyn ObservabilitySink>>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl BreakerRegistry {
    /// Create a registry whose breakers use `config`
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            overrides: DashMap::new(),
            sink: None,
            breakers: DashMap::new(),
        }
    }

    /// Attach a sink handed to every breaker created afterwards
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use a dedicated configuration for one name.
    ///
    /// Only affects breakers not created yet.
    #[must_use]
    pub fn with_override(self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Get the breaker for `name`, creating it on first use
    #[must_use]
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            let config = self
                .overrides
                .get(name)
                .map_or_else(|| self.config.clone(), |c| c.value().clone());
            let breaker = CircuitBreaker::new(name, config);
            let breaker = match &self.sink {
                Some(sink) => breaker.with_sink(Arc::clone(sink)),
                None => breaker,
            };
            Arc::new(breaker)
        });
        Arc::clone(entry.value())
    }

    /// Number of breakers created so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot every breaker, ordered by name
    #[must_use]
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Force every breaker back to closed
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
        info!(count = self.breakers.len(), "Reset all circuit breakers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::circuit_breaker::CircuitState;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_shared_instance() {
        let registry = BreakerRegistry::default();
        assert!(registry.is_empty());

        let a = registry.get("openai");
        let b = registry.get("openai");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        a.record_failure();
        assert_eq!(b.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_applies_to_named_breaker() {
        let registry = BreakerRegistry::default().with_override(
            "gemini",
            CircuitBreakerConfig::new().with_failure_threshold(1),
        );

        assert_eq!(registry.get("gemini").config().failure_threshold, 1);
        assert_eq!(registry.get("openai").config().failure_threshold, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_and_reset_all() {
        let registry = BreakerRegistry::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::from_secs(5)),
        );
        registry.get("openai").record_failure();
        registry.get("anthropic");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "anthropic");
        assert_eq!(snapshot[0].state, CircuitState::Closed);
        assert_eq!(snapshot[1].name, "openai");
        assert_eq!(snapshot[1].state, CircuitState::Open);

        registry.reset_all();
        assert!(registry
            .snapshot()
            .iter()
            .all(|s| s.state == CircuitState::Closed && s.failure_count == 0));
    }
}
