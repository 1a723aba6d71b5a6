//! Circuit Breaker pattern implementation
//!
//! Isolates a failing dependency so repeated failures are rejected fast
//! instead of piling up latency. The breaker has three states:
//! - Closed: calls pass, failures are counted inside a rolling window
//! - Open: calls are rejected without invoking the operation
//! - HalfOpen: exactly one probe call is admitted to test recovery
//!
//! All state lives behind one mutex that is only held for synchronous
//! prune/transition steps, never across an `.await`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::observability::{EventKind, ObservabilitySink};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failures exceeded threshold - requests are rejected
    Open,
    /// Testing recovery - a single probe passes through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of failures inside the window before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from open to half-open
    pub reset_timeout: Duration,
    /// Window size for counting failures (rolling window)
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set reset timeout
    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set failure window
    #[must_use]
    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }
}

/// Classifies an operation error for the breaker.
///
/// Cancelled calls say nothing about the health of the dependency and are
/// never recorded.
pub trait BreakerOutcome {
    /// Whether this error means the caller gave up, not that the call failed
    fn is_cancellation(&self) -> bool {
        false
    }
}

/// Error returned by [`CircuitBreaker::execute`]
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit rejected the call; the operation was not invoked
    Open {
        /// Breaker name
        name: String,
        /// Time until the breaker will admit a probe
        retry_after: Duration,
    },
    /// The operation ran and returned this error
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was rejected by an open circuit
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if it ran
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { name, retry_after } => write!(
                f,
                "circuit '{}' is open (retry after {}ms)",
                name,
                retry_after.as_millis()
            ),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

/// Point-in-time view of a breaker, for display and diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failures inside the current window
    pub failure_count: usize,
    /// Milliseconds since the most recent failure
    pub last_failure_ago_ms: Option<u64>,
    /// Milliseconds since the circuit last opened
    pub opened_ago_ms: Option<u64>,
    /// Whether a half-open probe is running
    pub probe_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            last_failure: None,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.opened_at = None;
        self.probe_in_flight = false;
    }

    /// Open -> HalfOpen once the reset timeout has been exceeded
    fn maybe_half_open(&mut self, now: Instant, reset_timeout: Duration) -> bool {
        if self.state != CircuitState::Open {
            return false;
        }
        let expired = self
            .opened_at
            .is_none_or(|at| now.saturating_duration_since(at) > reset_timeout);
        if expired {
            self.state = CircuitState::HalfOpen;
            self.probe_in_flight = false;
            true
        } else {
            false
        }
    }
}

/// Circuit breaker for fault tolerance
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    sink: Option<Arc<dyn ObservabilitySink>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
            sink: None,
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Attach an observability sink that receives `circuit_opened` events
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get the number of failures inside the current window
    #[must_use]
    pub fn failure_count(&self) -> usize {
        let mut inner = self.lock();
        inner.prune(Instant::now(), self.config.failure_window);
        inner.failures.len()
    }

    /// Readiness check: whether a call would currently be admitted.
    ///
    /// Performs the Open -> HalfOpen transition when due, but does not claim
    /// the probe slot.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        if inner.maybe_half_open(Instant::now(), self.config.reset_timeout) {
            info!(name = %self.name, "Circuit breaker entering half-open state");
        }
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// Snapshot the breaker for display
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.prune(now, self.config.failure_window);
        let ago = |t: Option<Instant>| {
            t.map(|t| u64::try_from(now.saturating_duration_since(t).as_millis()).unwrap_or(u64::MAX))
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failures.len(),
            last_failure_ago_ms: ago(inner.last_failure),
            opened_ago_ms: ago(inner.opened_at),
            probe_in_flight: inner.probe_in_flight,
        }
    }

    fn admit<E>(&self) -> Result<Admission, CircuitBreakerError<E>> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.prune(now, self.config.failure_window);

        if inner.maybe_half_open(now, self.config.reset_timeout) {
            info!(name = %self.name, "Circuit breaker entering half-open state");
        }

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                debug!(name = %self.name, "Circuit breaker admitting probe");
                Ok(Admission::Probe)
            }
            CircuitState::HalfOpen => Err(CircuitBreakerError::Open {
                name: self.name.clone(),
                retry_after: Duration::ZERO,
            }),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
                Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after: self.config.reset_timeout.saturating_sub(elapsed),
                })
            }
        }
    }

    /// Run `op` through the breaker.
    ///
    /// Rejected calls never invoke `op`. The operation's own error is returned
    /// unchanged inside [`CircuitBreakerError::Inner`]. Cancellation errors and
    /// dropped futures are not recorded; a dropped probe frees the probe slot.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: BreakerOutcome,
    {
        let admission = self.admit()?;
        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let result = op().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.on_success(admission),
            Err(e) if e.is_cancellation() => {
                debug!(name = %self.name, "Operation cancelled, not recorded");
                if admission == Admission::Probe {
                    self.release_probe();
                }
            }
            Err(_) => self.on_failure(admission),
        }

        result.map_err(CircuitBreakerError::Inner)
    }

    /// Record a successful operation made outside [`execute`](Self::execute)
    pub fn record_success(&self) {
        self.on_success(Admission::Probe);
    }

    /// Record a failed operation made outside [`execute`](Self::execute)
    pub fn record_failure(&self) {
        self.on_failure(Admission::Probe);
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.prune(Instant::now(), self.config.failure_window);
        match inner.state {
            // Success in closed state leaves the window alone
            CircuitState::Closed => {}
            CircuitState::HalfOpen if admission == Admission::Probe => {
                inner.close();
                info!(name = %self.name, "Circuit breaker closed");
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = Instant::now();
        let opened = {
            let mut inner = self.lock();
            inner.prune(now, self.config.failure_window);
            inner.last_failure = Some(now);

            match inner.state {
                CircuitState::Closed => {
                    inner.failures.push_back(now);
                    let failures = inner.failures.len();
                    debug!(
                        name = %self.name,
                        failures = failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker failure recorded"
                    );
                    if failures >= self.config.failure_threshold as usize {
                        inner.open(now);
                        Some(failures)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if admission == Admission::Probe => {
                    warn!(
                        name = %self.name,
                        "Circuit breaker probe failed, reopening"
                    );
                    inner.failures.push_back(now);
                    inner.open(now);
                    Some(inner.failures.len())
                }
                CircuitState::HalfOpen | CircuitState::Open => None,
            }
        };

        if let Some(failures) = opened {
            self.emit_opened(failures);
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn emit_opened(&self, failures: usize) {
        let reset_timeout_ms =
            u64::try_from(self.config.reset_timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(
            name = %self.name,
            failures = failures,
            reset_timeout_ms = reset_timeout_ms,
            "Circuit breaker opened"
        );
        if let Some(sink) = &self.sink {
            sink.emit(
                EventKind::CircuitOpened,
                &format!("circuit '{}' opened", self.name),
                serde_json::json!({
                    "service": self.name,
                    "failure_count": failures,
                    "reset_timeout_ms": reset_timeout_ms,
                }),
            );
        }
    }

    /// Reset the circuit breaker to closed state with cleared history
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.close();
        inner.last_failure = None;
        info!(name = %self.name, "Circuit breaker reset");
    }
}

/// Frees the half-open probe slot if the probe future is dropped mid-flight
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(name = %self.breaker.name, "Probe dropped before completion");
            self.breaker.release_probe();
        }
    }
}
