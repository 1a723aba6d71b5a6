//! LLM Router implementation
//!
//! Builds the candidate chain for a task and walks it through the circuit
//! breakers, with a shared retry budget, capped backoff and an overall
//! deadline. Ordinary failures never surface as `Err`: the caller gets a
//! failure [`LlmResponse`] carrying the last error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use clinroute_core::{BreakerRegistry, CircuitBreakerError, ObservabilitySink, TracingSink};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::config::{ModelChoice, RouterConfig};
use super::types::TaskType;
use crate::error::{Error, Result};
use crate::http::elapsed_ms;
use crate::log_entry::LlmLogEntry;
use crate::provider::LlmProvider;
use crate::request::{LlmRequest, LlmResponse};

/// How one candidate attempt ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Adapter returned a success response
    Success,
    /// Adapter returned a failure response
    Failed {
        /// Error carried by the response
        error: String,
    },
    /// Breaker rejected the call; no network attempt
    CircuitOpen {
        /// Milliseconds until a probe is admitted
        retry_after_ms: u64,
    },
    /// Provider unknown or missing credentials; skipped
    NotConfigured {
        /// Why the provider was skipped
        error: String,
    },
    /// Overall deadline hit while this attempt was in flight
    TimedOut,
}

/// Record of one candidate attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Outcome
    pub outcome: AttemptOutcome,
    /// Time spent on this attempt
    pub latency_ms: u64,
}

/// Routed response with the ordered attempt history
#[derive(Debug, Clone, Serialize)]
pub struct RouteReport {
    /// Final response (success or synthetic failure)
    pub response: LlmResponse,
    /// Attempts in the order they were made
    pub attempts: Vec<AttemptRecord>,
}

/// Provider status for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub name: String,
    /// Credentials present
    pub configured: bool,
    /// Health probe succeeded
    pub reachable: bool,
}

/// LLM Router for managing multiple providers with task-based routing
pub struct LlmRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    config: RwLock<Arc<RouterConfig>>,
    breakers: Arc<BreakerRegistry>,
    sink: Arc<dyn ObservabilitySink>,
}

impl LlmRouter {
    /// Create a new router
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is malformed.
    pub fn new(config: RouterConfig, breakers: Arc<BreakerRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            providers: HashMap::new(),
            config: RwLock::new(Arc::new(config)),
            breakers,
            sink: Arc::new(TracingSink),
        })
    }

    /// Send call log entries to `sink` instead of `tracing`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a provider under its own name
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Register a provider under its own name
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registering LLM provider");
        self.providers.insert(name, provider);
    }

    /// Get a provider by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted
    #[must_use]
    pub fn list_providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Providers with usable credentials, sorted (display only)
    #[must_use]
    pub fn configured_providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .providers
            .values()
            .filter(|p| p.is_configured())
            .map(|p| p.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Breaker registry shared with this router
    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Current configuration snapshot
    #[must_use]
    pub fn config(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Validate and atomically replace the configuration.
    ///
    /// Routing decisions already in progress keep their snapshot.
    ///
    /// # Errors
    /// Returns [`Error::Config`] and keeps the old configuration if invalid.
    pub fn update_config(&self, config: RouterConfig) -> Result<()> {
        config.validate()?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
        info!("Router configuration updated");
        Ok(())
    }

    /// Candidate chain for `task` under the current configuration
    #[must_use]
    pub fn candidates(&self, task: TaskType) -> Vec<ModelChoice> {
        self.config().candidates(task)
    }

    /// Probe every registered provider concurrently
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        let mut providers: Vec<_> = self.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.name().cmp(b.name()));

        join_all(providers.into_iter().map(|provider| async move {
            ProviderStatus {
                name: provider.name().to_string(),
                configured: provider.is_configured(),
                reachable: provider.health_check().await,
            }
        }))
        .await
    }

    /// Route a request for `task`, returning the first success or a failure
    /// response carrying the last error.
    ///
    /// # Errors
    /// Only [`Error::Cancelled`], when the request's token fires.
    #[instrument(skip(self, request), fields(task = %task))]
    pub async fn route(&self, task: TaskType, request: &LlmRequest) -> Result<LlmResponse> {
        Ok(self.route_with_report(task, request).await?.response)
    }

    /// Like [`route`](Self::route) but also returns every attempt made
    ///
    /// # Errors
    /// Only [`Error::Cancelled`].
    pub async fn route_with_report(&self, task: TaskType, request: &LlmRequest) -> Result<RouteReport> {
        let candidates = self.candidates(task);
        self.execute_chain(task, candidates, request, &|| false, |provider, req| async move {
            provider.send_message(&req).await
        })
        .await
    }

    /// Route to a single pinned candidate, still through its breaker
    ///
    /// # Errors
    /// Only [`Error::Cancelled`].
    #[instrument(skip(self, request), fields(task = %task, candidate = %choice))]
    pub async fn route_to(
        &self,
        task: TaskType,
        choice: &ModelChoice,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let report = self
            .execute_chain(task, vec![choice.clone()], request, &|| false, |provider, req| async move {
                provider.send_message(&req).await
            })
            .await?;
        Ok(report.response)
    }

    /// Stream a routed request into `tx`.
    ///
    /// Falls back to the next candidate only while no token has been sent.
    ///
    /// # Errors
    /// Only [`Error::Cancelled`].
    #[instrument(skip(self, request, tx), fields(task = %task))]
    pub async fn route_stream(
        &self,
        task: TaskType,
        request: &LlmRequest,
        tx: UnboundedSender<String>,
    ) -> Result<LlmResponse> {
        let delivered = Arc::new(AtomicBool::new(false));
        let candidates = self.candidates(task);
        let halt = {
            let delivered = Arc::clone(&delivered);
            move || delivered.load(Ordering::SeqCst)
        };

        let report = self
            .execute_chain(task, candidates, request, &halt, |provider, req| {
                let tx = tx.clone();
                let delivered = Arc::clone(&delivered);
                async move {
                    let mut forward = |token: &str| {
                        delivered.store(true, Ordering::SeqCst);
                        // Receiver gone means the caller stopped listening
                        let _ = tx.send(token.to_string());
                    };
                    provider.stream(&req, &mut forward).await
                }
            })
            .await?;
        Ok(report.response)
    }

    pub(super) fn prepare(task: TaskType, config: &RouterConfig, request: &LlmRequest, choice: &ModelChoice) -> LlmRequest {
        let budget = config.budget_for(task);
        let mut prepared = request.clone();
        prepared.model = choice.model.clone();
        prepared.max_tokens = prepared.max_tokens.or(Some(budget.max_tokens));
        prepared.temperature = prepared.temperature.or(Some(budget.temperature));
        prepared
    }

    async fn execute_chain<F, Fut>(
        &self,
        task: TaskType,
        candidates: Vec<ModelChoice>,
        request: &LlmRequest,
        halt: &(dyn Fn() -> bool + Send + Sync),
        mut invoke: F,
    ) -> Result<RouteReport>
    where
        F: FnMut(Arc<dyn LlmProvider>, LlmRequest) -> Fut,
        Fut: Future<Output = LlmResponse> + Send,
    {
        let config = self.config();
        let started = Instant::now();
        let deadline = started + config.timeout();
        let backoff = config.backoff();
        let max_invocations = config.max_retries.saturating_add(1);
        let cancel = &request.cancellation;

        let mut invocations = 0u32;
        let mut attempts = Vec::with_capacity(candidates.len());
        let mut last_error: Option<String> = None;
        let mut last_choice: Option<&ModelChoice> = None;

        for (index, choice) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if invocations >= max_invocations {
                debug!(invocations, "Retry budget exhausted");
                break;
            }
            if Instant::now() >= deadline {
                last_error.get_or_insert_with(|| Error::Timeout(config.timeout_ms).to_string());
                break;
            }
            last_choice = Some(choice);

            let provider = match self.providers.get(&choice.provider) {
                Some(p) if p.is_configured() => Arc::clone(p),
                found => {
                    let error = if found.is_some() {
                        Error::NotConfigured(format!("{} has no credentials", choice.provider))
                    } else {
                        Error::NotConfigured(format!("unknown provider '{}'", choice.provider))
                    };
                    warn!(candidate = %choice, error = %error, "Skipping candidate");
                    attempts.push(AttemptRecord {
                        provider: choice.provider.clone(),
                        model: choice.model.clone(),
                        outcome: AttemptOutcome::NotConfigured {
                            error: error.to_string(),
                        },
                        latency_ms: 0,
                    });
                    last_error = Some(error.to_string());
                    continue;
                }
            };

            let breaker = self.breakers.get(&choice.provider);
            let prepared = Self::prepare(task, &config, request, choice);
            let attempt_started = Instant::now();

            let call = breaker.execute(|| {
                let pending = invoke(provider, prepared);
                async move {
                    let response = pending.await;
                    LlmLogEntry::from_response(task, &response).emit(self.sink.as_ref());
                    if response.success {
                        Ok(response)
                    } else if cancel.is_cancelled() {
                        Err(Error::Cancelled)
                    } else {
                        Err(Error::ProviderFailed {
                            provider: response.provider,
                            message: response.error.unwrap_or_default(),
                        })
                    }
                }
            });

            let outcome = match tokio::time::timeout_at(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(candidate = %choice, timeout_ms = config.timeout_ms, "Routing deadline exceeded");
                    attempts.push(AttemptRecord {
                        provider: choice.provider.clone(),
                        model: choice.model.clone(),
                        outcome: AttemptOutcome::TimedOut,
                        latency_ms: elapsed_ms(attempt_started),
                    });
                    last_error = Some(Error::Timeout(config.timeout_ms).to_string());
                    break;
                }
            };

            match outcome {
                Ok(response) => {
                    info!(
                        candidate = %choice,
                        latency_ms = response.latency_ms,
                        attempts = attempts.len() + 1,
                        "Routed request"
                    );
                    attempts.push(AttemptRecord {
                        provider: choice.provider.clone(),
                        model: choice.model.clone(),
                        outcome: AttemptOutcome::Success,
                        latency_ms: elapsed_ms(attempt_started),
                    });
                    return Ok(RouteReport { response, attempts });
                }
                Err(CircuitBreakerError::Open { retry_after, .. }) => {
                    let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                    let error = Error::CircuitOpen {
                        provider: choice.provider.clone(),
                        retry_after_ms,
                    };
                    debug!(candidate = %choice, "Circuit open, skipping");
                    attempts.push(AttemptRecord {
                        provider: choice.provider.clone(),
                        model: choice.model.clone(),
                        outcome: AttemptOutcome::CircuitOpen { retry_after_ms },
                        latency_ms: 0,
                    });
                    last_error = Some(error.to_string());
                }
                Err(CircuitBreakerError::Inner(Error::Cancelled)) => {
                    info!(candidate = %choice, "Request cancelled");
                    return Err(Error::Cancelled);
                }
                Err(CircuitBreakerError::Inner(error)) => {
                    invocations += 1;
                    let message = match &error {
                        Error::ProviderFailed { message, .. } if !message.is_empty() => message.clone(),
                        other => other.to_string(),
                    };
                    warn!(candidate = %choice, error = %message, "Candidate failed, falling back");
                    attempts.push(AttemptRecord {
                        provider: choice.provider.clone(),
                        model: choice.model.clone(),
                        outcome: AttemptOutcome::Failed {
                            error: message.clone(),
                        },
                        latency_ms: elapsed_ms(attempt_started),
                    });
                    last_error = Some(message);

                    if halt() {
                        debug!("Output already delivered, not falling back");
                        break;
                    }

                    let more_candidates = index + 1 < candidates.len();
                    if more_candidates && invocations < max_invocations {
                        let wake = (Instant::now() + backoff.delay_for(invocations)).min(deadline);
                        debug!(delay_ms = elapsed_ms_until(wake), "Backing off");
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Err(Error::Cancelled),
                            () = tokio::time::sleep_until(wake) => {}
                        }
                    }
                }
            }
        }

        let error = last_error
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "no candidates available".to_string());
        let (provider, model) = last_choice
            .map(|c| (c.provider.clone(), c.model.clone()))
            .unwrap_or_default();
        warn!(task = %task, error = %error, "All candidates failed");

        Ok(RouteReport {
            response: LlmResponse::failure(provider, model, error, elapsed_ms(started)),
            attempts,
        })
    }
}

fn elapsed_ms_until(wake: Instant) -> u64 {
    u64::try_from(wake.saturating_duration_since(Instant::now()).as_millis()).unwrap_or(u64::MAX)
}
