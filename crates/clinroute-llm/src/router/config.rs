//! Configuration types for providers and routing
//!
//! Both are supplied by the caller; the router never mutates or persists them.

use super::types::TaskType;
use crate::error::{Error, Result};
use crate::token::TokenBudget;
use crate::util::mask_api_key;
use clinroute_core::Backoff;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Provider Configuration
// ============================================================================

/// Credentials and connection settings for one provider
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Organization id (OpenAI)
    #[serde(default)]
    pub organization: Option<String>,
    /// Default model
    #[serde(default)]
    pub default_model: Option<String>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// HTTP client timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// SECURITY: Custom Debug implementation to mask API key
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("default_model", &self.default_model)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ProviderConfig {
    /// Default HTTP client timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a configuration with an API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the organization id
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Add a custom header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the HTTP client timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// HTTP client timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map_or(Self::DEFAULT_TIMEOUT, Duration::from_millis)
    }

    /// Whether an API key is present
    #[must_use]
    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

// ============================================================================
// Routing Configuration
// ============================================================================

/// A (provider, model) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelChoice {
    /// Provider name (e.g., "openai", "gemini", "anthropic")
    pub provider: String,
    /// Model name (e.g., "gpt-4o-mini", "gemini-2.0-flash")
    pub model: String,
}

impl ModelChoice {
    /// Create a new model choice
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl std::str::FromStr for ModelChoice {
    type Err = Error;

    /// Parse `provider/model`; the model part may itself contain `/`
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            }
            _ => Err(Error::Config(format!(
                "expected provider/model, got '{s}'"
            ))),
        }
    }
}

/// Preferred model for a task plus ordered fallbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Task this rule applies to
    pub task: TaskType,
    /// First candidate
    pub preferred: ModelChoice,
    /// Tried in order after the preferred pair
    #[serde(default)]
    pub fallbacks: Vec<ModelChoice>,
}

impl RoutingRule {
    /// Create a rule without fallbacks
    #[must_use]
    pub fn new(task: TaskType, preferred: ModelChoice) -> Self {
        Self {
            task,
            preferred,
            fallbacks: Vec::new(),
        }
    }

    /// Append a fallback
    #[must_use]
    pub fn with_fallback(mut self, fallback: ModelChoice) -> Self {
        self.fallbacks.push(fallback);
        self
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    60_000
}

/// Router configuration, immutable for a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Global default pair
    pub default: ModelChoice,
    /// Global fallback pair, tried last
    #[serde(default)]
    pub fallback: Option<ModelChoice>,
    /// Per-task rules
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    /// Extra real invocations allowed after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay after the first real failure
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Multiplier applied per subsequent failure
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Wall-clock budget for one routing decision
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Per-task overrides of the built-in token budgets
    #[serde(default)]
    pub token_budgets: HashMap<TaskType, TokenBudget>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default: ModelChoice::new("openai", "gpt-4o-mini"),
            fallback: None,
            rules: Vec::new(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            token_budgets: HashMap::new(),
        }
    }
}

impl RouterConfig {
    /// Create a configuration with a default pair
    #[must_use]
    pub fn new(default: ModelChoice) -> Self {
        Self {
            default,
            ..Default::default()
        }
    }

    /// Set the global fallback
    #[must_use]
    pub fn with_fallback(mut self, fallback: ModelChoice) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Add a routing rule
    #[must_use]
    pub fn with_rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff parameters
    #[must_use]
    pub fn with_backoff(mut self, retry_delay_ms: u64, multiplier: f64, max_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self.backoff_multiplier = multiplier;
        self.max_retry_delay_ms = max_delay_ms;
        self
    }

    /// Set the overall timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Override the token budget for one task
    #[must_use]
    pub fn with_token_budget(mut self, task: TaskType, budget: TokenBudget) -> Self {
        self.token_budgets.insert(task, budget);
        self
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        check_choice(&self.default, "default")?;
        if let Some(fallback) = &self.fallback {
            check_choice(fallback, "fallback")?;
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.task) {
                return Err(Error::Config(format!(
                    "duplicate routing rule for task {}",
                    rule.task
                )));
            }
            check_choice(&rule.preferred, rule.task.as_str())?;
            for fallback in &rule.fallbacks {
                check_choice(fallback, rule.task.as_str())?;
            }
        }

        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(Error::Config(
                "max_retry_delay_ms must not be below retry_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Rule for `task`, if any
    #[must_use]
    pub fn rule_for(&self, task: TaskType) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.task == task)
    }

    /// Candidate chain for `task`:
    /// preferred, fallbacks, default, global fallback, first occurrence kept
    #[must_use]
    pub fn candidates(&self, task: TaskType) -> Vec<ModelChoice> {
        let rule = self.rule_for(task);
        let chain = rule
            .map(|r| &r.preferred)
            .into_iter()
            .chain(rule.into_iter().flat_map(|r| r.fallbacks.iter()))
            .chain(std::iter::once(&self.default))
            .chain(self.fallback.iter());

        let mut seen = HashSet::new();
        chain
            .filter(|choice| seen.insert(*choice))
            .cloned()
            .collect()
    }

    /// Token budget for `task` (override or built-in default)
    #[must_use]
    pub fn budget_for(&self, task: TaskType) -> TokenBudget {
        self.token_budgets
            .get(&task)
            .copied()
            .unwrap_or_else(|| task.default_token_budget())
    }

    /// Backoff policy
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_retry_delay_ms),
        )
    }

    /// Overall timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn check_choice(choice: &ModelChoice, context: &str) -> Result<()> {
    if choice.provider.trim().is_empty() || choice.model.trim().is_empty() {
        return Err(Error::Config(format!(
            "{context}: provider and model must not be empty"
        )));
    }
    Ok(())
}
