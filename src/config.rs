//! Application configuration
//!
//! Loaded from embedded defaults, optional files and `CLINROUTE_*`
//! environment variables, then turned into a ready router.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clinroute_core::{BreakerRegistry, CircuitBreakerConfig};
use clinroute_llm::{
    gemini, AnthropicProvider, GeminiProvider, LlmProvider, LlmRouter, ModelChoice,
    OpenAiProvider, Preset, ProviderConfig, RouterConfig,
};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Providers registered even when absent from the config file
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "gemini", "anthropic", "groq", "deepseek", "openrouter"];

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub router: RouterConfig,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub consensus: ConsensusSettings,
}

/// Circuit breaker settings shared by every provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_secs() -> u64 {
    30
}
fn default_failure_window_secs() -> u64 {
    60
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            failure_window_secs: default_failure_window_secs(),
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.failure_threshold)
            .with_reset_timeout(Duration::from_secs(self.reset_timeout_secs))
            .with_failure_window(Duration::from_secs(self.failure_window_secs))
    }
}

/// Models asked by `clinroute consensus` when none are given
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusSettings {
    #[serde(default)]
    pub models: Vec<ModelChoice>,
    #[serde(default)]
    pub critic: Option<ModelChoice>,
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        // prefix_separator("_") keeps CLINROUTE_ROUTER__MAX_RETRIES working
        .add_source(
            Environment::with_prefix("CLINROUTE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Environment variables consulted for a provider's key, in order
pub fn api_key_env_vars(provider: &str) -> Vec<&'static str> {
    match provider {
        "gemini" => gemini::API_KEY_ENV_VARS.to_vec(),
        "anthropic" => vec!["ANTHROPIC_API_KEY"],
        other => Preset::from_name(other).api_key_env().into_iter().collect(),
    }
}

fn resolve_key(provider: &str, mut config: ProviderConfig) -> ProviderConfig {
    if config.api_key.trim().is_empty() {
        if let Some(key) = api_key_env_vars(provider)
            .into_iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        {
            config.api_key = key;
        }
    }
    config
}

fn build_provider(name: &str, config: ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match name {
        "gemini" => Arc::new(GeminiProvider::new(config)?),
        "anthropic" => Arc::new(AnthropicProvider::new(config)?),
        other => Arc::new(OpenAiProvider::new(Preset::from_name(other), config)?),
    };
    Ok(provider)
}

impl AppConfig {
    /// Provider configs for every known and configured provider, keys resolved
    pub fn provider_configs(&self) -> BTreeMap<String, ProviderConfig> {
        let mut configs: BTreeMap<String, ProviderConfig> = KNOWN_PROVIDERS
            .iter()
            .map(|name| ((*name).to_string(), ProviderConfig::default()))
            .collect();
        configs.extend(self.providers.clone());
        configs
            .into_iter()
            .map(|(name, config)| {
                let config = resolve_key(&name, config);
                (name, config)
            })
            .collect()
    }

    /// Build the router with every provider registered
    pub fn build_router(&self) -> Result<LlmRouter> {
        let breakers = Arc::new(BreakerRegistry::new(self.breaker.to_config()));
        let mut router = LlmRouter::new(self.router.clone(), breakers)
            .context("Invalid router configuration")?;

        for (name, config) in self.provider_configs() {
            match build_provider(&name, config) {
                Ok(provider) => {
                    if provider.is_configured() {
                        info!(provider = %name, "Registered LLM provider");
                    } else {
                        debug!(provider = %name, "Registered provider without credentials");
                    }
                    router.register(provider);
                }
                Err(e) => warn!(provider = %name, error = %e, "Skipping provider"),
            }
        }

        info!(
            configured = ?router.configured_providers(),
            "LLM Router initialized"
        );
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinroute_llm::TaskType;

    fn defaults() -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let config = defaults();
        config.router.validate().unwrap();
        assert_eq!(config.router.default, ModelChoice::new("openai", "gpt-4o-mini"));
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.consensus.models.len(), 3);

        let chain = config.router.candidates(TaskType::NoteGeneration);
        assert_eq!(chain[0].provider, "anthropic");
        assert_eq!(chain.last().map(|c| c.provider.as_str()), Some("gemini"));
    }

    #[test]
    fn test_known_providers_always_present() {
        let configs = defaults().provider_configs();
        for name in KNOWN_PROVIDERS {
            assert!(configs.contains_key(*name), "missing {name}");
        }
    }

    #[test]
    fn test_api_key_env_vars() {
        assert_eq!(api_key_env_vars("gemini"), vec!["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
        assert_eq!(api_key_env_vars("anthropic"), vec!["ANTHROPIC_API_KEY"]);
        assert_eq!(api_key_env_vars("deepseek"), vec!["DEEPSEEK_API_KEY"]);
        assert!(api_key_env_vars("local").is_empty());
    }

    #[test]
    fn test_explicit_key_wins() {
        let config = resolve_key("openai", ProviderConfig::new("sk-from-file"));
        assert_eq!(config.api_key, "sk-from-file");
    }

    #[test]
    fn test_custom_provider_needs_base_url() {
        assert!(build_provider("local", ProviderConfig::new("k")).is_err());
        let provider = build_provider(
            "local",
            ProviderConfig::new("k").with_base_url("http://localhost:8080/v1"),
        )
        .unwrap();
        assert_eq!(provider.name(), "local");
    }

    #[tokio::test]
    async fn test_build_router_registers_known_providers() {
        let router = defaults().build_router().unwrap();
        let names = router.list_providers();
        for name in KNOWN_PROVIDERS {
            assert!(names.contains(name));
        }
    }
}
