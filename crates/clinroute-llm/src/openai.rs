//! OpenAI and OpenAI-compatible chat completions providers
//!
//! One adapter serves OpenAI itself and every vendor speaking the same
//! `/chat/completions` protocol; a [`Preset`] supplies the vendor's name,
//! base URL, default model and token-limit field.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::error::{Error, Result};
use crate::http::{elapsed_ms, read_json, AuthScheme, HttpTransport};
use crate::provider::{LlmProvider, TokenCallback};
use crate::request::{LlmRequest, LlmResponse, TokenUsage};
use crate::router::ProviderConfig;
use crate::sse::{self, parse_chunk, SseControl};
use crate::token::{HeuristicEstimator, TokenEstimator};
use crate::wire::{ChatChunk, ChatCompletionsResponse, ModelList, TokenField, VendorRequest};

/// OpenAI API base URL
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default OpenAI model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Vendor presets for the chat completions protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preset {
    /// OpenAI
    OpenAi,
    /// Groq
    Groq,
    /// DeepSeek
    DeepSeek,
    /// OpenRouter
    OpenRouter,
    /// Together AI
    Together,
    /// Any other compatible endpoint; requires a base URL
    Custom {
        /// Provider name used for routing
        name: String,
    },
}

impl Preset {
    /// Look up a preset by provider name
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "openai" => Self::OpenAi,
            "groq" => Self::Groq,
            "deepseek" => Self::DeepSeek,
            "openrouter" => Self::OpenRouter,
            "together" => Self::Together,
            other => Self::Custom {
                name: other.to_string(),
            },
        }
    }

    /// Provider name used for routing and breaker lookup
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
            Self::Together => "together",
            Self::Custom { name } => name,
        }
    }

    /// Vendor base URL, if known
    #[must_use]
    pub fn base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some(OPENAI_API_BASE),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Together => Some("https://api.together.xyz/v1"),
            Self::Custom { .. } => None,
        }
    }

    /// Model used when neither the request nor the config names one
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi | Self::Custom { .. } => DEFAULT_MODEL,
            Self::Groq => "llama-3.3-70b-versatile",
            Self::DeepSeek => "deepseek-chat",
            Self::OpenRouter => "openai/gpt-4o-mini",
            Self::Together => "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        }
    }

    /// Field carrying the output token limit
    #[must_use]
    pub fn token_field(&self) -> TokenField {
        match self {
            Self::OpenAi => TokenField::MaxCompletionTokens,
            _ => TokenField::MaxTokens,
        }
    }

    /// Conventional environment variable holding the vendor's key
    #[must_use]
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Together => Some("TOGETHER_API_KEY"),
            Self::Custom { .. } => None,
        }
    }
}

/// Chat completions provider
pub struct OpenAiProvider {
    preset: Preset,
    transport: HttpTransport,
    default_model: String,
    estimator: Arc<dyn TokenEstimator>,
}

impl OpenAiProvider {
    /// Create a provider for `preset`
    ///
    /// # Errors
    /// Returns an error if a custom preset has no base URL or the HTTP client
    /// cannot be created.
    pub fn new(preset: Preset, config: ProviderConfig) -> Result<Self> {
        let base_url = match (preset.base_url(), &config.base_url) {
            (_, Some(url)) => url.clone(),
            (Some(url), None) => url.to_string(),
            (None, None) => {
                return Err(Error::Config(format!(
                    "provider '{}' requires a base_url",
                    preset.name()
                )))
            }
        };
        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| preset.default_model().to_string());
        let transport = HttpTransport::new(config, &base_url, AuthScheme::Bearer)?;

        Ok(Self {
            preset,
            transport,
            default_model,
            estimator: Arc::new(HeuristicEstimator),
        })
    }

    /// OpenAI provider
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn openai(config: ProviderConfig) -> Result<Self> {
        Self::new(Preset::OpenAi, config)
    }

    /// Use a different token estimator
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    async fn complete(&self, request: &LlmRequest, model: &str) -> Result<(String, Option<TokenUsage>)> {
        let body = VendorRequest::chat_completions(request, model, false, self.preset.token_field());
        let response = self.transport.post(&body, &request.cancellation).await?;
        let parsed: ChatCompletionsResponse = read_json(response, &request.cancellation).await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        Ok((content, parsed.usage.map(Into::into)))
    }

    async fn stream_chat(
        &self,
        request: &LlmRequest,
        model: &str,
        on_token: TokenCallback<'_>,
    ) -> Result<(String, Option<TokenUsage>)> {
        let body = VendorRequest::chat_completions(request, model, true, self.preset.token_field());
        let response = self.transport.post(&body, &request.cancellation).await?;

        let mut content = String::new();
        let mut usage = None;
        sse::drive(response, &request.cancellation, |_event, data| {
            if let Some(chunk) = parse_chunk::<ChatChunk>(data) {
                if let Some(reported) = chunk.usage {
                    usage = Some(reported.into());
                }
                for choice in chunk.choices {
                    match choice.delta.content {
                        Some(text) if !text.is_empty() => {
                            on_token(&text);
                            content.push_str(&text);
                        }
                        _ => {}
                    }
                }
            }
            Ok(SseControl::Continue)
        })
        .await?;

        Ok((content, usage))
    }

    fn not_configured(&self) -> Error {
        Error::NotConfigured(format!("{} API key is missing", self.preset.name()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.preset.name()
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn is_configured(&self) -> bool {
        self.transport.config().has_key()
    }

    async fn health_check(&self) -> bool {
        self.is_configured()
            && self
                .transport
                .get("/models", &CancellationToken::new())
                .await
                .is_ok()
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        if !self.is_configured() {
            return Err(self.not_configured());
        }
        let cancel = CancellationToken::new();
        let response = self.transport.get("/models", &cancel).await?;
        let list: ModelList = read_json(response, &cancel).await?;
        let mut models: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        models.sort();
        Ok(models)
    }

    #[instrument(skip(self, request), fields(provider = %self.preset.name(), model = %request.model))]
    async fn send_message(&self, request: &LlmRequest) -> LlmResponse {
        let model = request.model_or(&self.default_model).to_string();
        if !self.is_configured() {
            return LlmResponse::failure(self.name(), model, self.not_configured().to_string(), 0);
        }

        let start = Instant::now();
        match self.complete(request, &model).await {
            Ok((content, usage)) => {
                LlmResponse::success(self.name(), model, content, elapsed_ms(start)).with_usage(usage)
            }
            Err(e) => {
                warn!(provider = %self.name(), error = %e, "Chat completion failed");
                LlmResponse::failure(self.name(), model, e.to_string(), elapsed_ms(start))
            }
        }
    }

    #[instrument(skip(self, request, on_token), fields(provider = %self.preset.name(), model = %request.model))]
    async fn stream(&self, request: &LlmRequest, on_token: TokenCallback<'_>) -> LlmResponse {
        let model = request.model_or(&self.default_model).to_string();
        if !self.is_configured() {
            return LlmResponse::failure(self.name(), model, self.not_configured().to_string(), 0);
        }

        let start = Instant::now();
        match self.stream_chat(request, &model, on_token).await {
            Ok((content, usage)) => {
                LlmResponse::success(self.name(), model, content, elapsed_ms(start)).with_usage(usage)
            }
            Err(e) => {
                warn!(provider = %self.name(), error = %e, "Chat completion stream failed");
                LlmResponse::failure(self.name(), model, e.to_string(), elapsed_ms(start))
            }
        }
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }
}
