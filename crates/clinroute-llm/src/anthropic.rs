//! Anthropic - Claude messages provider
//!
//! The Messages API carries the system prompt in a top-level field, requires
//! `max_tokens` and frames streams with named SSE events.

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
use crate::wire::{MessagesResponse, MessagesStreamEvent, ModelList, VendorRequest};

/// Anthropic API base URL
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

/// Default Claude model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Anthropic provider
pub struct AnthropicProvider {
    transport: HttpTransport,
    default_model: String,
    estimator: Arc<dyn TokenEstimator>,
}

impl AnthropicProvider {
    /// Name used for routing
    pub const NAME: &'static str = "anthropic";

    /// Create a new Anthropic provider
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let transport = HttpTransport::new(config, ANTHROPIC_API_BASE, AuthScheme::Anthropic)?;
        Ok(Self {
            transport,
            default_model,
            estimator: Arc::new(HeuristicEstimator),
        })
    }

    /// Use a different token estimator
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    async fn create_message(&self, request: &LlmRequest, model: &str) -> Result<(String, Option<TokenUsage>)> {
        let body = VendorRequest::messages(request, model, false);
        let response = self.transport.post(&body, &request.cancellation).await?;
        let parsed: MessagesResponse = read_json(response, &request.cancellation).await?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));
        Ok((content, usage))
    }

    async fn stream_message(
        &self,
        request: &LlmRequest,
        model: &str,
        on_token: TokenCallback<'_>,
    ) -> Result<(String, Option<TokenUsage>)> {
        let body = VendorRequest::messages(request, model, true);
        let response = self.transport.post(&body, &request.cancellation).await?;

        let mut content = String::new();
        let mut input_tokens = None;
        let mut output_tokens = None;
        sse::drive(response, &request.cancellation, |event, data| {
            match event {
                "message_stop" => return Ok(SseControl::Stop),
                "message_start" => {
                    if let Some(usage) = parse_chunk::<MessagesStreamEvent>(data)
                        .and_then(|e| e.message)
                        .and_then(|m| m.usage)
                    {
                        input_tokens = Some(usage.input_tokens);
                    }
                }
                "content_block_delta" => {
                    let text = parse_chunk::<MessagesStreamEvent>(data)
                        .and_then(|e| e.delta)
                        .filter(|d| d.kind.as_deref().map_or(true, |k| k == "text_delta"))
                        .and_then(|d| d.text);
                    if let Some(text) = text.filter(|t| !t.is_empty()) {
                        on_token(&text);
                        content.push_str(&text);
                    }
                }
                "message_delta" => {
                    if let Some(usage) = parse_chunk::<MessagesStreamEvent>(data).and_then(|e| e.usage) {
                        output_tokens = Some(usage.output_tokens);
                    }
                }
                "error" => {
                    let message = parse_chunk::<MessagesStreamEvent>(data)
                        .and_then(|e| e.error)
                        .map_or_else(|| data.to_string(), |e| format!("{}: {}", e.kind, e.message));
                    return Err(Error::InvalidResponse(format!("stream error: {message}")));
                }
                _ => {}
            }
            Ok(SseControl::Continue)
        })
        .await?;

        let usage = match (input_tokens, output_tokens) {
            (None, None) => None,
            (input, output) => Some(TokenUsage::new(input.unwrap_or(0), output.unwrap_or(0))),
        };
        Ok((content, usage))
    }

    fn not_configured() -> Error {
        Error::NotConfigured("anthropic API key is missing".to_string())
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        Self::NAME
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
            return Err(Self::not_configured());
        }
        let cancel = CancellationToken::new();
        let response = self.transport.get("/models", &cancel).await?;
        let list: ModelList = read_json(response, &cancel).await?;
        let mut models: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        models.sort();
        Ok(models)
    }

    #[instrument(skip(self, request), fields(provider = "anthropic", model = %request.model))]
    async fn send_message(&self, request: &LlmRequest) -> LlmResponse {
        let model = request.model_or(&self.default_model).to_string();
        if !self.is_configured() {
            return LlmResponse::failure(Self::NAME, model, Self::not_configured().to_string(), 0);
        }

        let start = Instant::now();
        match self.create_message(request, &model).await {
            Ok((content, usage)) => {
                LlmResponse::success(Self::NAME, model, content, elapsed_ms(start)).with_usage(usage)
            }
            Err(e) => {
                warn!(error = %e, "Anthropic message failed");
                LlmResponse::failure(Self::NAME, model, e.to_string(), elapsed_ms(start))
            }
        }
    }

    #[instrument(skip(self, request, on_token), fields(provider = "anthropic", model = %request.model))]
    async fn stream(&self, request: &LlmRequest, on_token: TokenCallback<'_>) -> LlmResponse {
        let model = request.model_or(&self.default_model).to_string();
        if !self.is_configured() {
            return LlmResponse::failure(Self::NAME, model, Self::not_configured().to_string(), 0);
        }

        let start = Instant::now();
        match self.stream_message(request, &model, on_token).await {
            Ok((content, usage)) => {
                LlmResponse::success(Self::NAME, model, content, elapsed_ms(start)).with_usage(usage)
            }
            Err(e) => {
                warn!(error = %e, "Anthropic stream failed");
                LlmResponse::failure(Self::NAME, model, e.to_string(), elapsed_ms(start))
            }
        }
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }
}
