//! Gemini provider implementation

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use super::config::{DEFAULT_MODEL, GEMINI_API_BASE};
use super::convert::{candidate_text, into_completion};
use crate::error::{Error, Result};
use crate::http::{elapsed_ms, read_json, AuthScheme, HttpTransport};
use crate::provider::{LlmProvider, TokenCallback};
use crate::request::{LlmRequest, LlmResponse, TokenUsage};
use crate::router::ProviderConfig;
use crate::sse::{self, parse_chunk, SseControl};
use crate::token::{HeuristicEstimator, TokenEstimator};
use crate::wire::{GeminiModelList, GenerateContentResponse, VendorRequest};

/// Gemini provider
pub struct GeminiProvider {
    transport: HttpTransport,
    default_model: String,
    estimator: Arc<dyn TokenEstimator>,
}

impl GeminiProvider {
    /// Name used for routing
    pub const NAME: &'static str = "gemini";

    /// Create a new Gemini provider
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let transport = HttpTransport::new(config, GEMINI_API_BASE, AuthScheme::GoogApiKey)?;
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

    async fn generate(&self, request: &LlmRequest, model: &str) -> Result<(String, Option<TokenUsage>)> {
        let body = VendorRequest::generate_content(request, model, false);
        let response = self.transport.post(&body, &request.cancellation).await?;
        let parsed: GenerateContentResponse = read_json(response, &request.cancellation).await?;
        into_completion(parsed)
    }

    async fn stream_generate(
        &self,
        request: &LlmRequest,
        model: &str,
        on_token: TokenCallback<'_>,
    ) -> Result<(String, Option<TokenUsage>)> {
        let body = VendorRequest::generate_content(request, model, true);
        let response = self.transport.post(&body, &request.cancellation).await?;

        let mut content = String::new();
        let mut usage = None;
        sse::drive(response, &request.cancellation, |_event, data| {
            if let Some(chunk) = parse_chunk::<GenerateContentResponse>(data) {
                if let Some(reason) = chunk
                    .prompt_feedback
                    .as_ref()
                    .and_then(|feedback| feedback.block_reason.as_deref())
                {
                    return Err(Error::InvalidResponse(format!("prompt blocked: {reason}")));
                }
                let text = candidate_text(&chunk);
                if !text.is_empty() {
                    on_token(&text);
                    content.push_str(&text);
                }
                if let Some(reported) = chunk.usage_metadata {
                    usage = Some(reported.into());
                }
            }
            Ok(SseControl::Continue)
        })
        .await?;

        Ok((content, usage))
    }

    fn not_configured() -> Error {
        Error::NotConfigured("gemini API key is missing".to_string())
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
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
        let list: GeminiModelList = read_json(response, &cancel).await?;
        let mut models: Vec<String> = list
            .models
            .into_iter()
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect();
        models.sort();
        Ok(models)
    }

    #[instrument(skip(self, request), fields(provider = "gemini", model = %request.model))]
    async fn send_message(&self, request: &LlmRequest) -> LlmResponse {
        let model = request.model_or(&self.default_model).to_string();
        if !self.is_configured() {
            return LlmResponse::failure(Self::NAME, model, Self::not_configured().to_string(), 0);
        }

        let start = Instant::now();
        match self.generate(request, &model).await {
            Ok((content, usage)) => {
                LlmResponse::success(Self::NAME, model, content, elapsed_ms(start)).with_usage(usage)
            }
            Err(e) => {
                warn!(error = %e, "Gemini generate content failed");
                LlmResponse::failure(Self::NAME, model, e.to_string(), elapsed_ms(start))
            }
        }
    }

    #[instrument(skip(self, request, on_token), fields(provider = "gemini", model = %request.model))]
    async fn stream(&self, request: &LlmRequest, on_token: TokenCallback<'_>) -> LlmResponse {
        let model = request.model_or(&self.default_model).to_string();
        if !self.is_configured() {
            return LlmResponse::failure(Self::NAME, model, Self::not_configured().to_string(), 0);
        }

        let start = Instant::now();
        match self.stream_generate(request, &model, on_token).await {
            Ok((content, usage)) => {
                LlmResponse::success(Self::NAME, model, content, elapsed_ms(start)).with_usage(usage)
            }
            Err(e) => {
                warn!(error = %e, "Gemini stream failed");
                LlmResponse::failure(Self::NAME, model, e.to_string(), elapsed_ms(start))
            }
        }
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }
}
