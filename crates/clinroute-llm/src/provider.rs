//! LLM Provider trait definition
//!
//! Every backend adapter implements [`LlmProvider`]. Adapters never return
//! `Err` for a failed generation: failures come back as an [`LlmResponse`]
//! with `success == false`.

use crate::error::Result;
use crate::request::{LlmRequest, LlmResponse};
use crate::token::{HeuristicEstimator, TokenEstimator};

/// Callback receiving streamed text deltas in order
pub type TokenCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name used for routing and breaker lookup
    fn name(&self) -> &str;

    /// Model used when the request does not name one
    fn default_model(&self) -> &str;

    /// Whether usable credentials are present
    fn is_configured(&self) -> bool;

    /// Reachability probe
    async fn health_check(&self) -> bool;

    /// Model ids reported by the vendor
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Blocking generation call
    async fn send_message(&self, request: &LlmRequest) -> LlmResponse;

    /// Streaming generation call.
    ///
    /// `on_token` receives each text delta; the returned response carries the
    /// full accumulated content. The default delivers the whole completion as
    /// a single delta.
    async fn stream(&self, request: &LlmRequest, on_token: TokenCallback<'_>) -> LlmResponse {
        let response = self.send_message(request).await;
        if response.success && !response.content.is_empty() {
            on_token(&response.content);
        }
        response
    }

    /// Cheap token estimate for `text`
    fn estimate_tokens(&self, text: &str) -> usize {
        HeuristicEstimator.estimate(text)
    }
}
