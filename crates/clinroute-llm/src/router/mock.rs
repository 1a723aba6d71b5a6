//! Scriptable mock provider for tests and dry runs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::provider::{LlmProvider, TokenCallback};
use crate::request::{LlmRequest, LlmResponse};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful response with this content
    Text(String),
    /// Failure response with this error
    Fail(String),
    /// Successful response streamed as these deltas
    Chunks(Vec<String>),
    /// Wait, then produce the inner reply (cancellable)
    Delayed(Duration, Box<MockReply>),
    /// Block until the request is cancelled
    UntilCancelled,
}

impl MockReply {
    /// Successful text reply
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Failure reply
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    /// Delay this reply
    #[must_use]
    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// A mock LLM provider that returns queued replies or a default one.
pub struct MockProvider {
    name: String,
    default_model: String,
    configured: bool,
    replies: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    calls: AtomicUsize,
    models: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Create a mock named `name` answering "mock response" by default
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_model: "mock-model".to_string(),
            configured: true,
            replies: Mutex::new(VecDeque::new()),
            fallback: MockReply::text("mock response"),
            calls: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the queue is empty
    #[must_use]
    pub fn with_default_reply(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Report missing credentials
    #[must_use]
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Queue a reply
    #[must_use]
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Add a reply to the queue
    pub fn push_reply(&self, reply: MockReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Number of generation calls received
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Models requested, in call order
    #[must_use]
    pub fn requested_models(&self) -> Vec<String> {
        self.models.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_reply(&self, request: &LlmRequest) -> (String, MockReply) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model_or(&self.default_model).to_string();
        self.models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(model.clone());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        (model, reply)
    }

    async fn resolve(
        &self,
        request: &LlmRequest,
        mut on_token: Option<TokenCallback<'_>>,
    ) -> LlmResponse {
        let (model, mut reply) = self.next_reply(request);
        let cancelled = || LlmResponse::failure(&self.name, &model, Error::Cancelled.to_string(), 0);

        loop {
            reply = match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::select! {
                        biased;
                        () = request.cancellation.cancelled() => return cancelled(),
                        () = tokio::time::sleep(delay) => *inner,
                    }
                }
                MockReply::UntilCancelled => {
                    request.cancellation.cancelled().await;
                    return cancelled();
                }
                MockReply::Text(content) => {
                    if let Some(callback) = on_token.as_mut() {
                        callback(&content);
                    }
                    return LlmResponse::success(&self.name, &model, content, 0);
                }
                MockReply::Chunks(chunks) => {
                    if let Some(callback) = on_token.as_mut() {
                        for chunk in &chunks {
                            callback(chunk);
                        }
                    }
                    return LlmResponse::success(&self.name, &model, chunks.concat(), 0);
                }
                MockReply::Fail(error) => {
                    return LlmResponse::failure(&self.name, &model, error, 0);
                }
            };
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn health_check(&self) -> bool {
        self.configured
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![self.default_model.clone()])
    }

    async fn send_message(&self, request: &LlmRequest) -> LlmResponse {
        self.resolve(request, None).await
    }

    async fn stream(&self, request: &LlmRequest, on_token: TokenCallback<'_>) -> LlmResponse {
        self.resolve(request, Some(on_token)).await
    }
}
