//! Request and response contract shared by every provider
//!
//! Callers build an [`LlmRequest`] and always get an [`LlmResponse`] back,
//! whichever backend served it.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Desired shape of the generated text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// A single JSON object
    Json,
    /// Markdown text
    Markdown,
    /// Clinical note prose
    Note,
    /// Plain text
    #[default]
    Text,
}

impl ResponseFormat {
    /// Whether the vendor should be asked for JSON output
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create usage, deriving the total
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Uniform generation request
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Model to use; empty means the provider's default
    pub model: String,
    /// System prompt
    pub system_prompt: Option<String>,
    /// User prompt
    pub user_prompt: String,
    /// Structured context appended to the user turn
    pub context: Option<serde_json::Value>,
    /// Desired response format
    pub response_format: ResponseFormat,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Cancels the in-flight call when fired
    pub cancellation: CancellationToken,
}

impl LlmRequest {
    /// Create a request with a user prompt
    #[must_use]
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Attach structured context
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set response format
    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Use an external cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Model to send, falling back to `default_model` when unset
    #[must_use]
    pub fn model_or<'a>(&'a self, default_model: &'a str) -> &'a str {
        if self.model.is_empty() {
            default_model
        } else {
            &self.model
        }
    }

    /// System prompt, or `None` when absent or blank
    #[must_use]
    pub fn system(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// User turn text: the prompt followed by the rendered context, if any
    #[must_use]
    pub fn user_content(&self) -> String {
        match &self.context {
            None | Some(serde_json::Value::Null) => self.user_prompt.clone(),
            Some(serde_json::Value::String(text)) => {
                format!("{}\n\nContext:\n{}", self.user_prompt, text)
            }
            Some(value) => {
                let rendered =
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                format!("{}\n\nContext:\n{}", self.user_prompt, rendered)
            }
        }
    }
}

/// Uniform generation response.
///
/// Always fully populated; failures carry an error message and empty content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Whether the call succeeded
    pub success: bool,
    /// Generated text (empty on failure)
    pub content: String,
    /// Provider that served (or failed) the call
    pub provider: String,
    /// Model used
    pub model: String,
    /// Token usage, when reported
    pub usage: Option<TokenUsage>,
    /// Latency measured from dispatch
    pub latency_ms: u64,
    /// Error message on failure
    pub error: Option<String>,
}

impl LlmResponse {
    /// Successful response
    #[must_use]
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            success: true,
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            usage: None,
            latency_ms,
            error: None,
        }
    }

    /// Failed response
    #[must_use]
    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            success: false,
            content: String::new(),
            provider: provider.into(),
            model: model.into(),
            usage: None,
            latency_ms,
            error: Some(error.into()),
        }
    }

    /// Attach token usage
    #[must_use]
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Error message, or an empty string
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_content_appends_context() {
        let request = LlmRequest::new("Summarize the visit")
            .with_context(serde_json::json!({"bp": "120/80"}));
        let content = request.user_content();
        assert!(content.starts_with("Summarize the visit\n\nContext:\n"));
        assert!(content.contains("\"bp\": \"120/80\""));

        let plain = LlmRequest::new("hi");
        assert_eq!(plain.user_content(), "hi");
    }

    #[test]
    fn test_model_or_default() {
        let request = LlmRequest::new("hi");
        assert_eq!(request.model_or("gpt-4o-mini"), "gpt-4o-mini");
        let request = request.with_model("gpt-4o");
        assert_eq!(request.model_or("gpt-4o-mini"), "gpt-4o");
    }

    #[test]
    fn test_blank_system_prompt_is_absent() {
        let request = LlmRequest::new("hi").with_system_prompt("  ");
        assert!(request.system().is_none());
    }

    #[test]
    fn test_failure_shape() {
        let response = LlmResponse::failure("openai", "gpt-4o", "api error (status 429)", 12);
        assert!(!response.success);
        assert!(response.content.is_empty());
        assert_eq!(response.error_message(), "api error (status 429)");
        assert_eq!(response.latency_ms, 12);
    }

    #[test]
    fn test_response_format_serialization() {
        let json = serde_json::to_string(&ResponseFormat::Json).unwrap();
        assert_eq!(json, "\"json\"");
        assert!(ResponseFormat::Json.is_json());
        assert!(!ResponseFormat::Note.is_json());
    }
}
