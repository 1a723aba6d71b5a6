//! Vendor wire formats
//!
//! [`VendorRequest`] is the single tagged union of request bodies the HTTP
//! transport knows how to send. Each variant has a dedicated constructor that
//! translates an [`LlmRequest`].

use serde::{Deserialize, Serialize, Serializer};

use crate::request::{LlmRequest, TokenUsage};

/// `max_tokens` used for Messages requests that leave it unset (required field)
pub const DEFAULT_MESSAGES_MAX_TOKENS: u32 = 4096;

/// System prompt suffix asking Messages-API models for JSON output
pub const JSON_MODE_INSTRUCTION: &str =
    "Respond with a single valid JSON object and no other text.";

/// Which field carries the output token limit in a chat-completions body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenField {
    /// `max_tokens` (most OpenAI-compatible vendors)
    #[default]
    MaxTokens,
    /// `max_completion_tokens` (current OpenAI models)
    MaxCompletionTokens,
}

/// Request body for one vendor protocol
#[derive(Debug, Clone)]
pub enum VendorRequest {
    /// OpenAI-style `/chat/completions`
    ChatCompletions(ChatCompletionsBody),
    /// Gemini `/models/{model}:generateContent`
    GenerateContent {
        /// Model addressed in the path
        model: String,
        /// Use the SSE streaming endpoint
        stream: bool,
        /// Body
        body: GenerateContentBody,
    },
    /// Anthropic `/messages`
    Messages(MessagesBody),
}

impl VendorRequest {
    /// Role-tagged message list (system, then user)
    #[must_use]
    pub fn chat_completions(
        request: &LlmRequest,
        model: &str,
        stream: bool,
        token_field: TokenField,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system() {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", request.user_content()));

        let (max_tokens, max_completion_tokens) = match token_field {
            TokenField::MaxTokens => (request.max_tokens, None),
            TokenField::MaxCompletionTokens => (None, request.max_tokens),
        };

        Self::ChatCompletions(ChatCompletionsBody {
            model: model.to_string(),
            messages,
            temperature: request.temperature,
            max_tokens,
            max_completion_tokens,
            response_format: request
                .response_format
                .is_json()
                .then(ChatResponseFormat::json_object),
            stream,
        })
    }

    /// Single user turn as a parts array, system prompt in `systemInstruction`
    #[must_use]
    pub fn generate_content(request: &LlmRequest, model: &str, stream: bool) -> Self {
        let generation_config = GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            response_mime_type: request
                .response_format
                .is_json()
                .then(|| "application/json".to_string()),
        };

        Self::GenerateContent {
            model: model.to_string(),
            stream,
            body: GenerateContentBody {
                contents: vec![GeminiContent::text(Some("user"), request.user_content())],
                system_instruction: request
                    .system()
                    .map(|system| GeminiContent::text(None, system)),
                generation_config: (!generation_config.is_empty()).then_some(generation_config),
            },
        }
    }

    /// Top-level `system` field; JSON mode as a system prompt suffix
    #[must_use]
    pub fn messages(request: &LlmRequest, model: &str, stream: bool) -> Self {
        let system = match (request.system(), request.response_format.is_json()) {
            (Some(system), true) => Some(format!("{system}\n\n{JSON_MODE_INSTRUCTION}")),
            (None, true) => Some(JSON_MODE_INSTRUCTION.to_string()),
            (Some(system), false) => Some(system.to_string()),
            (None, false) => None,
        };

        Self::Messages(MessagesBody {
            model: model.to_string(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MESSAGES_MAX_TOKENS),
            system,
            messages: vec![ChatMessage::new("user", request.user_content())],
            temperature: request.temperature,
            stream,
        })
    }

    /// Path relative to the provider base URL
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::ChatCompletions(_) => "/chat/completions".to_string(),
            Self::GenerateContent {
                model,
                stream: false,
                ..
            } => format!("/models/{model}:generateContent"),
            Self::GenerateContent {
                model,
                stream: true,
                ..
            } => format!("/models/{model}:streamGenerateContent?alt=sse"),
            Self::Messages(_) => "/messages".to_string(),
        }
    }

    /// Whether the response is an SSE stream
    #[must_use]
    pub fn is_stream(&self) -> bool {
        match self {
            Self::ChatCompletions(body) => body.stream,
            Self::GenerateContent { stream, .. } => *stream,
            Self::Messages(body) => body.stream,
        }
    }

    /// Model the request targets
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::ChatCompletions(body) => &body.model,
            Self::GenerateContent { model, .. } => model,
            Self::Messages(body) => &body.model,
        }
    }
}

impl Serialize for VendorRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::ChatCompletions(body) => body.serialize(serializer),
            Self::GenerateContent { body, .. } => body.serialize(serializer),
            Self::Messages(body) => body.serialize(serializer),
        }
    }
}

// ============================================================================
// Chat completions
// ============================================================================

/// Role-tagged message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// `response_format` flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponseFormat {
    /// Always `json_object` when present
    #[serde(rename = "type")]
    pub kind: String,
}

impl ChatResponseFormat {
    fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

/// Chat completions request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionsBody {
    /// Model id
    pub model: String,
    /// System then user message
    pub messages: Vec<ChatMessage>,
    /// Temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output limit for compatible vendors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Output limit for OpenAI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// JSON mode flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ChatResponseFormat>,
    /// SSE streaming
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionsResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: Option<String>,
}

/// One streamed chat completions chunk
#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChatChunkChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunkChoice {
    #[serde(default)]
    pub delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatDelta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// `GET /models` listing shared by OpenAI-style and Anthropic APIs
#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelEntry {
    pub id: String,
}

// ============================================================================
// Gemini generate content
// ============================================================================

/// Gemini request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody {
    /// Conversation turns
    pub contents: Vec<GeminiContent>,
    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    /// Sampling and output options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// Gemini content (one turn)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    /// `user` or `model`; absent for system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart {
                text: Some(text.into()),
            }],
        }
    }
}

/// Gemini part (text only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiPart {
    /// Text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Gemini generation config
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// `application/json` in JSON mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.max_output_tokens.is_none()
            && self.response_mime_type.is_none()
    }
}

/// Gemini response, also the shape of each streamed chunk
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    pub usage_metadata: Option<UsageMetadata>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiCandidate {
    pub content: Option<GeminiContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(usage: UsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiModelList {
    #[serde(default)]
    pub models: Vec<GeminiModelEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiModelEntry {
    pub name: String,
}

// ============================================================================
// Anthropic messages
// ============================================================================

/// Anthropic request body
#[derive(Debug, Clone, Serialize)]
pub struct MessagesBody {
    /// Model id
    pub model: String,
    /// Required output limit
    pub max_tokens: u32,
    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User turn
    pub messages: Vec<ChatMessage>,
    /// Temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// SSE streaming
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<MessagesBlock>,
    pub usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessagesUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Payload of a named Messages SSE event
#[derive(Debug, Deserialize)]
pub(crate) struct MessagesStreamEvent {
    pub delta: Option<MessagesDelta>,
    pub message: Option<MessagesStreamMessage>,
    pub usage: Option<MessagesUsage>,
    pub error: Option<MessagesStreamError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesDelta {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesStreamMessage {
    pub usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesStreamError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
