//! Per-call log entries
//!
//! Entries record who served a call and how it went. Response text is never
//! stored; only its SHA-256 digest.

use chrono::{DateTime, Utc};
use clinroute_core::{EventKind, ObservabilitySink};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::request::{LlmResponse, TokenUsage};
use crate::router::TaskType;

/// One adapter invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmLogEntry {
    /// When the call finished
    pub timestamp: DateTime<Utc>,
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Task category
    pub task: TaskType,
    /// Latency from dispatch
    pub latency_ms: u64,
    /// Whether the call succeeded
    pub success: bool,
    /// Error message on failure
    pub error: Option<String>,
    /// Token usage, when reported
    pub usage: Option<TokenUsage>,
    /// Hex SHA-256 of the response content
    pub content_hash: String,
}

impl LlmLogEntry {
    /// Build an entry from a finished call
    #[must_use]
    pub fn from_response(task: TaskType, response: &LlmResponse) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: response.provider.clone(),
            model: response.model.clone(),
            task,
            latency_ms: response.latency_ms,
            success: response.success,
            error: response.error.clone(),
            usage: response.usage.clone(),
            content_hash: content_hash(&response.content),
        }
    }

    /// Send the entry to `sink` as an `llm_call` event
    pub fn emit(&self, sink: &dyn ObservabilitySink) {
        let message = format!(
            "{}/{} {} in {}ms",
            self.provider,
            self.model,
            if self.success { "succeeded" } else { "failed" },
            self.latency_ms
        );
        let metadata = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        sink.emit(EventKind::LlmCall, &message, metadata);
    }
}

/// Hex-encoded SHA-256 digest of `content`
#[must_use]
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
