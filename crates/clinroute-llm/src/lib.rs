//! Clinroute LLM - provider adapters and task routing
//!
//! This crate provides the model-facing half of clinroute:
//! - Router: task-based candidate chains with breakers, retry budget and timeout
//! - OpenAI: Chat Completions, plus compatible presets (Groq, DeepSeek, OpenRouter, Together)
//! - Gemini: Google `generateContent`
//! - Anthropic: Claude Messages API
//! - Consensus: concurrent multi-model answers with an agreement score

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod consensus;
pub mod error;
pub mod gemini;
pub(crate) mod http;
pub mod log_entry;
pub mod openai;
pub mod provider;
pub mod request;
pub mod router;
pub(crate) mod sse;
pub mod token;
pub mod util;
pub mod wire;

pub use consensus::{agreement_score, ConsensusOrchestrator, ConsensusResult};
pub use error::{Error, Result};
pub use log_entry::LlmLogEntry;
pub use provider::{LlmProvider, TokenCallback};
pub use request::{LlmRequest, LlmResponse, ResponseFormat, TokenUsage};
pub use router::{
    AttemptOutcome, AttemptRecord, LlmRouter, MockProvider, MockReply, ModelChoice,
    ProviderConfig, ProviderStatus, RouteReport, RouterConfig, RoutingRule, TaskType,
};
pub use token::{HeuristicEstimator, TiktokenEstimator, TokenBudget, TokenEstimator};

// Re-export provider types
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::{OpenAiProvider, Preset};

// Cancellation token carried by every request
pub use tokio_util::sync::CancellationToken;
