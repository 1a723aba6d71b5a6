//! Task categories used for routing

use crate::token::TokenBudget;
use serde::{Deserialize, Serialize};

/// Task category label carried by every routed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Short question needing a fast answer
    FastQuery,
    /// Drafting a clinical note
    NoteGeneration,
    /// Condensing a record or conversation
    Summarization,
    /// Pulling structured data out of text
    Extraction,
    /// Code generation and modification
    Coding,
    /// General conversation
    Conversation,
    /// Reviewing other model outputs
    Critique,
}

impl TaskType {
    /// All task types, in declaration order
    pub const ALL: [TaskType; 7] = [
        Self::FastQuery,
        Self::NoteGeneration,
        Self::Summarization,
        Self::Extraction,
        Self::Coding,
        Self::Conversation,
        Self::Critique,
    ];

    /// Stable snake_case label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastQuery => "fast_query",
            Self::NoteGeneration => "note_generation",
            Self::Summarization => "summarization",
            Self::Extraction => "extraction",
            Self::Coding => "coding",
            Self::Conversation => "conversation",
            Self::Critique => "critique",
        }
    }

    /// Get the default token budget for this task type
    ///
    /// - FastQuery: short answers (512 tokens)
    /// - Extraction: structured output, deterministic (1000 tokens)
    /// - Summarization: condensed text (1000 tokens)
    /// - Conversation: general chat (2000 tokens)
    /// - Critique: review and synthesis (2000 tokens)
    /// - NoteGeneration: full clinical notes (3000 tokens)
    /// - Coding: code blocks (4096 tokens)
    #[must_use]
    pub fn default_token_budget(&self) -> TokenBudget {
        match self {
            Self::FastQuery => TokenBudget::new(512, 0.3),
            Self::Extraction => TokenBudget::new(1000, 0.1),
            Self::Summarization => TokenBudget::new(1000, 0.3),
            Self::Conversation => TokenBudget::new(2000, 0.7),
            Self::Critique => TokenBudget::new(2000, 0.2),
            Self::NoteGeneration => TokenBudget::new(3000, 0.4),
            Self::Coding => TokenBudget::new(4096, 0.2),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| format!("unknown task type: {s}"))
    }
}
