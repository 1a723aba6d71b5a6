//! Observability sink for structured events.
//!
//! The routing layer reports state it cannot handle itself (circuit
//! transitions, per-call log entries) through an [`ObservabilitySink`].
//! Events carry a kind, a human-readable message and JSON metadata; they never
//! carry prompt or response text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Kind of structured event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A circuit breaker transitioned into the open state
    CircuitOpened,
    /// One provider call finished (successfully or not)
    LlmCall,
}

impl EventKind {
    /// Stable string form used in logs and sinks
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpened => "circuit_opened",
            Self::LlmCall => "llm_call",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External sink accepting `(kind, message, metadata)` events.
#[cfg_attr(test, mockall::automock)]
pub trait ObservabilitySink: Send + Sync {
    /// Deliver one event. Implementations must not block.
    fn emit(&self, kind: EventKind, message: &str, metadata: serde_json::Value);
}

/// A captured event, as published on a [`BroadcastSink`]
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityEvent {
    /// Event kind
    pub kind: EventKind,
    /// Human-readable summary
    pub message: String,
    /// Structured metadata
    pub metadata: serde_json::Value,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

/// Sink that writes events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn emit(&self, kind: EventKind, message: &str, metadata: serde_json::Value) {
        match kind {
            EventKind::CircuitOpened => {
                warn!(kind = kind.as_str(), metadata = %metadata, "{message}");
            }
            EventKind::LlmCall => {
                info!(kind = kind.as_str(), metadata = %metadata, "{message}");
            }
        }
    }
}

/// Broadcast-based sink so several subscribers can observe the same events.
///
/// Slow subscribers miss events (lagged) rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ObservabilityEvent>,
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ObservabilityEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ObservabilitySink for BroadcastSink {
    fn emit(&self, kind: EventKind, message: &str, metadata: serde_json::Value) {
        // No receivers is fine
        let _ = self.sender.send(ObservabilityEvent {
            kind,
            message: message.to_string(),
            metadata,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(16);
        let mut rx1 = sink.subscribe();
        let mut rx2 = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        sink.emit(
            EventKind::CircuitOpened,
            "circuit 'openai' opened",
            serde_json::json!({"service": "openai"}),
        );

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.kind, EventKind::CircuitOpened);
        assert_eq!(e2.metadata["service"], "openai");
    }

    #[test]
    fn test_broadcast_sink_without_subscribers() {
        let sink = BroadcastSink::default();
        sink.emit(EventKind::LlmCall, "call", serde_json::Value::Null);
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&EventKind::CircuitOpened).unwrap();
        assert_eq!(json, "\"circuit_opened\"");
        assert_eq!(EventKind::LlmCall.to_string(), "llm_call");
    }
}
