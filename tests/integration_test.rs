//! Integration tests for clinroute
//!
//! These tests verify the integration between the crates:
//! - clinroute-core: breakers, registry and observability sink
//! - clinroute-llm: router, consensus and adapters

use std::sync::Arc;
use std::time::Duration;

use clinroute_core::{
    BreakerRegistry, BroadcastSink, CircuitBreakerConfig, CircuitState, EventKind,
};
use clinroute_llm::{
    ConsensusOrchestrator, LlmRequest, LlmRouter, MockProvider, MockReply, ModelChoice,
    RouterConfig, RoutingRule, TaskType,
};

fn registry(sink: Arc<BroadcastSink>, threshold: u32) -> Arc<BreakerRegistry> {
    Arc::new(
        BreakerRegistry::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_reset_timeout(Duration::from_secs(30)),
        )
        .with_sink(sink),
    )
}

// ============================================================================
// Router + Breaker Integration Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_after_reset_timeout() {
    let sink = Arc::new(BroadcastSink::default());
    let mut events = sink.subscribe();
    let breakers = registry(sink, 2);

    let flaky = Arc::new(
        MockProvider::new("flaky")
            .with_reply(MockReply::fail("503"))
            .with_reply(MockReply::fail("503"))
            .with_default_reply(MockReply::text("recovered")),
    );
    let config = RouterConfig::new(ModelChoice::new("flaky", "f-1")).with_max_retries(0);
    let router = LlmRouter::new(config, Arc::clone(&breakers))
        .unwrap()
        .with_provider(flaky.clone());
    let request = LlmRequest::new("status?");

    for _ in 0..2 {
        assert!(!router.route(TaskType::FastQuery, &request).await.unwrap().success);
    }
    assert_eq!(breakers.get("flaky").state(), CircuitState::Open);
    assert_eq!(events.recv().await.unwrap().kind, EventKind::CircuitOpened);

    // Rejected while open
    assert!(!router.route(TaskType::FastQuery, &request).await.unwrap().success);
    assert_eq!(flaky.calls(), 2);

    tokio::time::advance(Duration::from_secs(31)).await;

    // Probe succeeds and closes the circuit
    let response = router.route(TaskType::FastQuery, &request).await.unwrap();
    assert!(response.success);
    assert_eq!(response.content, "recovered");
    assert_eq!(breakers.get("flaky").state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_open_provider_routes_to_fallback_without_waiting() {
    let sink = Arc::new(BroadcastSink::default());
    let breakers = registry(sink, 1);
    breakers.get("anthropic").record_failure();

    let anthropic = Arc::new(MockProvider::new("anthropic"));
    let openai = Arc::new(MockProvider::new("openai").with_reply(MockReply::text("note")));
    let config = RouterConfig::new(ModelChoice::new("openai", "gpt-4o"))
        .with_rule(RoutingRule::new(
            TaskType::NoteGeneration,
            ModelChoice::new("anthropic", "claude-sonnet-4-5"),
        ))
        .with_backoff(5_000, 2.0, 10_000);
    let router = LlmRouter::new(config, breakers)
        .unwrap()
        .with_provider(anthropic.clone())
        .with_provider(openai);

    let started = tokio::time::Instant::now();
    let report = router
        .route_with_report(TaskType::NoteGeneration, &LlmRequest::new("draft"))
        .await
        .unwrap();

    assert!(report.response.success);
    assert_eq!(anthropic.calls(), 0);
    // Circuit-open skips never back off
    assert!(started.elapsed() < Duration::from_millis(5_000));
}

// ============================================================================
// Consensus Integration Tests
// ============================================================================

#[tokio::test]
async fn test_consensus_shares_breakers_with_router() {
    let sink = Arc::new(BroadcastSink::default());
    let breakers = registry(sink, 1);

    let a = Arc::new(MockProvider::new("a").with_default_reply(MockReply::text("metformin first line")));
    let b = Arc::new(MockProvider::new("b").with_default_reply(MockReply::fail("down")));
    let config = RouterConfig::new(ModelChoice::new("a", "a-1")).with_max_retries(0);
    let router = Arc::new(
        LlmRouter::new(config, Arc::clone(&breakers))
            .unwrap()
            .with_provider(a)
            .with_provider(b.clone()),
    );
    let orchestrator = ConsensusOrchestrator::new(Arc::clone(&router));
    let choices = [ModelChoice::new("a", "a-1"), ModelChoice::new("b", "b-1")];

    let first = orchestrator
        .run(TaskType::FastQuery, &choices, &LlmRequest::new("first line?"))
        .await
        .unwrap();
    assert_eq!(first.successful(), 1);
    assert_eq!(breakers.get("b").state(), CircuitState::Open);

    // Second run never reaches the open provider
    orchestrator
        .run(TaskType::FastQuery, &choices, &LlmRequest::new("first line?"))
        .await
        .unwrap();
    assert_eq!(b.calls(), 1);

    let names: Vec<String> = breakers.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["a", "b"]);
}
