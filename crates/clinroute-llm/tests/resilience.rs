//! End-to-end routing against mocked vendor endpoints
//!
//! Real adapters talk to `wiremock` servers; the router, breakers and retry
//! policy run unmodified.

use std::sync::Arc;
use std::time::Duration;

use clinroute_core::{BreakerRegistry, BroadcastSink, CircuitBreakerConfig, CircuitState, EventKind};
use clinroute_llm::{
    CancellationToken, Error, GeminiProvider, LlmRequest, LlmRouter, ModelChoice, OpenAiProvider,
    ProviderConfig, RouterConfig, TaskType,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "sk-integration-0123456789";

fn openai(server: &MockServer) -> Arc<OpenAiProvider> {
    Arc::new(OpenAiProvider::openai(ProviderConfig::new(KEY).with_base_url(server.uri())).unwrap())
}

#[tokio::test]
async fn test_repeated_rate_limits_open_the_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("{\"error\":\"rate limited\"}"))
        .expect(3)
        .mount(&server)
        .await;

    let sink = Arc::new(BroadcastSink::new(8));
    let mut events = sink.subscribe();
    let breakers = Arc::new(
        BreakerRegistry::new(CircuitBreakerConfig::new().with_failure_threshold(3))
            .with_sink(sink),
    );
    let config = RouterConfig::new(ModelChoice::new("openai", "gpt-4o-mini")).with_max_retries(0);
    let router = LlmRouter::new(config, breakers).unwrap().with_provider(openai(&server));

    for _ in 0..3 {
        let response = router
            .route(TaskType::FastQuery, &LlmRequest::new("hi"))
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.error_message().contains("429"));
    }
    assert_eq!(router.breakers().get("openai").state(), CircuitState::Open);

    let opened = events.recv().await.unwrap();
    assert_eq!(opened.kind, EventKind::CircuitOpened);
    assert_eq!(opened.metadata["service"], "openai");
    assert_eq!(opened.metadata["failure_count"], 3);

    // Fourth call is rejected before any network attempt
    let response = router
        .route(TaskType::FastQuery, &LlmRequest::new("hi"))
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.error_message().contains("circuit open"));

    server.verify().await;
}

#[tokio::test]
async fn test_falls_back_across_vendors() {
    let openai_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(1)
        .mount(&openai_server)
        .await;

    let gemini_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "from gemini"}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&gemini_server)
        .await;

    let gemini = GeminiProvider::new(ProviderConfig::new(KEY).with_base_url(gemini_server.uri())).unwrap();
    let config = RouterConfig::new(ModelChoice::new("openai", "gpt-4o-mini"))
        .with_fallback(ModelChoice::new("gemini", "gemini-2.0-flash"))
        .with_backoff(10, 2.0, 100);
    let router = LlmRouter::new(config, Arc::new(BreakerRegistry::default()))
        .unwrap()
        .with_provider(openai(&openai_server))
        .with_provider(Arc::new(gemini));

    let report = router
        .route_with_report(TaskType::Summarization, &LlmRequest::new("summarize"))
        .await
        .unwrap();

    assert!(report.response.success);
    assert_eq!(report.response.content, "from gemini");
    assert_eq!(report.response.provider, "gemini");
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(router.breakers().get("openai").failure_count(), 1);
    assert_eq!(router.breakers().get("gemini").failure_count(), 0);
}

#[tokio::test]
async fn test_cancel_mid_request_leaves_breaker_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let config = RouterConfig::new(ModelChoice::new("openai", "gpt-4o-mini"));
    let router = LlmRouter::new(config, Arc::new(BreakerRegistry::default()))
        .unwrap()
        .with_provider(openai(&server));

    let token = CancellationToken::new();
    let request = LlmRequest::new("hi").with_cancellation(token.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let result = router.route(TaskType::FastQuery, &request).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(router.breakers().get("openai").failure_count(), 0);
    assert_eq!(router.breakers().get("openai").state(), CircuitState::Closed);
}
