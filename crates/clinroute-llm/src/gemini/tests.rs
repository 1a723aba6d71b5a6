use super::*;
use crate::error::Error;
use crate::provider::LlmProvider;
use crate::request::{LlmRequest, ResponseFormat, TokenUsage};
use crate::router::ProviderConfig;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "AIza-test-0123456789";

fn provider(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new(ProviderConfig::new(KEY).with_base_url(server.uri())).unwrap()
}

#[tokio::test]
async fn test_generate_content_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", KEY))
        .and(body_partial_json(serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
            "systemInstruction": {"parts": [{"text": "be brief"}]},
            "generationConfig": {"responseMimeType": "application/json"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 3, "totalTokenCount": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = LlmRequest::new("hi")
        .with_system_prompt("be brief")
        .with_response_format(ResponseFormat::Json);
    let response = provider(&server).send_message(&request).await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.content, "{\"a\":1}");
    assert_eq!(response.provider, "gemini");
    assert_eq!(response.model, DEFAULT_MODEL);
    assert_eq!(response.usage, Some(TokenUsage::new(4, 3)));
}

#[tokio::test]
async fn test_non_2xx_returns_failure_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let response = provider(&server).send_message(&LlmRequest::new("hi")).await;
    assert!(!response.success);
    assert!(response.content.is_empty());
    assert_eq!(
        response.error_message(),
        Error::Api {
            status: 503,
            body: "backend unavailable".to_string()
        }
        .to_string()
    );
}

#[tokio::test]
async fn test_blocked_prompt_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let response = provider(&server).send_message(&LlmRequest::new("hi")).await;
    assert!(!response.success);
    assert!(response.error_message().contains("prompt blocked: SAFETY"));
}

#[tokio::test]
async fn test_stream_uses_sse_endpoint() {
    let server = MockServer::start().await;
    let body = [
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"lo"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":2,"candidatesTokenCount":2,"totalTokenCount":4}}"#,
    ]
    .iter()
    .map(|data| format!("data: {data}\r\n\r\n"))
    .collect::<String>();

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut tokens = Vec::new();
    let response = provider(&server)
        .stream(&LlmRequest::new("hi"), &mut |t: &str| tokens.push(t.to_string()))
        .await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(tokens, vec!["Hel", "lo"]);
    assert_eq!(response.content, "Hello");
    assert_eq!(response.usage, Some(TokenUsage::new(2, 2)));
}

#[tokio::test]
async fn test_list_models_strips_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [{"name": "models/gemini-2.0-flash"}, {"name": "models/gemini-1.5-pro"}]
        })))
        .mount(&server)
        .await;

    let models = provider(&server).list_models().await.unwrap();
    assert_eq!(models, vec!["gemini-1.5-pro", "gemini-2.0-flash"]);
}

#[test]
fn test_missing_key_is_not_configured() {
    let provider = GeminiProvider::new(ProviderConfig::default()).unwrap();
    assert!(!provider.is_configured());
    assert_eq!(provider.name(), "gemini");
}
