//! HTTP gateway tests against a mock chat completions server.

use std::time::Duration;

use coordination::gateway::{CallPurpose, CompletionRequest, GatewayError, ResponseSchema};
use coordination::{LanguageModelGateway, RetryPolicy, RetryingGateway};
use meeting_agents::{ApiStyle, LlmEndpoint, OpenAiGateway};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn endpoint(server: &MockServer, style: ApiStyle) -> LlmEndpoint {
    LlmEndpoint {
        url: server.uri(),
        model: "meet-4".into(),
        api_key: Some("test-key".into()),
        api_style: style,
        ..LlmEndpoint::default()
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

fn request() -> CompletionRequest {
    CompletionRequest::new(CallPurpose::StopVote, 1000)
        .system("You are Chair.")
        .user("Should the discussion end?")
}

#[tokio::test]
async fn test_openai_success_strips_reasoning() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "meet-4", "max_tokens": 1000})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("<think>tally first</think>{\"vote\": 0}")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = OpenAiGateway::new(endpoint(&server, ApiStyle::OpenAi)).unwrap();
    let text = gateway.complete(&request()).await.unwrap();
    assert_eq!(text, "{\"vote\": 0}");
    assert_eq!(gateway.model_name(), "meet-4");
}

#[tokio::test]
async fn test_reasoning_kept_when_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("<think>x</think>y")))
        .mount(&server)
        .await;

    let mut config = endpoint(&server, ApiStyle::OpenAi);
    config.strip_reasoning = false;
    let gateway = OpenAiGateway::new(config).unwrap();
    assert_eq!(gateway.complete(&request()).await.unwrap(), "<think>x</think>y");
}

#[tokio::test]
async fn test_azure_deployment_route_and_schema() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/meet-4/chat/completions"))
        .and(query_param("api-version", "2024-06-01"))
        .and(header("api-key", "test-key"))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_schema", "json_schema": {"name": "scene_verdict"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"explanation": "ok", "accept_scene": true}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = OpenAiGateway::new(endpoint(&server, ApiStyle::Azure)).unwrap();
    let request = CompletionRequest::new(CallPurpose::SceneCheck, 4000)
        .system("Judge the scene.")
        .with_schema(ResponseSchema {
            name: "scene_verdict".into(),
            schema: json!({"type": "object"}),
        });
    let text = gateway.complete(&request).await.unwrap();
    assert!(text.contains("accept_scene"));
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/limited/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/empty/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let at = |suffix: &str| {
        let mut config = endpoint(&server, ApiStyle::OpenAi);
        config.url = format!("{}/{suffix}", server.uri());
        OpenAiGateway::new(config).unwrap()
    };

    let err = at("limited").complete(&request()).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
    ));
    assert!(err.is_transient());

    let err = at("broken").complete(&request()).await.unwrap_err();
    match err {
        GatewayError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model crashed");
        }
        other => panic!("expected Api error, got {other:?}"),
    }

    let err = at("empty").complete(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidResponse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Nothing listens on the discard port.
    let gateway = OpenAiGateway::new(LlmEndpoint {
        url: "http://127.0.0.1:9/v1".into(),
        ..LlmEndpoint::default()
    })
    .unwrap();
    let err = gateway.complete(&request()).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Transport(_) | GatewayError::Timeout { .. }
    ));
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_backoff: Duration::from_millis(10),
        call_timeout: Some(Duration::from_secs(5)),
    }
}

#[tokio::test]
async fn test_retrying_gateway_recovers_from_429() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"vote\": 1}")))
        .expect(1)
        .mount(&server)
        .await;

    let http = OpenAiGateway::new(endpoint(&server, ApiStyle::OpenAi)).unwrap();
    let gateway = RetryingGateway::new(http, fast_policy(6));
    assert_eq!(gateway.complete(&request()).await.unwrap(), "{\"vote\": 1}");
}

#[tokio::test]
async fn test_retrying_gateway_exhausts_on_persistent_429() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let http = OpenAiGateway::new(endpoint(&server, ApiStyle::OpenAi)).unwrap();
    let gateway = RetryingGateway::new(http, fast_policy(3));
    let err = gateway.complete(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Exhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_retrying_gateway_does_not_retry_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let http = OpenAiGateway::new(endpoint(&server, ApiStyle::OpenAi)).unwrap();
    let gateway = RetryingGateway::new(http, fast_policy(6));
    let err = gateway.complete(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Api { status: 400, .. }));
}
