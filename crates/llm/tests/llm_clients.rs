use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Json;
use serde_json::{Value, json};
use std::time::Duration;
use stockcheck_core::analysis::error::LlmError;
use stockcheck_core::analysis::port::LanguageModel;
use stockcheck_core::config::{LlmConfig, LlmProvider};
use stockcheck_llm::anthropic::AnthropicModel;
use stockcheck_llm::build_language_model;
use stockcheck_llm::openai::OpenAiCompatibleModel;

/// 启动模拟的大模型服务，返回基地址
async fn spawn_mock_llm() -> String {
    async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body["model"] == "rate-limited" {
            return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "slow down"})));
        }
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none")
            .to_string();
        let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": format!("auth={} prompt={}", auth, prompt)}}]
            })),
        )
    }

    async fn messages(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        let version = headers.get("anthropic-version").and_then(|v| v.to_str().ok());
        if key != Some("ak-test") || version != Some("2023-06-01") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let system = body["system"].as_str().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({
                "content": [
                    {"type": "text", "text": format!("system={}", system)},
                    {"type": "tool_use", "id": "x"},
                    {"type": "text", "text": "done"}
                ],
                "stop_reason": "end_turn"
            })),
        )
    }

    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/v1/messages", post(messages));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let _ = rustls::crypto::ring::default_provider().install_default();
    format!("http://{}/v1", addr)
}

#[tokio::test]
async fn test_openai_compatible_completion() {
    let base = spawn_mock_llm().await;
    let model = OpenAiCompatibleModel::new(
        LlmProvider::OpenAi,
        Some("sk-test".into()),
        "gpt-4o-mini",
        Some(&base),
        0.3,
        256,
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(model.model_id(), "openai/gpt-4o-mini");
    let reply = model.complete("be brief", "hello").await.unwrap();
    assert_eq!(reply, "auth=Bearer sk-test prompt=hello");
}

#[tokio::test]
async fn test_local_model_without_key() {
    let base = spawn_mock_llm().await;
    let model = OpenAiCompatibleModel::new(
        LlmProvider::Local,
        None,
        "llama3",
        Some(&format!("{}/", base)),
        0.3,
        256,
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(model.model_id(), "local/llama3");
    let reply = model.complete("sys", "ping").await.unwrap();
    assert_eq!(reply, "auth=none prompt=ping");
}

#[tokio::test]
async fn test_rate_limit_is_reported() {
    let base = spawn_mock_llm().await;
    let model = OpenAiCompatibleModel::new(
        LlmProvider::OpenAi,
        Some("sk-test".into()),
        "rate-limited",
        Some(&base),
        0.3,
        256,
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(
        model.complete("sys", "ping").await,
        Err(LlmError::RateLimited)
    );
}

#[tokio::test]
async fn test_anthropic_messages() {
    let base = spawn_mock_llm().await;
    let model = AnthropicModel::new(
        "ak-test".into(),
        "claude-3-sonnet-20240229",
        Some(&base),
        0.3,
        512,
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(model.model_id(), "anthropic/claude-3-sonnet-20240229");
    let reply = model.complete("analyst", "go").await.unwrap();
    assert_eq!(reply, "system=analyst\ndone");

    let wrong = AnthropicModel::new(
        "wrong".into(),
        "claude-3-sonnet-20240229",
        Some(&base),
        0.3,
        512,
        Duration::from_secs(5),
    )
    .unwrap();
    assert!(matches!(
        wrong.complete("analyst", "go").await,
        Err(LlmError::Api { status: 401, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    // 绑定后立即释放，得到一个无人监听的端口
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let model = OpenAiCompatibleModel::new(
        LlmProvider::Local,
        None,
        "llama3",
        Some(&format!("http://{}/v1", addr)),
        0.3,
        256,
        Duration::from_secs(5),
    )
    .unwrap();
    assert!(matches!(
        model.complete("sys", "ping").await,
        Err(LlmError::Network(_))
    ));
}

#[tokio::test]
async fn test_build_language_model_selection() {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let none = LlmConfig::default();
    assert!(build_language_model(&none).unwrap().is_none());

    let missing_key = LlmConfig {
        provider: LlmProvider::OpenAi,
        ..LlmConfig::default()
    };
    assert!(build_language_model(&missing_key).unwrap().is_none());

    let anthropic = LlmConfig {
        provider: LlmProvider::Anthropic,
        api_key: Some("ak-test".into()),
        ..LlmConfig::default()
    };
    let model = build_language_model(&anthropic).unwrap().unwrap();
    assert_eq!(model.model_id(), "anthropic/claude-3-sonnet-20240229");

    let local = LlmConfig {
        provider: LlmProvider::Local,
        model: "llama3".into(),
        base_url: Some("http://localhost:11434/v1".into()),
        ..LlmConfig::default()
    };
    let model = build_language_model(&local).unwrap().unwrap();
    assert_eq!(model.model_id(), "local/llama3");
}
