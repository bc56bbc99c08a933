#![allow(clippy::unwrap_used, clippy::expect_used)]

use brandmesh_agents::backends::{AnthropicBackend, CustomBackend, OllamaBackend, OpenAiBackend};
use brandmesh_agents::{
    Agent, AgentExecutionRequest, AgentStatus, AgentType, ModelProvider, ProviderBackend,
};
use chrono::Utc;
use serde_json::{json, Map};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn agent(provider: ModelProvider, model: &str) -> Agent {
    Agent {
        id: "content_generation-1-abcd1234".to_string(),
        name: "Writer".to_string(),
        agent_type: AgentType::ContentGeneration,
        capabilities: vec![],
        status: AgentStatus::Busy,
        model_provider: provider,
        model_name: model.to_string(),
        last_active: Utc::now(),
        metadata: Map::new(),
    }
}

fn request(prompt: &str) -> AgentExecutionRequest {
    AgentExecutionRequest {
        brand_context: Some("acme".to_string()),
        ..AgentExecutionRequest::new("content_generation-1-abcd1234", prompt)
    }
}

#[tokio::test]
async fn test_openai_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "temperature": 0.0,
            "max_tokens": 1024,
            "messages": [
                {"role": "system", "content": "You are a helpful AI agent."},
                {"role": "user", "content": "Write a tagline"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4-0613",
            "choices": [{
                "message": {"role": "assistant", "content": "Bold ideas, daily."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new(Some("sk-test".into()), server.uri(), reqwest::Client::new());
    let req = AgentExecutionRequest {
        temperature: Some(0.0),
        ..request("Write a tagline")
    };
    let result = backend.execute(&agent(ModelProvider::OpenAi, "gpt-4"), &req).await.unwrap();

    assert!(result.success);
    assert_eq!(result.output.as_deref(), Some("Bold ideas, daily."));
    let usage = result.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.total_tokens), (12, 5, 17));
    let metadata = result.metadata.unwrap();
    assert_eq!(metadata["model"], "gpt-4-0613");
    assert_eq!(metadata["brand"], "acme");
    assert_eq!(metadata["finishReason"], "stop");
}

#[tokio::test]
async fn test_openai_http_error_is_handled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new(Some("bad".into()), server.uri(), reqwest::Client::new());
    let result = backend
        .execute(&agent(ModelProvider::OpenAi, "gpt-4"), &request("hi"))
        .await
        .unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("401"), "{error}");
    assert!(error.contains("Incorrect API key provided"), "{error}");
}

#[tokio::test]
async fn test_missing_keys_are_handled_failures() {
    let openai = OpenAiBackend::new(None, "http://127.0.0.1:9".into(), reqwest::Client::new());
    let result = openai
        .execute(&agent(ModelProvider::OpenAi, "gpt-4"), &request("hi"))
        .await
        .unwrap();
    assert_eq!(
        result.error.as_deref(),
        Some("OpenAI client not initialized. Missing API key.")
    );

    let anthropic =
        AnthropicBackend::new(Some(String::new()), "http://127.0.0.1:9".into(), reqwest::Client::new());
    let result = anthropic
        .execute(&agent(ModelProvider::Anthropic, "claude"), &request("hi"))
        .await
        .unwrap();
    assert_eq!(
        result.error.as_deref(),
        Some("Anthropic client not initialized. Missing API key.")
    );
}

#[tokio::test]
async fn test_anthropic_joins_text_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-opus-20240229",
            "system": "Be brief.",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "Summarize"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "claude-3-opus-20240229",
            "content": [
                {"type": "text", "text": "First."},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "Second."}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 20, "output_tokens": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = AnthropicBackend::new(Some("ak-test".into()), server.uri(), reqwest::Client::new());
    let req = AgentExecutionRequest {
        system_instructions: Some("Be brief.".into()),
        max_tokens: Some(256),
        ..request("Summarize")
    };
    let result = backend
        .execute(&agent(ModelProvider::Anthropic, "claude-3-opus-20240229"), &req)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output.as_deref(), Some("First.\nSecond."));
    assert_eq!(result.usage.unwrap().total_tokens, 27);
    assert_eq!(result.metadata.unwrap()["stopReason"], "end_turn");
}

#[tokio::test]
async fn test_ollama_top_level_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "options": {"temperature": 0.7, "num_ctx": 1024}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Tagged 3 assets."},
            "prompt_eval_count": 30,
            "eval_count": 9
        })))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(server.uri(), reqwest::Client::new());
    let result = backend
        .execute(&agent(ModelProvider::Ollama, "llama3"), &request("Tag assets"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output.as_deref(), Some("Tagged 3 assets."));
    let usage = result.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.total_tokens), (30, 9, 39));
}

#[tokio::test]
async fn test_ollama_usage_object_and_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"content": "ok"},
            "usage": {"prompt_eval_count": 4, "eval_count": 2, "total_eval_count": 10}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "missing"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(server.uri(), reqwest::Client::new());
    let ok = backend
        .execute(&agent(ModelProvider::Ollama, "llama3"), &request("x"))
        .await
        .unwrap();
    assert_eq!(ok.usage.unwrap().total_tokens, 10);

    let failed = backend
        .execute(&agent(ModelProvider::Ollama, "missing"), &request("x"))
        .await
        .unwrap();
    assert!(!failed.success);
    assert_eq!(
        failed.error.as_deref(),
        Some("Ollama API error: 500 Internal Server Error - model not loaded")
    );
}

#[tokio::test]
async fn test_custom_backend_echoes_prompt() {
    let backend = CustomBackend::new(Duration::from_millis(5));
    let result = backend
        .execute(&agent(ModelProvider::Custom, "house-model"), &request("abcdefghij"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.output.as_deref(),
        Some("[Custom Model] Processed: abcdefghij with model house-model")
    );
    let usage = result.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.total_tokens), (10, 2, 12));
    assert_eq!(result.metadata.unwrap()["brand"], "acme");
}
