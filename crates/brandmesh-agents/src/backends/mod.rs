//! Model provider backends.
//!
//! Each provider implements [`ProviderBackend`]. Failures the provider
//! reports (HTTP errors, missing credentials, unparseable bodies) come back as
//! `Ok` with `success: false`; an `Err` means something unexpected happened
//! and the registry marks the agent as errored.

/// Anthropic messages API.
pub mod anthropic;
/// Fixed-latency echo provider.
pub mod custom;
/// Local Ollama server.
pub mod ollama;
/// OpenAI chat completions.
pub mod openai;

use crate::config::ProviderConfig;
use crate::types::{Agent, AgentExecutionRequest, AgentExecutionResult, ModelProvider, TokenUsage};
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub use anthropic::AnthropicBackend;
pub use custom::CustomBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Executes a single-turn prompt for an agent on one provider.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Run `request` as `agent`.
    async fn execute(
        &self,
        agent: &Agent,
        request: &AgentExecutionRequest,
    ) -> BrandmeshResult<AgentExecutionResult>;
}

/// Strategy table mapping each provider to its backend.
#[derive(Clone)]
pub struct ProviderTable {
    backends: HashMap<ModelProvider, Arc<dyn ProviderBackend>>,
}

impl ProviderTable {
    /// Table with the built-in backend for every provider.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let http = reqwest::Client::new();
        let mut backends: HashMap<ModelProvider, Arc<dyn ProviderBackend>> = HashMap::new();
        backends.insert(
            ModelProvider::OpenAi,
            Arc::new(OpenAiBackend::new(
                config.openai_api_key.clone(),
                config.openai_base_url.clone(),
                http.clone(),
            )),
        );
        backends.insert(
            ModelProvider::Anthropic,
            Arc::new(AnthropicBackend::new(
                config.anthropic_api_key.clone(),
                config.anthropic_base_url.clone(),
                http.clone(),
            )),
        );
        backends.insert(
            ModelProvider::Ollama,
            Arc::new(OllamaBackend::new(config.ollama_base_url.clone(), http)),
        );
        backends.insert(
            ModelProvider::Custom,
            Arc::new(CustomBackend::new(std::time::Duration::from_millis(
                config.custom_latency_ms,
            ))),
        );
        Self { backends }
    }

    /// Replace the backend for `provider`.
    pub fn with_backend(mut self, provider: ModelProvider, backend: Arc<dyn ProviderBackend>) -> Self {
        self.backends.insert(provider, backend);
        self
    }

    /// Replace the backend for `provider` in place.
    pub fn set(&mut self, provider: ModelProvider, backend: Arc<dyn ProviderBackend>) {
        self.backends.insert(provider, backend);
    }

    /// Backend for `provider`, if one is installed.
    pub fn get(&self, provider: ModelProvider) -> Option<Arc<dyn ProviderBackend>> {
        self.backends.get(&provider).cloned()
    }
}

impl Default for ProviderTable {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

/// System and user turn shared by the chat-style providers.
pub(crate) fn chat_messages(request: &AgentExecutionRequest) -> Value {
    json!([
        {"role": "system", "content": request.system_instructions()},
        {"role": "user", "content": request.prompt},
    ])
}

/// `{model, brand}` plus provider-specific extras.
pub(crate) fn result_metadata(model: &str, request: &AgentExecutionRequest) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("model".into(), Value::String(model.to_string()));
    metadata.insert(
        "brand".into(),
        request
            .brand_context
            .clone()
            .map_or(Value::Null, Value::String),
    );
    metadata
}

/// Read a token count, treating absent or malformed values as zero.
pub(crate) fn count(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0)
}

pub(crate) fn usage(prompt: u64, completion: u64, total: Option<u64>) -> TokenUsage {
    TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total.unwrap_or(prompt + completion),
    }
}

/// Pull a readable message out of a provider error body.
pub(crate) fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_messages_use_default_system() {
        let req = AgentExecutionRequest::new("a", "hello");
        let messages = chat_messages(&req);
        assert_eq!(messages[0]["content"], "You are a helpful AI agent.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "hello");
    }

    #[test]
    fn test_error_detail_prefers_message() {
        assert_eq!(
            error_detail(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(error_detail(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_detail("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_table_has_every_provider() {
        let table = ProviderTable::default();
        for provider in ModelProvider::ALL {
            assert!(table.get(*provider).is_some(), "{provider}");
        }
    }
}
