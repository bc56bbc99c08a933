use super::{chat_messages, count, result_metadata, usage, ProviderBackend};
use crate::types::{Agent, AgentExecutionRequest, AgentExecutionResult};
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use serde_json::{json, Value};
use tracing::warn;

/// Local Ollama `/api/chat` backend.
pub struct OllamaBackend {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaBackend {
    /// Backend sharing the given HTTP client.
    pub fn new(base_url: String, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }
}

#[async_trait]
impl ProviderBackend for OllamaBackend {
    async fn execute(
        &self,
        agent: &Agent,
        request: &AgentExecutionRequest,
    ) -> BrandmeshResult<AgentExecutionResult> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": agent.model_name,
            "messages": chat_messages(request),
            "options": {
                "temperature": request.temperature(),
                // Ollama sizes the context window rather than the reply.
                "num_ctx": request.max_tokens(),
            },
            "stream": false,
        });

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "Ollama request failed");
                return Ok(AgentExecutionResult::failure(&agent.id, e.to_string()));
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(agent_id = %agent.id, status = %status, "Ollama API error");
            return Ok(AgentExecutionResult::failure(
                &agent.id,
                format!("Ollama API error: {status} - {text}"),
            ));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(resp_body) => Ok(parse_ollama_response(agent, request, &resp_body)),
            Err(e) => Ok(AgentExecutionResult::failure(
                &agent.id,
                format!("Invalid Ollama response: {e}"),
            )),
        }
    }
}

/// Map a successful Ollama response body onto an execution result.
pub fn parse_ollama_response(
    agent: &Agent,
    request: &AgentExecutionRequest,
    body: &Value,
) -> AgentExecutionResult {
    let output = body["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    // Counts live either in a `usage` object or at the top level.
    let source = if body["usage"].is_object() {
        &body["usage"]
    } else {
        body
    };
    let usage = usage(
        count(&source["prompt_eval_count"]),
        count(&source["eval_count"]),
        source["total_eval_count"].as_u64(),
    );
    AgentExecutionResult::success(
        &agent.id,
        output,
        usage,
        result_metadata(&agent.model_name, request),
    )
}
