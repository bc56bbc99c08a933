use super::{count, error_detail, result_metadata, usage, ProviderBackend};
use crate::types::{Agent, AgentExecutionRequest, AgentExecutionResult};
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use serde_json::{json, Value};
use tracing::warn;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages backend.
pub struct AnthropicBackend {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicBackend {
    /// Backend sharing the given HTTP client.
    pub fn new(api_key: Option<String>, base_url: String, http: reqwest::Client) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url,
            http,
        }
    }
}

#[async_trait]
impl ProviderBackend for AnthropicBackend {
    async fn execute(
        &self,
        agent: &Agent,
        request: &AgentExecutionRequest,
    ) -> BrandmeshResult<AgentExecutionResult> {
        let Some(api_key) = &self.api_key else {
            return Ok(AgentExecutionResult::failure(
                &agent.id,
                "Anthropic client not initialized. Missing API key.",
            ));
        };

        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": agent.model_name,
            "system": request.system_instructions(),
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature(),
            "max_tokens": request.max_tokens(),
        });

        let resp = match self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "Anthropic request failed");
                return Ok(AgentExecutionResult::failure(&agent.id, e.to_string()));
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(agent_id = %agent.id, status = %status, "Anthropic API error");
            return Ok(AgentExecutionResult::failure(
                &agent.id,
                format!("Anthropic API error {status}: {}", error_detail(&text)),
            ));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(resp_body) => Ok(parse_anthropic_response(agent, request, &resp_body)),
            Err(e) => Ok(AgentExecutionResult::failure(
                &agent.id,
                format!("Invalid Anthropic response: {e}"),
            )),
        }
    }
}

/// Map a successful Anthropic response body onto an execution result.
pub fn parse_anthropic_response(
    agent: &Agent,
    request: &AgentExecutionRequest,
    body: &Value,
) -> AgentExecutionResult {
    let output = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let input = count(&body["usage"]["input_tokens"]);
    let output_tokens = count(&body["usage"]["output_tokens"]);
    let model = body["model"].as_str().unwrap_or(&agent.model_name);
    let mut metadata = result_metadata(model, request);
    metadata.insert("stopReason".into(), body["stop_reason"].clone());
    AgentExecutionResult::success(&agent.id, output, usage(input, output_tokens, None), metadata)
}
