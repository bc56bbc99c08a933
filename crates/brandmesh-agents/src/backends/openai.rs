use super::{chat_messages, count, error_detail, result_metadata, usage, ProviderBackend};
use crate::types::{Agent, AgentExecutionRequest, AgentExecutionResult};
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use serde_json::{json, Value};
use tracing::warn;

/// OpenAI chat completions backend.
pub struct OpenAiBackend {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiBackend {
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
impl ProviderBackend for OpenAiBackend {
    async fn execute(
        &self,
        agent: &Agent,
        request: &AgentExecutionRequest,
    ) -> BrandmeshResult<AgentExecutionResult> {
        let Some(api_key) = &self.api_key else {
            return Ok(AgentExecutionResult::failure(
                &agent.id,
                "OpenAI client not initialized. Missing API key.",
            ));
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": agent.model_name,
            "messages": chat_messages(request),
            "temperature": request.temperature(),
            "max_tokens": request.max_tokens(),
        });

        let resp = match self.http.post(&url).bearer_auth(api_key).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "OpenAI request failed");
                return Ok(AgentExecutionResult::failure(&agent.id, e.to_string()));
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(agent_id = %agent.id, status = %status, "OpenAI API error");
            return Ok(AgentExecutionResult::failure(
                &agent.id,
                format!("OpenAI API error {status}: {}", error_detail(&text)),
            ));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(resp_body) => Ok(parse_openai_response(agent, request, &resp_body)),
            Err(e) => Ok(AgentExecutionResult::failure(
                &agent.id,
                format!("Invalid OpenAI response: {e}"),
            )),
        }
    }
}

/// Map a successful OpenAI response body onto an execution result.
pub fn parse_openai_response(
    agent: &Agent,
    request: &AgentExecutionRequest,
    body: &Value,
) -> AgentExecutionResult {
    let choice = &body["choices"][0];
    let output = choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let reported = &body["usage"];
    let usage = usage(
        count(&reported["prompt_tokens"]),
        count(&reported["completion_tokens"]),
        reported["total_tokens"].as_u64(),
    );

    let model = body["model"].as_str().unwrap_or(&agent.model_name);
    let mut metadata = result_metadata(model, request);
    metadata.insert("finishReason".into(), choice["finish_reason"].clone());
    AgentExecutionResult::success(&agent.id, output, usage, metadata)
}
