use super::{result_metadata, usage, ProviderBackend};
use crate::types::{Agent, AgentExecutionRequest, AgentExecutionResult};
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use std::time::Duration;
use tracing::debug;

/// Placeholder backend for agents with user-supplied execution logic.
///
/// Echoes the prompt after a fixed latency. Replace it through
/// [`ProviderTable::with_backend`](super::ProviderTable::with_backend).
pub struct CustomBackend {
    latency: Duration,
}

impl CustomBackend {
    /// Backend answering after `latency`.
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ProviderBackend for CustomBackend {
    async fn execute(
        &self,
        agent: &Agent,
        request: &AgentExecutionRequest,
    ) -> BrandmeshResult<AgentExecutionResult> {
        debug!(agent_id = %agent.id, "Running placeholder custom backend");
        tokio::time::sleep(self.latency).await;

        let prompt_tokens = request.prompt.chars().count() as u64;
        Ok(AgentExecutionResult::success(
            &agent.id,
            format!(
                "[Custom Model] Processed: {} with model {}",
                request.prompt, agent.model_name
            ),
            usage(prompt_tokens, prompt_tokens / 5, None),
            result_metadata(&agent.model_name, request),
        ))
    }
}
