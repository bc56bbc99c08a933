//! Processor for `workflow_execution` jobs.

use crate::inputs::WorkflowStep;
use async_trait::async_trait;
use brandmesh_agents::{AgentExecutionRequest, AgentRegistry};
use brandmesh_core::{BrandmeshError, BrandmeshResult};
use brandmesh_queue::{JobRecord, TaskProcessor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowPayload {
    workflow_type: String,
    steps: Vec<WorkflowStep>,
    #[serde(default)]
    context: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepReport {
    output_key: String,
    agent_id: Option<String>,
    skipped: bool,
    duration: u64,
}

/// Runs workflow steps in order, each on the first idle agent of its type.
///
/// Step outputs accumulate in the workflow context under their `outputKey`
/// and can be referenced by later instructions as `{{key}}`.
pub struct WorkflowProcessor {
    agents: Arc<AgentRegistry>,
}

impl WorkflowProcessor {
    /// Processor executing on agents from `agents`.
    pub fn new(agents: Arc<AgentRegistry>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl TaskProcessor for WorkflowProcessor {
    async fn process(&self, job: &JobRecord) -> BrandmeshResult<Value> {
        let payload: WorkflowPayload =
            serde_json::from_value(Value::Object(job.data.payload.clone()))
                .map_err(|e| BrandmeshError::Validation(format!("Invalid workflow payload: {e}")))?;
        let WorkflowPayload {
            workflow_type,
            steps,
            mut context,
        } = payload;

        let mut reports = Vec::with_capacity(steps.len());
        for step in &steps {
            if let Some(condition) = &step.condition {
                if !condition_holds(condition, &context) {
                    info!(job_id = %job.id, output_key = %step.output_key, "Skipping workflow step");
                    reports.push(StepReport {
                        output_key: step.output_key.clone(),
                        agent_id: None,
                        skipped: true,
                        duration: 0,
                    });
                    continue;
                }
            }

            let agent = self
                .agents
                .find_idle_agents_by_type(step.agent_type)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    BrandmeshError::Agent(format!(
                        "No idle agents available of type {}",
                        step.agent_type
                    ))
                })?;

            let result = self
                .agents
                .execute_agent(AgentExecutionRequest {
                    brand_context: job.data.brand_context.clone(),
                    ..AgentExecutionRequest::new(&agent.id, render(&step.instruction, &context))
                })
                .await;
            if !result.success {
                return Err(BrandmeshError::Agent(format!(
                    "Workflow step '{}' failed: {}",
                    step.output_key,
                    result.error.unwrap_or_default()
                )));
            }

            info!(job_id = %job.id, agent_id = %agent.id, output_key = %step.output_key, "Workflow step completed");
            context.insert(
                step.output_key.clone(),
                Value::String(result.output.unwrap_or_default()),
            );
            reports.push(StepReport {
                output_key: step.output_key.clone(),
                agent_id: Some(agent.id),
                skipped: false,
                duration: result.duration.unwrap_or(0),
            });
        }

        Ok(json!({
            "workflowType": workflow_type,
            "context": context,
            "steps": reports,
        }))
    }
}

/// `key` must be truthy in the context; `!key` must not be.
fn condition_holds(condition: &str, context: &Map<String, Value>) -> bool {
    let condition = condition.trim();
    match condition.strip_prefix('!') {
        Some(key) => !truthy(context.get(key.trim())),
        None => truthy(context.get(condition)),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Replace `{{key}}` with the context value. Unknown keys are left as is.
fn render(template: &str, context: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len;
        let key = rest[start + 2..end].trim();
        out.push_str(&rest[..start]);
        match context.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}
