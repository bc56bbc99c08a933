//! Typed tool inputs and their schemas.

use brandmesh_agents::{AgentCapability, AgentType, ModelProvider};
use brandmesh_core::{BrandmeshError, BrandmeshResult};
use brandmesh_queue::{TaskPriority, TaskType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Input of `execute_agent`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteAgentInput {
    /// Kind of agent to run on.
    pub agent_type: AgentType,
    /// User prompt.
    pub prompt: String,
    /// Brand the prompt is for.
    #[serde(default)]
    pub brand_context: Option<String>,
    /// Sampling temperature in `[0, 2]`.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Completion token limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ExecuteAgentInput {
    /// Range checks serde cannot express.
    pub fn validate(&self) -> BrandmeshResult<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(BrandmeshError::Validation(format!(
                    "temperature must be between 0 and 2, got {t}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(BrandmeshError::Validation(
                "maxTokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Input of `add_task_to_queue`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTaskInput {
    /// Which processor handles the job.
    pub task_type: TaskType,
    /// Processor-specific data.
    pub payload: Map<String, Value>,
    /// Brand the job is for.
    #[serde(default)]
    pub brand_context: Option<String>,
    /// Defaults to medium.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Recorded, not enforced.
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,
    /// Milliseconds per attempt.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl AddTaskInput {
    /// Rejects a zero timeout.
    pub fn validate(&self) -> BrandmeshResult<()> {
        positive_timeout(self.timeout)
    }
}

/// Input of the task lookup tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdInput {
    /// Job id returned by `add_task_to_queue`.
    pub task_id: String,
}

/// One step of a workflow, as submitted and as stored in the job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Kind of agent that runs the step.
    pub agent_type: AgentType,
    /// Prompt template; `{{key}}` reads the workflow context.
    pub instruction: String,
    /// Context key the output is stored under.
    pub output_key: String,
    /// Context key that must be truthy, or `!key` that must not be.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Input of `orchestrate_workflow`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateWorkflowInput {
    /// Free-form label carried into the result.
    pub workflow_type: String,
    /// Steps run in order.
    pub steps: Vec<WorkflowStep>,
    /// Initial workflow context.
    pub context: Map<String, Value>,
    /// Brand passed to every step.
    #[serde(default)]
    pub brand_context: Option<String>,
    /// Milliseconds for the whole workflow per attempt.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl OrchestrateWorkflowInput {
    /// Rejects a zero timeout.
    pub fn validate(&self) -> BrandmeshResult<()> {
        positive_timeout(self.timeout)
    }
}

fn positive_timeout(timeout: Option<u64>) -> BrandmeshResult<()> {
    if timeout == Some(0) {
        return Err(BrandmeshError::Validation("timeout must be positive".into()));
    }
    Ok(())
}

fn enum_schema(values: impl IntoIterator<Item = &'static str>, description: &str) -> Value {
    json!({
        "type": "string",
        "enum": values.into_iter().collect::<Vec<_>>(),
        "description": description,
    })
}

fn agent_type_schema(description: &str) -> Value {
    enum_schema(AgentType::ALL.iter().map(AgentType::as_str), description)
}

pub(crate) fn execute_agent_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "agentType": agent_type_schema("The type of agent to execute"),
            "prompt": {"type": "string", "description": "The prompt or instructions to send to the agent"},
            "brandContext": {"type": "string", "description": "The brand context to use"},
            "temperature": {"type": "number", "minimum": 0, "maximum": 2},
            "maxTokens": {"type": "integer", "exclusiveMinimum": 0}
        },
        "required": ["agentType", "prompt"]
    })
}

pub(crate) fn add_task_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "taskType": enum_schema(TaskType::ALL.iter().map(TaskType::as_str), "The type of task to add to the queue"),
            "payload": {"type": "object", "description": "Data needed for the task"},
            "brandContext": {"type": "string"},
            "priority": enum_schema(["low", "medium", "high", "critical"], "Task priority"),
            "dependsOn": {"type": "array", "items": {"type": "string"}},
            "timeout": {"type": "integer", "exclusiveMinimum": 0, "description": "Timeout in milliseconds"}
        },
        "required": ["taskType", "payload"]
    })
}

pub(crate) fn task_id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "taskId": {"type": "string", "description": description}
        },
        "required": ["taskId"]
    })
}

pub(crate) fn register_agent_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "type": agent_type_schema("Type of the agent"),
            "capabilities": {
                "type": "array",
                "items": enum_schema(AgentCapability::ALL.iter().map(AgentCapability::as_str), "Capability")
            },
            "modelProvider": enum_schema(ModelProvider::ALL.iter().map(ModelProvider::as_str), "The model provider"),
            "modelName": {"type": "string"},
            "metadata": {"type": "object"}
        },
        "required": ["name", "type", "capabilities", "modelProvider", "modelName"]
    })
}

pub(crate) fn orchestrate_workflow_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "workflowType": {"type": "string"},
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "agentType": agent_type_schema("Type of agent to use for this step"),
                        "instruction": {"type": "string"},
                        "outputKey": {"type": "string"},
                        "condition": {"type": "string", "description": "Context key that must be truthy; prefix with ! to negate"}
                    },
                    "required": ["agentType", "instruction", "outputKey"]
                }
            },
            "context": {"type": "object"},
            "brandContext": {"type": "string"},
            "timeout": {"type": "integer", "exclusiveMinimum": 0}
        },
        "required": ["workflowType", "steps", "context"]
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use brandmesh_mcp::parse_input;

    #[test]
    fn test_execute_agent_bounds() {
        let input: ExecuteAgentInput =
            parse_input(json!({"agentType": "analytics", "prompt": "p", "temperature": 0})).unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.temperature, Some(0.0));

        let hot: ExecuteAgentInput =
            parse_input(json!({"agentType": "analytics", "prompt": "p", "temperature": 2.5})).unwrap();
        assert!(hot.validate().unwrap_err().is_validation());

        let empty: ExecuteAgentInput =
            parse_input(json!({"agentType": "analytics", "prompt": "p", "maxTokens": 0})).unwrap();
        assert!(empty.validate().is_err());

        assert!(parse_input::<ExecuteAgentInput>(json!({"agentType": "analytics", "prompt": "p", "maxTokens": -5})).is_err());
        assert!(parse_input::<ExecuteAgentInput>(json!({"agentType": "poet", "prompt": "p"})).is_err());
    }

    #[test]
    fn test_add_task_input() {
        let input: AddTaskInput = parse_input(json!({
            "taskType": "analytics_processing",
            "payload": {"range": "7d"},
            "priority": "critical",
            "dependsOn": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(input.task_type, TaskType::AnalyticsProcessing);
        assert_eq!(input.priority, Some(TaskPriority::Critical));
        assert!(input.validate().is_ok());

        let zero: AddTaskInput =
            parse_input(json!({"taskType": "analytics_processing", "payload": {}, "timeout": 0})).unwrap();
        assert!(zero.validate().is_err());
        assert!(parse_input::<AddTaskInput>(json!({"taskType": "analytics_processing", "payload": {}, "priority": "urgent"})).is_err());
    }

    #[test]
    fn test_schemas_list_enum_values() {
        let schema = execute_agent_schema();
        assert_eq!(schema["properties"]["agentType"]["enum"].as_array().unwrap().len(), 5);
        let schema = add_task_schema();
        assert_eq!(schema["properties"]["taskType"]["enum"].as_array().unwrap().len(), 6);
        let schema = register_agent_schema();
        assert_eq!(
            schema["properties"]["capabilities"]["items"]["enum"].as_array().unwrap().len(),
            8
        );
    }
}
