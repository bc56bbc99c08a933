//! Dispatch tools over the task queue and the agent registry.

use crate::context::OrchestrationContext;
use crate::inputs::{
    self, AddTaskInput, ExecuteAgentInput, OrchestrateWorkflowInput, TaskIdInput,
};
use async_trait::async_trait;
use brandmesh_agents::{AgentExecutionRequest, AgentRegistrationRequest};
use brandmesh_core::BrandmeshResult;
use brandmesh_mcp::{parse_input, McpTool, ToolDescriptor};
use brandmesh_queue::{TaskData, TaskPriority, TaskType};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

fn descriptor(name: &str, description: &str, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Every dispatch tool bound to `ctx`.
pub fn all_tools(ctx: &OrchestrationContext) -> Vec<Arc<dyn McpTool>> {
    vec![
        Arc::new(ExecuteAgentTool::new(ctx.clone())),
        Arc::new(AddTaskToQueueTool::new(ctx.clone())),
        Arc::new(GetTaskStatusTool::new(ctx.clone())),
        Arc::new(GetTaskResultTool::new(ctx.clone())),
        Arc::new(CancelTaskTool::new(ctx.clone())),
        Arc::new(RegisterAgentTool::new(ctx.clone())),
        Arc::new(GetAgentStatsTool::new(ctx.clone())),
        Arc::new(OrchestrateWorkflowTool::new(ctx.clone())),
    ]
}

/// Runs a prompt on the first idle agent of a type.
pub struct ExecuteAgentTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl ExecuteAgentTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "execute_agent",
                "Execute a specific agent with a prompt",
                inputs::execute_agent_schema(),
            ),
        }
    }
}

#[async_trait]
impl McpTool for ExecuteAgentTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let input: ExecuteAgentInput = parse_input(input)?;
        input.validate()?;
        info!(agent_type = %input.agent_type, "Executing agent");

        // First idle agent in registration order.
        let Some(agent) = self
            .ctx
            .agents
            .find_idle_agents_by_type(input.agent_type)
            .into_iter()
            .next()
        else {
            return Ok(json!({
                "success": false,
                "error": format!("No idle agents available of type {}", input.agent_type),
            }));
        };

        let result = self
            .ctx
            .agents
            .execute_agent(AgentExecutionRequest {
                agent_id: agent.id,
                prompt: input.prompt,
                brand_context: input.brand_context,
                temperature: input.temperature,
                max_tokens: input.max_tokens,
                system_instructions: None,
            })
            .await;

        let mut output = serde_json::to_value(&result)?;
        if let Some(fields) = output.as_object_mut() {
            fields.remove("metadata");
        }
        Ok(output)
    }
}

/// Enqueues a task.
pub struct AddTaskToQueueTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl AddTaskToQueueTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "add_task_to_queue",
                "Add a task to the orchestration queue",
                inputs::add_task_schema(),
            ),
        }
    }
}

#[async_trait]
impl McpTool for AddTaskToQueueTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let input: AddTaskInput = parse_input(input)?;
        input.validate()?;

        let data = TaskData {
            task_type: input.task_type,
            payload: input.payload,
            brand_context: input.brand_context,
            timeout: input.timeout,
            depends_on: input.depends_on,
        };
        let task_id = self
            .ctx
            .queue
            .add_task(data, input.priority.unwrap_or_default(), 0)
            .await?;
        Ok(json!({"success": true, "taskId": task_id}))
    }
}

/// Reports a task's public status.
pub struct GetTaskStatusTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl GetTaskStatusTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "get_task_status",
                "Get the status of a task in the queue",
                inputs::task_id_schema("The ID of the task to check"),
            ),
        }
    }
}

#[async_trait]
impl McpTool for GetTaskStatusTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let TaskIdInput { task_id } = parse_input(input)?;
        Ok(match self.ctx.queue.get_task_status(&task_id).await? {
            Some(status) => json!({"success": true, "status": status}),
            None => task_not_found(&task_id),
        })
    }
}

/// Fetches a task's result.
pub struct GetTaskResultTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl GetTaskResultTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "get_task_result",
                "Get the result of a completed task",
                inputs::task_id_schema("The ID of the task to get results for"),
            ),
        }
    }
}

#[async_trait]
impl McpTool for GetTaskResultTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let TaskIdInput { task_id } = parse_input(input)?;
        Ok(match self.ctx.queue.get_task_result(&task_id).await? {
            Some(result) => json!({"success": true, "result": result}),
            None => task_not_found(&task_id),
        })
    }
}

fn task_not_found(task_id: &str) -> Value {
    json!({"success": false, "error": format!("Task with ID {task_id} not found")})
}

/// Removes a task that has not been claimed.
pub struct CancelTaskTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl CancelTaskTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "cancel_task",
                "Cancel a task that is still waiting in the queue",
                inputs::task_id_schema("The ID of the task to cancel"),
            ),
        }
    }
}

#[async_trait]
impl McpTool for CancelTaskTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let TaskIdInput { task_id } = parse_input(input)?;
        Ok(if self.ctx.queue.cancel_task(&task_id).await? {
            json!({"success": true, "taskId": task_id})
        } else {
            json!({
                "success": false,
                "error": format!("Task {task_id} could not be cancelled (not found or no longer pending)"),
            })
        })
    }
}

/// Adds an agent to the registry.
pub struct RegisterAgentTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl RegisterAgentTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "register_agent",
                "Register a new agent with the orchestration layer",
                inputs::register_agent_schema(),
            ),
        }
    }
}

#[async_trait]
impl McpTool for RegisterAgentTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let request: AgentRegistrationRequest = parse_input(input)?;
        let agent = self.ctx.agents.register_agent(request);
        Ok(json!({
            "success": true,
            "agentId": agent.id,
            "name": agent.name,
            "type": agent.agent_type,
        }))
    }
}

/// Aggregate registry counts.
pub struct GetAgentStatsTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl GetAgentStatsTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "get_agent_stats",
                "Get statistics about registered agents",
                json!({"type": "object", "properties": {}}),
            ),
        }
    }
}

#[async_trait]
impl McpTool for GetAgentStatsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, _input: Value) -> BrandmeshResult<Value> {
        Ok(json!({"success": true, "stats": self.ctx.agents.get_agent_stats()}))
    }
}

/// Enqueues a `workflow_execution` job at high priority.
pub struct OrchestrateWorkflowTool {
    ctx: OrchestrationContext,
    descriptor: ToolDescriptor,
}

impl OrchestrateWorkflowTool {
    /// Tool bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: descriptor(
                "orchestrate_workflow",
                "Orchestrate a multi-step workflow using multiple agents",
                inputs::orchestrate_workflow_schema(),
            ),
        }
    }
}

#[async_trait]
impl McpTool for OrchestrateWorkflowTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, input: Value) -> BrandmeshResult<Value> {
        let input: OrchestrateWorkflowInput = parse_input(input)?;
        input.validate()?;
        info!(workflow_type = %input.workflow_type, steps = input.steps.len(), "Orchestrating workflow");

        let estimated_steps = input.steps.len();
        let mut payload = Map::new();
        payload.insert("workflowType".into(), Value::String(input.workflow_type));
        payload.insert("steps".into(), serde_json::to_value(&input.steps)?);
        payload.insert("context".into(), Value::Object(input.context));

        let data = TaskData {
            task_type: TaskType::WorkflowExecution,
            payload,
            brand_context: input.brand_context,
            timeout: input.timeout,
            depends_on: None,
        };
        let task_id = self
            .ctx
            .queue
            .add_task(data, TaskPriority::High, 0)
            .await?;
        Ok(json!({
            "success": true,
            "message": "Workflow orchestration initiated",
            "taskId": task_id,
            "estimatedSteps": estimated_steps,
        }))
    }
}
