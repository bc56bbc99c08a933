//! Read-only protocol resources.

use crate::context::OrchestrationContext;
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use brandmesh_mcp::{McpResource, ResourceDescriptor};
use serde_json::{json, Value};
use std::sync::Arc;

/// Every resource bound to `ctx`.
pub fn all_resources(ctx: &OrchestrationContext) -> Vec<Arc<dyn McpResource>> {
    vec![
        Arc::new(AgentsResource::new(ctx.clone())),
        Arc::new(QueueStatsResource::new(ctx.clone())),
    ]
}

/// Registered agents with their usage totals.
pub struct AgentsResource {
    ctx: OrchestrationContext,
    descriptor: ResourceDescriptor,
}

impl AgentsResource {
    /// Resource bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: ResourceDescriptor {
                name: "agents".into(),
                description: "List of all registered agents and their capabilities".into(),
            },
        }
    }
}

#[async_trait]
impl McpResource for AgentsResource {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn read(&self, _uri: Option<&str>) -> BrandmeshResult<Value> {
        let agents = self.ctx.agents.agent_views();
        Ok(json!({"count": agents.len(), "agents": agents}))
    }
}

/// Live ledger counts.
pub struct QueueStatsResource {
    ctx: OrchestrationContext,
    descriptor: ResourceDescriptor,
}

impl QueueStatsResource {
    /// Resource bound to `ctx`.
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self {
            ctx,
            descriptor: ResourceDescriptor {
                name: "queue_stats".into(),
                description: "Statistics about the task queue".into(),
            },
        }
    }
}

#[async_trait]
impl McpResource for QueueStatsResource {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn read(&self, _uri: Option<&str>) -> BrandmeshResult<Value> {
        Ok(serde_json::to_value(self.ctx.queue.queue_stats().await?)?)
    }
}
