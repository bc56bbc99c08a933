use brandmesh_agents::AgentRegistry;
use brandmesh_queue::TaskQueueSystem;
use std::sync::Arc;

/// Everything the dispatch tools operate on, built once at startup.
#[derive(Clone)]
pub struct OrchestrationContext {
    /// Job queue.
    pub queue: Arc<TaskQueueSystem>,
    /// Agent directory.
    pub agents: Arc<AgentRegistry>,
}

impl OrchestrationContext {
    /// Bundle the shared handles.
    pub fn new(queue: Arc<TaskQueueSystem>, agents: Arc<AgentRegistry>) -> Self {
        Self { queue, agents }
    }
}
