//! Dispatch protocol for the agent orchestration service.
//!
//! Binds the task queue and the agent registry to named protocol tools
//! (`execute_agent`, `add_task_to_queue`, `orchestrate_workflow`, ...) and
//! resources, and provides the [`WorkflowProcessor`] that runs
//! `workflow_execution` jobs.

/// Shared handles for tools.
pub mod context;
/// Typed tool inputs and schemas.
pub mod inputs;
/// Protocol resources.
pub mod resources;
/// Server identity and assembly.
pub mod server;
/// Dispatch tools.
pub mod tools;
/// Workflow job processor.
pub mod workflow;

pub use context::OrchestrationContext;
pub use inputs::WorkflowStep;
pub use server::{build_server, server_info, SERVER_NAME};
pub use workflow::WorkflowProcessor;
