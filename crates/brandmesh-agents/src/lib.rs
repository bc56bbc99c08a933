//! Agent directory and model provider backends.
//!
//! [`AgentRegistry`] tracks agents by capability, type and provider and runs
//! at most one prompt per agent at a time, dispatching to the
//! [`ProviderBackend`] installed for the agent's [`ModelProvider`].

/// Provider backends and the dispatch table.
pub mod backends;
/// Provider credentials and endpoints.
pub mod config;
/// Stock agent roster.
pub mod defaults;
/// Agent directory and execution.
pub mod registry;
/// Agent, request and result types.
pub mod types;

pub use backends::{ProviderBackend, ProviderTable};
pub use config::ProviderConfig;
pub use defaults::{default_agents, register_default_agents};
pub use registry::AgentRegistry;
pub use types::{
    Agent, AgentCapability, AgentExecutionRequest, AgentExecutionResult, AgentMetrics,
    AgentRegistrationRequest, AgentStats, AgentStatus, AgentType, AgentView, ModelProvider,
    TokenUsage, DEFAULT_MAX_TOKENS, DEFAULT_SYSTEM_INSTRUCTIONS, DEFAULT_TEMPERATURE,
};
