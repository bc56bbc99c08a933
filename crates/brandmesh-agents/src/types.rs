use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// System prompt used when a request does not supply one.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a helpful AI agent.";
/// Sampling temperature used when a request does not supply one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Token limit used when a request does not supply one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Unit enums with a fixed wire name per variant.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Fine-grained skill an agent offers.
    AgentCapability {
        /// Writes content.
        ContentGeneration => "content_generation",
        /// Checks content against a brand.
        ContextValidation => "context_validation",
        /// Manages assets.
        AssetManagement => "asset_management",
        /// Analyses metrics.
        Analytics => "analytics",
        /// Coordinates multi-step work.
        WorkflowOrchestration => "workflow_orchestration",
        /// General reasoning.
        Reasoning => "reasoning",
        /// Breaks goals into steps.
        Planning => "planning",
        /// Writes code.
        CodeGeneration => "code_generation",
    }
}

wire_enum! {
    /// Execution state of an agent.
    AgentStatus {
        /// Ready for work.
        Idle => "idle",
        /// Executing a prompt.
        Busy => "busy",
        /// Taken out of rotation by an operator.
        Offline => "offline",
        /// Last execution failed unexpectedly.
        Error => "error",
    }
}

wire_enum! {
    /// Coarse role of an agent.
    AgentType {
        /// Owns brand context.
        BrandContext => "brand_context",
        /// Generates content.
        ContentGeneration => "content_generation",
        /// Produces analytics.
        Analytics => "analytics",
        /// Manages assets.
        AssetManagement => "asset_management",
        /// Runs workflows.
        WorkflowOrchestration => "workflow_orchestration",
    }
}

wire_enum! {
    /// Backend an agent executes on.
    ModelProvider {
        /// OpenAI chat completions.
        OpenAi => "openai",
        /// Anthropic messages.
        Anthropic => "anthropic",
        /// Local Ollama server.
        Ollama => "ollama",
        /// User-supplied execution logic.
        Custom => "custom",
    }
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// `{type}-{millis}-{random}`, fixed at registration.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Coarse role.
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Skills, without duplicates.
    pub capabilities: Vec<AgentCapability>,
    /// Execution state.
    pub status: AgentStatus,
    /// Backend used by `execute_agent`.
    pub model_provider: ModelProvider,
    /// Backend-specific model id.
    pub model_name: String,
    /// Last status change or execution.
    pub last_active: DateTime<Utc>,
    /// Free-form registration metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Input of `register_agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistrationRequest {
    /// Display label.
    pub name: String,
    /// Coarse role.
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Skills.
    pub capabilities: Vec<AgentCapability>,
    /// Backend.
    pub model_provider: ModelProvider,
    /// Backend-specific model id.
    pub model_name: String,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Input of `execute_agent` on the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecutionRequest {
    /// Target agent.
    pub agent_id: String,
    /// User message.
    pub prompt: String,
    /// Brand tag recorded in result metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_context: Option<String>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// System prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
}

impl AgentExecutionRequest {
    /// Request with only the required fields set.
    pub fn new(agent_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Requested temperature; an explicit zero is kept.
    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Requested token limit.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Requested system prompt.
    pub fn system_instructions(&self) -> &str {
        self.system_instructions
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_INSTRUCTIONS)
    }
}

/// Token accounting normalized across providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens.
    pub prompt_tokens: u64,
    /// Output tokens.
    pub completion_tokens: u64,
    /// Both.
    pub total_tokens: u64,
}

/// Outcome of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecutionResult {
    /// Whether the provider produced output.
    pub success: bool,
    /// Model output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Wall-clock milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Agent that ran (or was asked to run) the prompt.
    pub agent_id: String,
    /// Provider details such as model and stop reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl AgentExecutionResult {
    /// Successful execution.
    pub fn success(
        agent_id: impl Into<String>,
        output: impl Into<String>,
        usage: TokenUsage,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            usage: Some(usage),
            duration: None,
            agent_id: agent_id.into(),
            metadata: Some(metadata),
        }
    }

    /// Structured failure.
    pub fn failure(agent_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            usage: None,
            duration: None,
            agent_id: agent_id.into(),
            metadata: None,
        }
    }
}

/// Aggregate counts per enum value, zeros included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    /// All registered agents.
    pub total_agents: usize,
    /// Count per type.
    pub agents_by_type: BTreeMap<AgentType, usize>,
    /// Count per status.
    pub agents_by_status: BTreeMap<AgentStatus, usize>,
    /// Count per provider.
    pub agents_by_model_provider: BTreeMap<ModelProvider, usize>,
}

/// Usage totals recorded per agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    /// Executions that reached a provider.
    pub executions: u64,
    /// Executions that did not succeed.
    pub failures: u64,
    /// Tokens reported by providers.
    pub total_tokens: u64,
    /// Summed wall-clock time.
    pub total_duration_ms: u64,
}

/// An agent together with its usage totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    /// Agent record.
    #[serde(flatten)]
    pub agent: Agent,
    /// Usage totals.
    pub metrics: AgentMetrics,
}
