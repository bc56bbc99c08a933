use crate::registry::AgentRegistry;
use crate::types::{Agent, AgentCapability, AgentRegistrationRequest, AgentType, ModelProvider};

/// The stock roster a fresh service starts with.
pub fn default_agents() -> Vec<AgentRegistrationRequest> {
    use AgentCapability as C;

    let agent = |name: &str,
                 agent_type: AgentType,
                 capabilities: Vec<AgentCapability>,
                 model_provider: ModelProvider,
                 model_name: &str| AgentRegistrationRequest {
        name: name.to_string(),
        agent_type,
        capabilities,
        model_provider,
        model_name: model_name.to_string(),
        metadata: None,
    };

    vec![
        agent(
            "Brand Context Manager",
            AgentType::BrandContext,
            vec![C::ContextValidation, C::Reasoning],
            ModelProvider::OpenAi,
            "gpt-4",
        ),
        agent(
            "Content Generator",
            AgentType::ContentGeneration,
            vec![C::ContentGeneration, C::CodeGeneration],
            ModelProvider::Anthropic,
            "claude-3-opus-20240229",
        ),
        agent(
            "Workflow Orchestrator",
            AgentType::WorkflowOrchestration,
            vec![C::WorkflowOrchestration, C::Planning],
            ModelProvider::OpenAi,
            "gpt-4-turbo",
        ),
        agent(
            "Analytics Agent",
            AgentType::Analytics,
            vec![C::Analytics, C::Reasoning],
            ModelProvider::Anthropic,
            "claude-3-sonnet-20240229",
        ),
        agent(
            "Asset Manager",
            AgentType::AssetManagement,
            vec![C::AssetManagement],
            ModelProvider::Ollama,
            "llama3",
        ),
    ]
}

/// Register [`default_agents`] and return the created records.
pub fn register_default_agents(registry: &AgentRegistry) -> Vec<Agent> {
    default_agents()
        .into_iter()
        .map(|request| registry.register_agent(request))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_covers_every_type_once() {
        let registry = AgentRegistry::default();
        let agents = register_default_agents(&registry);
        assert_eq!(agents.len(), 5);
        for agent_type in AgentType::ALL {
            assert_eq!(registry.find_agents_by_type(*agent_type).len(), 1, "{agent_type}");
        }
        assert_eq!(
            registry.find_agents_by_capability(AgentCapability::Reasoning).len(),
            2
        );
        let stats = registry.get_agent_stats();
        assert_eq!(stats.agents_by_model_provider[&ModelProvider::OpenAi], 2);
        assert_eq!(stats.agents_by_model_provider[&ModelProvider::Ollama], 1);
        assert_eq!(stats.agents_by_model_provider[&ModelProvider::Custom], 0);
    }
}
