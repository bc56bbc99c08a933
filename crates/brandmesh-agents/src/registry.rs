//! In-memory agent directory with single-flight execution per agent.

use crate::backends::{ProviderBackend, ProviderTable};
use crate::types::{
    Agent, AgentCapability, AgentExecutionRequest, AgentExecutionResult, AgentMetrics,
    AgentRegistrationRequest, AgentStats, AgentStatus, AgentType, AgentView, ModelProvider,
};
use brandmesh_core::{generate_id, BrandmeshError};
use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Primary map, indices and metrics. Everything changes under one lock so
/// the indices never disagree with the map.
#[derive(Default)]
struct RegistryState {
    agents: HashMap<String, Agent>,
    /// Registration order.
    order: Vec<String>,
    by_capability: HashMap<AgentCapability, Vec<String>>,
    by_type: HashMap<AgentType, Vec<String>>,
    by_provider: HashMap<ModelProvider, Vec<String>>,
    metrics: HashMap<String, AgentMetrics>,
}

impl RegistryState {
    fn insert(&mut self, agent: Agent) {
        for capability in &agent.capabilities {
            self.by_capability
                .entry(*capability)
                .or_default()
                .push(agent.id.clone());
        }
        self.by_type
            .entry(agent.agent_type)
            .or_default()
            .push(agent.id.clone());
        self.by_provider
            .entry(agent.model_provider)
            .or_default()
            .push(agent.id.clone());
        self.order.push(agent.id.clone());
        self.metrics.insert(agent.id.clone(), AgentMetrics::default());
        self.agents.insert(agent.id.clone(), agent);
    }

    fn remove(&mut self, agent_id: &str) -> Option<Agent> {
        let agent = self.agents.remove(agent_id)?;
        for capability in &agent.capabilities {
            unindex(&mut self.by_capability, capability, agent_id);
        }
        unindex(&mut self.by_type, &agent.agent_type, agent_id);
        unindex(&mut self.by_provider, &agent.model_provider, agent_id);
        self.order.retain(|id| id != agent_id);
        self.metrics.remove(agent_id);
        Some(agent)
    }

    fn resolve(&self, ids: Option<&Vec<String>>) -> Vec<Agent> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.agents.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

fn unindex<K: Eq + Hash>(index: &mut HashMap<K, Vec<String>>, key: &K, agent_id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|id| id != agent_id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn count_by<K: Ord + Copy>(
    all: &[K],
    agents: &[&Agent],
    key: impl Fn(&Agent) -> K,
) -> BTreeMap<K, usize> {
    let mut counts: BTreeMap<K, usize> = all.iter().map(|k| (*k, 0)).collect();
    for agent in agents.iter().copied() {
        *counts.entry(key(agent)).or_insert(0) += 1;
    }
    counts
}

fn panic_detail(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Releases the busy flag of an executing agent.
///
/// `finish` records the outcome. If the execution future is dropped first
/// (caller timeout, client disconnect) the agent goes back to idle and the
/// attempt counts as a failure.
struct ExecutionGuard<'a> {
    state: &'a RwLock<RegistryState>,
    agent_id: &'a str,
    started: Instant,
    finished: bool,
}

impl ExecutionGuard<'_> {
    /// Write the final status and metrics. Returns the elapsed milliseconds.
    fn finish(&mut self, status: AgentStatus, success: bool, tokens: u64) -> u64 {
        self.finished = true;
        let duration = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut state = self.state.write();
        if let Some(current) = state.agents.get_mut(self.agent_id) {
            current.status = status;
            current.last_active = Utc::now();
        }
        if let Some(metrics) = state.metrics.get_mut(self.agent_id) {
            metrics.executions += 1;
            if !success {
                metrics.failures += 1;
            }
            metrics.total_tokens += tokens;
            metrics.total_duration_ms += duration;
        }
        duration
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(agent_id = %self.agent_id, "Agent execution cancelled before completion");
            self.finish(AgentStatus::Idle, false, 0);
        }
    }
}

/// Directory of agents, indexed by capability, type and provider.
///
/// Lookups return agents in registration order, so the first idle match is
/// deterministic.
pub struct AgentRegistry {
    state: RwLock<RegistryState>,
    providers: RwLock<ProviderTable>,
}

impl AgentRegistry {
    /// Empty registry dispatching through `providers`.
    pub fn new(providers: ProviderTable) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            providers: RwLock::new(providers),
        }
    }

    /// Swap the backend used for `provider`.
    pub fn set_backend(&self, provider: ModelProvider, backend: Arc<dyn ProviderBackend>) {
        self.providers.write().set(provider, backend);
    }

    /// Register a new idle agent. Names are not deduplicated.
    pub fn register_agent(&self, request: AgentRegistrationRequest) -> Agent {
        let mut capabilities = Vec::with_capacity(request.capabilities.len());
        for capability in request.capabilities {
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }

        let agent = Agent {
            id: generate_id(request.agent_type.as_str()),
            name: request.name,
            agent_type: request.agent_type,
            capabilities,
            status: AgentStatus::Idle,
            model_provider: request.model_provider,
            model_name: request.model_name,
            last_active: Utc::now(),
            metadata: request.metadata.unwrap_or_default(),
        };

        self.state.write().insert(agent.clone());
        info!(
            agent_id = %agent.id,
            agent_type = %agent.agent_type,
            provider = %agent.model_provider,
            "Registered agent"
        );
        agent
    }

    /// Snapshot of one agent.
    pub fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.state.read().agents.get(agent_id).cloned()
    }

    /// Every agent in registration order.
    pub fn all_agents(&self) -> Vec<Agent> {
        let state = self.state.read();
        state.resolve(Some(&state.order))
    }

    /// Every agent with its usage totals, in registration order.
    pub fn agent_views(&self) -> Vec<AgentView> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| {
                let agent = state.agents.get(id)?.clone();
                let metrics = state.metrics.get(id).copied().unwrap_or_default();
                Some(AgentView { agent, metrics })
            })
            .collect()
    }

    /// Usage totals for one agent.
    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.state.read().metrics.get(agent_id).copied()
    }

    /// Agents of `agent_type`, in registration order.
    pub fn find_agents_by_type(&self, agent_type: AgentType) -> Vec<Agent> {
        let state = self.state.read();
        state.resolve(state.by_type.get(&agent_type))
    }

    /// Agents offering `capability`, in registration order.
    pub fn find_agents_by_capability(&self, capability: AgentCapability) -> Vec<Agent> {
        let state = self.state.read();
        state.resolve(state.by_capability.get(&capability))
    }

    /// Agents backed by `provider`, in registration order.
    pub fn find_agents_by_provider(&self, provider: ModelProvider) -> Vec<Agent> {
        let state = self.state.read();
        state.resolve(state.by_provider.get(&provider))
    }

    /// Idle subset of [`Self::find_agents_by_capability`].
    pub fn find_idle_agents_by_capability(&self, capability: AgentCapability) -> Vec<Agent> {
        self.find_agents_by_capability(capability)
            .into_iter()
            .filter(|a| a.status == AgentStatus::Idle)
            .collect()
    }

    /// Idle subset of [`Self::find_agents_by_type`].
    pub fn find_idle_agents_by_type(&self, agent_type: AgentType) -> Vec<Agent> {
        self.find_agents_by_type(agent_type)
            .into_iter()
            .filter(|a| a.status == AgentStatus::Idle)
            .collect()
    }

    /// Set an agent's status. Returns `false` for an unknown agent.
    pub fn update_agent_status(&self, agent_id: &str, status: AgentStatus) -> bool {
        let mut state = self.state.write();
        let Some(agent) = state.agents.get_mut(agent_id) else {
            return false;
        };
        agent.status = status;
        agent.last_active = Utc::now();
        info!(agent_id = %agent_id, status = %status, "Agent status updated");
        true
    }

    /// Remove an agent and every index entry pointing at it.
    pub fn remove_agent(&self, agent_id: &str) -> bool {
        let removed = self.state.write().remove(agent_id).is_some();
        if removed {
            info!(agent_id = %agent_id, "Removed agent");
        }
        removed
    }

    /// Counts per type, status and provider, zeros included.
    pub fn get_agent_stats(&self) -> AgentStats {
        let state = self.state.read();
        let agents: Vec<&Agent> = state.agents.values().collect();
        AgentStats {
            total_agents: agents.len(),
            agents_by_type: count_by(AgentType::ALL, &agents, |a| a.agent_type),
            agents_by_status: count_by(AgentStatus::ALL, &agents, |a| a.status),
            agents_by_model_provider: count_by(ModelProvider::ALL, &agents, |a| a.model_provider),
        }
    }

    /// Run a prompt on one agent.
    ///
    /// An unknown or busy agent yields a failure result without touching any
    /// state. Otherwise the agent is busy for the duration of the provider
    /// call and returns to idle, or to error when the backend returned an
    /// `Err` or panicked. Dropping the returned future mid-call also returns
    /// the agent to idle.
    pub async fn execute_agent(&self, request: AgentExecutionRequest) -> AgentExecutionResult {
        let agent = {
            let mut state = self.state.write();
            let Some(agent) = state.agents.get_mut(&request.agent_id) else {
                return AgentExecutionResult::failure(
                    &request.agent_id,
                    format!("Agent with ID {} not found", request.agent_id),
                );
            };
            if agent.status == AgentStatus::Busy {
                return AgentExecutionResult::failure(
                    &request.agent_id,
                    format!("Agent {} is busy", request.agent_id),
                );
            }
            agent.status = AgentStatus::Busy;
            agent.last_active = Utc::now();
            agent.clone()
        };

        let mut guard = ExecutionGuard {
            state: &self.state,
            agent_id: &agent.id,
            started: Instant::now(),
            finished: false,
        };

        let backend = self.providers.read().get(agent.model_provider);
        let outcome = match backend {
            Some(backend) => {
                AssertUnwindSafe(backend.execute(&agent, &request))
                    .catch_unwind()
                    .await
            }
            None => Ok(Err(BrandmeshError::Provider(format!(
                "No backend installed for provider {}",
                agent.model_provider
            )))),
        };

        let (mut result, next_status) = match outcome {
            Ok(Ok(result)) => {
                if !result.success {
                    warn!(
                        agent_id = %agent.id,
                        error = result.error.as_deref().unwrap_or_default(),
                        "Agent execution failed"
                    );
                }
                (result, AgentStatus::Idle)
            }
            Ok(Err(e)) => {
                error!(agent_id = %agent.id, error = %e, "Agent backend error");
                (
                    AgentExecutionResult::failure(&agent.id, e.to_string()),
                    AgentStatus::Error,
                )
            }
            Err(panic) => {
                let detail = panic_detail(panic);
                error!(agent_id = %agent.id, error = %detail, "Agent backend panicked");
                (
                    AgentExecutionResult::failure(
                        &agent.id,
                        format!("Provider panicked: {detail}"),
                    ),
                    AgentStatus::Error,
                )
            }
        };
        let tokens = result.usage.map_or(0, |u| u.total_tokens);
        result.duration = Some(guard.finish(next_status, result.success, tokens));
        result
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(ProviderTable::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(name: &str, agent_type: AgentType, capabilities: Vec<AgentCapability>) -> AgentRegistrationRequest {
        AgentRegistrationRequest {
            name: name.to_string(),
            agent_type,
            capabilities,
            model_provider: ModelProvider::Custom,
            model_name: "echo".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_register_indexes_everything() {
        let registry = AgentRegistry::default();
        let agent = registry.register_agent(request(
            "Writer",
            AgentType::ContentGeneration,
            vec![
                AgentCapability::ContentGeneration,
                AgentCapability::Reasoning,
                AgentCapability::Reasoning,
            ],
        ));

        assert!(agent.id.starts_with("content_generation-"));
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.capabilities.len(), 2);
        assert_eq!(registry.find_agents_by_type(AgentType::ContentGeneration).len(), 1);
        assert_eq!(
            registry.find_agents_by_capability(AgentCapability::Reasoning)[0].id,
            agent.id
        );
        assert_eq!(registry.find_agents_by_provider(ModelProvider::Custom).len(), 1);
        assert!(registry.find_agents_by_type(AgentType::Analytics).is_empty());
        assert_eq!(registry.agent_metrics(&agent.id), Some(AgentMetrics::default()));
    }

    #[test]
    fn test_duplicate_names_get_distinct_ids() {
        let registry = AgentRegistry::default();
        let a = registry.register_agent(request("Twin", AgentType::Analytics, vec![]));
        let b = registry.register_agent(request("Twin", AgentType::Analytics, vec![]));
        assert_ne!(a.id, b.id);
        let ids: Vec<String> = registry.all_agents().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_remove_purges_indices() {
        let registry = AgentRegistry::default();
        let keep = registry.register_agent(request(
            "Other planner",
            AgentType::WorkflowOrchestration,
            vec![AgentCapability::Planning],
        ));
        let before = registry.get_agent_stats();

        let agent = registry.register_agent(AgentRegistrationRequest {
            model_provider: ModelProvider::OpenAi,
            ..request(
                "Planner",
                AgentType::Analytics,
                vec![AgentCapability::Planning, AgentCapability::WorkflowOrchestration],
            )
        });
        assert_ne!(registry.get_agent_stats(), before);

        assert!(registry.remove_agent(&agent.id));
        assert!(!registry.remove_agent(&agent.id));
        assert!(registry.get_agent(&agent.id).is_none());
        assert_eq!(registry.get_agent_stats(), before);
        assert!(registry.find_agents_by_type(AgentType::Analytics).is_empty());
        assert!(registry.find_agents_by_provider(ModelProvider::OpenAi).is_empty());
        assert!(registry
            .find_agents_by_capability(AgentCapability::WorkflowOrchestration)
            .is_empty());
        let planners = registry.find_agents_by_capability(AgentCapability::Planning);
        assert_eq!(planners.len(), 1);
        assert_eq!(planners[0].id, keep.id);

        let state = registry.state.read();
        assert!(!state
            .by_capability
            .contains_key(&AgentCapability::WorkflowOrchestration));
        assert!(!state.by_type.contains_key(&AgentType::Analytics));
        assert!(!state.by_provider.contains_key(&ModelProvider::OpenAi));
        assert!(state.metrics.get(&agent.id).is_none());
        assert_eq!(state.order, vec![keep.id.clone()]);
    }

    #[test]
    fn test_status_updates_and_idle_filters() {
        let registry = AgentRegistry::default();
        let a = registry.register_agent(request("A", AgentType::Analytics, vec![AgentCapability::Analytics]));
        let b = registry.register_agent(request("B", AgentType::Analytics, vec![AgentCapability::Analytics]));

        assert!(registry.update_agent_status(&a.id, AgentStatus::Offline));
        assert!(!registry.update_agent_status("missing", AgentStatus::Idle));

        let idle = registry.find_idle_agents_by_type(AgentType::Analytics);
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].id, b.id);
        assert_eq!(
            registry.find_idle_agents_by_capability(AgentCapability::Analytics)[0].id,
            b.id
        );
    }

    #[test]
    fn test_stats_include_zero_counts() {
        let registry = AgentRegistry::default();
        let a = registry.register_agent(request("A", AgentType::Analytics, vec![]));
        registry.register_agent(request("B", AgentType::AssetManagement, vec![]));
        registry.update_agent_status(&a.id, AgentStatus::Error);

        let stats = registry.get_agent_stats();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.agents_by_type.len(), AgentType::ALL.len());
        assert_eq!(stats.agents_by_type[&AgentType::BrandContext], 0);
        assert_eq!(stats.agents_by_type[&AgentType::Analytics], 1);
        assert_eq!(stats.agents_by_status[&AgentStatus::Error], 1);
        assert_eq!(stats.agents_by_status[&AgentStatus::Idle], 1);
        assert_eq!(stats.agents_by_status[&AgentStatus::Busy], 0);
        assert_eq!(stats.agents_by_model_provider[&ModelProvider::Custom], 2);
        assert_eq!(stats.agents_by_model_provider[&ModelProvider::OpenAi], 0);
    }

    #[tokio::test]
    async fn test_execute_unknown_agent() {
        let registry = AgentRegistry::default();
        let result = registry
            .execute_agent(AgentExecutionRequest::new("ghost", "hi"))
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Agent with ID ghost not found"));
        assert!(result.duration.is_none());
    }

    #[tokio::test]
    async fn test_execute_rejects_busy_agent_without_state_change() {
        let registry = AgentRegistry::default();
        let agent = registry.register_agent(request("A", AgentType::Analytics, vec![]));
        registry.update_agent_status(&agent.id, AgentStatus::Busy);

        let result = registry
            .execute_agent(AgentExecutionRequest::new(&agent.id, "hi"))
            .await;
        assert_eq!(result.error, Some(format!("Agent {} is busy", agent.id)));
        assert_eq!(registry.get_agent(&agent.id).unwrap().status, AgentStatus::Busy);
        assert_eq!(registry.agent_metrics(&agent.id).unwrap().executions, 0);
    }
}
