use crate::agent::{Agent, AgentDescriptor};
use opsmesh_core::{OpsmeshError, OpsmeshResult, TaskCall, TaskOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Central registry holding one agent instance per agent type.
///
/// Registration order is preserved; routing and listing follow it.
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register an agent. A second agent of the same type replaces the first
    /// but keeps its position.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let agent_type = agent.descriptor().agent_type.clone();
        match self.index.get(&agent_type) {
            Some(&slot) => {
                info!(agent = %agent_type, "Replaced agent");
                self.agents[slot] = agent;
            }
            None => {
                info!(agent = %agent_type, "Registered agent");
                self.index.insert(agent_type, self.agents.len());
                self.agents.push(agent);
            }
        }
    }

    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn Agent>> {
        self.index
            .get(agent_type)
            .map(|&slot| Arc::clone(&self.agents[slot]))
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.index.contains_key(agent_type)
    }

    /// Agents in registration order.
    pub fn agents(&self) -> impl Iterator<Item = &Arc<dyn Agent>> {
        self.agents.iter()
    }

    pub fn list_descriptors(&self) -> Vec<&AgentDescriptor> {
        self.agents.iter().map(|a| a.descriptor()).collect()
    }

    /// Resolve the agent for `call.agent_type` and run it.
    pub async fn execute(&self, call: &TaskCall) -> OpsmeshResult<TaskOutput> {
        let agent = self
            .get(&call.agent_type)
            .ok_or_else(|| OpsmeshError::AgentNotFound(call.agent_type.clone()))?;
        agent.execute(call).await
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
