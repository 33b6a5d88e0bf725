use crate::types::TaskSpec;
use opsmesh_agents::AgentRegistry;
use opsmesh_core::{OpsmeshError, OpsmeshResult};
use std::sync::Arc;
use tracing::debug;

/// Maps requests to agent types by asking every registered agent whether it
/// can handle the text.
#[derive(Clone)]
pub struct Router {
    agents: Arc<AgentRegistry>,
}

impl Router {
    pub fn new(agents: Arc<AgentRegistry>) -> Self {
        Self { agents }
    }

    /// Agent types whose capability predicate accepts `request`, in
    /// registration order. Empty when nothing matches.
    pub fn route(&self, request: &str) -> Vec<String> {
        let matched: Vec<String> = self
            .agents
            .agents()
            .filter(|agent| agent.can_handle(request))
            .map(|agent| agent.descriptor().agent_type.clone())
            .collect();
        debug!(request, matched = ?matched, "Routed request");
        matched
    }

    /// Like [`route`](Self::route), but an empty match is a `RoutingFailure`.
    pub fn route_required(&self, request: &str) -> OpsmeshResult<Vec<String>> {
        let matched = self.route(request);
        if matched.is_empty() {
            return Err(OpsmeshError::RoutingFailure(request.to_string()));
        }
        Ok(matched)
    }

    /// Distinct agent types referenced by an explicit task list, in first-use
    /// order. Unregistered types are included; they fail at dispatch.
    pub fn route_tasks(&self, tasks: &[TaskSpec]) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for task in tasks {
            if !types.contains(&task.agent_type) {
                types.push(task.agent_type.clone());
            }
        }
        types
    }

    /// Referenced agent types that have no registered agent.
    pub fn unregistered(&self, tasks: &[TaskSpec]) -> Vec<String> {
        self.route_tasks(tasks)
            .into_iter()
            .filter(|t| !self.agents.contains(t))
            .collect()
    }
}
