use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counters tracked per agent type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_started: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
    /// The most recent task of this agent failed and nothing is in flight.
    Error,
}

/// Real-time snapshot of one agent type's activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_type: String,
    pub in_flight: u32,
    pub status: WorkerStatus,
    pub metrics: AgentMetrics,
}

impl AgentState {
    fn new(agent_type: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            in_flight: 0,
            status: WorkerStatus::Idle,
            metrics: AgentMetrics::default(),
        }
    }
}

/// Tracks activity and metrics for every agent type the executor dispatches to.
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<String, AgentState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a task dispatched to an agent type.
    pub async fn start_task(&self, agent_type: &str) {
        let mut states = self.states.write().await;
        let state = states
            .entry(agent_type.to_string())
            .or_insert_with(|| AgentState::new(agent_type));
        state.in_flight += 1;
        state.metrics.tasks_started += 1;
        state.status = WorkerStatus::Working;
    }

    /// Record a task finishing, successfully or not.
    pub async fn finish_task(&self, agent_type: &str, duration_ms: u64, succeeded: bool) {
        let mut states = self.states.write().await;
        let state = states
            .entry(agent_type.to_string())
            .or_insert_with(|| AgentState::new(agent_type));
        state.in_flight = state.in_flight.saturating_sub(1);
        state.metrics.duration_ms += duration_ms;
        if succeeded {
            state.metrics.tasks_completed += 1;
        } else {
            state.metrics.tasks_failed += 1;
        }
        state.status = match (state.in_flight, succeeded) {
            (0, true) => WorkerStatus::Idle,
            (0, false) => WorkerStatus::Error,
            _ => WorkerStatus::Working,
        };
    }

    /// Snapshot of all agent states, sorted by agent type.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        let mut out: Vec<AgentState> = states.values().cloned().collect();
        out.sort_by(|a, b| a.agent_type.cmp(&b.agent_type));
        out
    }

    pub async fn get_state(&self, agent_type: &str) -> Option<AgentState> {
        let states = self.states.read().await;
        states.get(agent_type).cloned()
    }

    /// Aggregate metrics across all agent types.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        let mut total = AgentMetrics::default();
        for state in states.values() {
            total.tasks_started += state.metrics.tasks_started;
            total.tasks_completed += state.metrics.tasks_completed;
            total.tasks_failed += state.metrics.tasks_failed;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Serialize the current state as JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
