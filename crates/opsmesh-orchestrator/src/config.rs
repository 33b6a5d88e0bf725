use opsmesh_core::{OpsmeshError, OpsmeshResult};
use serde::{Deserialize, Serialize};

/// What happens to the rest of a plan when a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip only the failed task's transitive dependents; independent
    /// branches keep running.
    #[default]
    Isolate,
    /// Also skip every task that has not started yet. In-flight tasks finish.
    FailFast,
}

/// Orchestrator tuning, usually loaded from the `[orchestrator]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum tasks of one plan running at once; `0` means unbounded.
    #[serde(default)]
    pub max_concurrency: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Chain the tasks generated for a request matching several agents.
    #[serde(default = "default_chain_routed_tasks")]
    pub chain_routed_tasks: bool,
}

fn default_chain_routed_tasks() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            failure_policy: FailurePolicy::default(),
            chain_routed_tasks: default_chain_routed_tasks(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse a standalone TOML document containing the config fields.
    pub fn from_toml_str(raw: &str) -> OpsmeshResult<Self> {
        toml::from_str(raw)
            .map_err(|e| OpsmeshError::Config(format!("Invalid orchestrator config: {e}")))
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_chained_routes(mut self, chain: bool) -> Self {
        self.chain_routed_tasks = chain;
        self
    }
}
