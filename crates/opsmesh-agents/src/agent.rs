use async_trait::async_trait;
use opsmesh_core::{OpsmeshResult, TaskCall, TaskOutput};
use serde::{Deserialize, Serialize};

/// Metadata describing an agent's capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Agent type tag tasks are addressed to.
    pub agent_type: String,
    pub description: String,
    /// Lowercase keywords matched against request text.
    pub keywords: Vec<String>,
    /// Whether completed tasks of this agent are provisioning or deployment
    /// actions that belong in the deployment history.
    #[serde(default)]
    pub records_deployments: bool,
}

impl AgentDescriptor {
    pub fn new(agent_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            description: description.into(),
            keywords: Vec::new(),
            records_deployments: false,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self
    }

    pub fn recording_deployments(mut self) -> Self {
        self.records_deployments = true;
        self
    }

    /// Case-insensitive substring match of any keyword against `text`.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Trait that all agents implement.
///
/// `execute` may block on external I/O; callers never hold a shared lock
/// while it runs. A failure is reported either as `Err` or as a
/// [`TaskOutput`] with `is_error` set.
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    /// Whether this agent can handle the given request or task description.
    fn can_handle(&self, text: &str) -> bool {
        self.descriptor().matches(text)
    }

    async fn execute(&self, call: &TaskCall) -> OpsmeshResult<TaskOutput>;
}
