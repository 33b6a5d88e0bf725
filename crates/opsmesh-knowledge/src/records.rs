use chrono::{DateTime, Utc};
use opsmesh_core::{Metadata, PlanId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resource created by an agent (instance, bucket, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_type: String,
    pub id: String,
    pub metadata: Metadata,
    /// When the identifier was first registered.
    pub registered_at: DateTime<Utc>,
    /// When the metadata was last written.
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            metadata,
            registered_at: now,
            updated_at: now,
        }
    }
}

/// An entry in the deployment history. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    /// Agent type that produced the deployment.
    pub agent_type: String,
    pub description: String,
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Result payload reported by the agent.
    #[serde(default)]
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(agent_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            description: description.into(),
            plan_id: None,
            task_id: None,
            details: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    /// Reference the plan and task that produced this deployment.
    pub fn for_task(mut self, plan_id: PlanId, task_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id);
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// A single item in an agent's memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub content: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryItem {
    pub fn new(content: serde_json::Value) -> Self {
        Self {
            content,
            recorded_at: Utc::now(),
        }
    }
}
