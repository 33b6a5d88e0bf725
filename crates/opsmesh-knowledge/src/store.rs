use crate::records::{DeploymentRecord, MemoryItem, ResourceRecord};
use chrono::Utc;
use opsmesh_core::Metadata;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Resource registry layout: resource type → resource id → record.
pub type ResourceMap = BTreeMap<String, BTreeMap<String, ResourceRecord>>;

/// The state guarded by the knowledge base lock.
///
/// Only reachable through [`KnowledgeBase`], either one call at a time or
/// several calls grouped in [`KnowledgeBase::transaction`].
#[derive(Debug, Default)]
pub struct KnowledgeState {
    resources: ResourceMap,
    deployments: Vec<DeploymentRecord>,
    memories: HashMap<String, Vec<MemoryItem>>,
}

impl KnowledgeState {
    /// Register or overwrite a resource. Returns `true` if the id was new.
    pub fn register_resource(
        &mut self,
        resource_type: &str,
        id: &str,
        metadata: Metadata,
    ) -> bool {
        let by_id = self.resources.entry(resource_type.to_string()).or_default();
        match by_id.get_mut(id) {
            Some(existing) => {
                existing.metadata = metadata;
                existing.updated_at = Utc::now();
                false
            }
            None => {
                by_id.insert(
                    id.to_string(),
                    ResourceRecord::new(resource_type, id, metadata),
                );
                true
            }
        }
    }

    /// Append a deployment record to the history.
    pub fn record_deployment(&mut self, record: DeploymentRecord) {
        self.deployments.push(record);
    }

    /// Append an item to an agent's memory.
    pub fn remember(&mut self, agent_id: &str, item: MemoryItem) {
        self.memories
            .entry(agent_id.to_string())
            .or_default()
            .push(item);
    }
}

/// Consistent copy of the whole knowledge base taken under one lock acquisition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeSnapshot {
    pub resources: ResourceMap,
    pub deployments: Vec<DeploymentRecord>,
    pub memories: BTreeMap<String, Vec<MemoryItem>>,
}

/// Shared store for resources, deployment history and agent memory.
///
/// Every method takes the lock for the duration of that call only. The lock
/// is synchronous, so no caller can keep it across an agent's `.await`.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    state: RwLock<KnowledgeState>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. Re-registering an id overwrites its metadata.
    pub fn register_resource(
        &self,
        resource_type: impl AsRef<str>,
        id: impl AsRef<str>,
        metadata: Metadata,
    ) {
        let (resource_type, id) = (resource_type.as_ref(), id.as_ref());
        let created = self.state.write().register_resource(resource_type, id, metadata);
        debug!(resource_type, id, created, "Knowledge base: resource registered");
    }

    /// Look up one resource.
    pub fn get_resource(&self, resource_type: &str, id: &str) -> Option<ResourceRecord> {
        self.state
            .read()
            .resources
            .get(resource_type)
            .and_then(|by_id| by_id.get(id))
            .cloned()
    }

    /// List resources, optionally restricted to one type.
    ///
    /// A filter naming an unknown type yields an empty map.
    pub fn list_resources(&self, resource_type: Option<&str>) -> ResourceMap {
        let state = self.state.read();
        match resource_type {
            Some(kind) => state
                .resources
                .get_key_value(kind)
                .map(|(k, v)| BTreeMap::from([(k.clone(), v.clone())]))
                .unwrap_or_default(),
            None => state.resources.clone(),
        }
    }

    /// Total number of registered resources across all types.
    pub fn resource_count(&self) -> usize {
        self.state.read().resources.values().map(BTreeMap::len).sum()
    }

    /// Append a record to the deployment history and return it.
    pub fn record_deployment(&self, record: DeploymentRecord) -> DeploymentRecord {
        debug!(
            deployment_id = %record.id,
            agent = %record.agent_type,
            "Knowledge base: deployment recorded"
        );
        self.state.write().record_deployment(record.clone());
        record
    }

    /// The deployment history in append order.
    pub fn list_deployments(&self) -> Vec<DeploymentRecord> {
        self.state.read().deployments.clone()
    }

    /// Append a free-form item to an agent's memory.
    pub fn remember(&self, agent_id: impl AsRef<str>, item: serde_json::Value) {
        let agent_id = agent_id.as_ref();
        self.state.write().remember(agent_id, MemoryItem::new(item));
        debug!(agent = agent_id, "Knowledge base: memory appended");
    }

    /// An agent's memory in append order; empty for unknown agents.
    pub fn recall(&self, agent_id: &str) -> Vec<MemoryItem> {
        self.state
            .read()
            .memories
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply several mutations atomically: readers see all of them or none.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut KnowledgeState) -> R) -> R {
        let mut state = self.state.write();
        f(&mut state)
    }

    /// Copy all three collections under a single read lock.
    pub fn snapshot(&self) -> KnowledgeSnapshot {
        let state = self.state.read();
        KnowledgeSnapshot {
            resources: state.resources.clone(),
            deployments: state.deployments.clone(),
            memories: state
                .memories
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
