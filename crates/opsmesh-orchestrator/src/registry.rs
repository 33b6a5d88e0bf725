use crate::types::{ExecutionPlan, PlanStatus, PlanSummary};
use chrono::Utc;
use opsmesh_core::{OpsmeshError, OpsmeshResult, PlanId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::info;

/// Keyed storage for every submitted plan.
///
/// Plans live here for the life of the process. All mutation goes through
/// [`update`](Self::update), which holds the lock only while the closure runs
/// and then publishes the plan status to its watchers.
#[derive(Debug, Default)]
pub struct PlanRegistry {
    inner: RwLock<Plans>,
}

#[derive(Debug)]
struct Entry {
    plan: ExecutionPlan,
    status_tx: watch::Sender<PlanStatus>,
}

impl Entry {
    fn publish(&self) {
        let status = self.plan.status;
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

#[derive(Debug, Default)]
struct Plans {
    by_id: HashMap<PlanId, Entry>,
    /// Registration order, used to break creation-time ties.
    order: Vec<PlanId>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan: ExecutionPlan) -> PlanId {
        let id = plan.id;
        let (status_tx, _) = watch::channel(plan.status);
        let mut inner = self.inner.write();
        if inner.by_id.insert(id, Entry { plan, status_tx }).is_none() {
            inner.order.push(id);
        }
        id
    }

    /// Snapshot of a plan.
    pub fn get(&self, id: PlanId) -> OpsmeshResult<ExecutionPlan> {
        self.inner
            .read()
            .by_id
            .get(&id)
            .map(|entry| entry.plan.clone())
            .ok_or(OpsmeshError::PlanNotFound(id))
    }

    pub fn status(&self, id: PlanId) -> OpsmeshResult<PlanStatus> {
        self.inner
            .read()
            .by_id
            .get(&id)
            .map(|entry| entry.plan.status)
            .ok_or(OpsmeshError::PlanNotFound(id))
    }

    /// Receiver that sees every status change of the plan.
    pub fn subscribe(&self, id: PlanId) -> OpsmeshResult<watch::Receiver<PlanStatus>> {
        self.inner
            .read()
            .by_id
            .get(&id)
            .map(|entry| entry.status_tx.subscribe())
            .ok_or(OpsmeshError::PlanNotFound(id))
    }

    /// Move a pending plan to `Running`. Any other status is `PlanAlreadyStarted`.
    pub fn begin(&self, id: PlanId) -> OpsmeshResult<()> {
        let mut inner = self.inner.write();
        let entry = inner.by_id.get_mut(&id).ok_or(OpsmeshError::PlanNotFound(id))?;
        if entry.plan.status != PlanStatus::Pending {
            return Err(OpsmeshError::PlanAlreadyStarted(id));
        }
        entry.plan.status = PlanStatus::Running;
        entry.plan.started_at = Some(Utc::now());
        entry.publish();
        info!(plan_id = %id, title = %entry.plan.title, "Plan started");
        Ok(())
    }

    /// Run `f` against the stored plan under the write lock.
    pub fn update<R>(&self, id: PlanId, f: impl FnOnce(&mut ExecutionPlan) -> R) -> OpsmeshResult<R> {
        let mut inner = self.inner.write();
        let entry = inner.by_id.get_mut(&id).ok_or(OpsmeshError::PlanNotFound(id))?;
        let out = f(&mut entry.plan);
        entry.publish();
        Ok(out)
    }

    /// Summaries of all plans, oldest first.
    pub fn list(&self) -> Vec<PlanSummary> {
        let inner = self.inner.read();
        let mut summaries: Vec<PlanSummary> = inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .map(|entry| entry.plan.summary())
            .collect();
        // Stable, so equal timestamps keep registration order.
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }
}
