use crate::config::{FailurePolicy, OrchestratorConfig};
use crate::monitor::AgentMonitor;
use crate::registry::PlanRegistry;
use crate::types::{ExecutionPlan, TaskStatus};
use chrono::Utc;
use opsmesh_agents::AgentRegistry;
use opsmesh_core::{OpsmeshError, OpsmeshResult, PlanId, TaskCall, TaskOutput};
use opsmesh_knowledge::{DeploymentRecord, KnowledgeBase};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Outcome of one dispatched task, reported back to the scheduling loop.
struct Finished {
    task_id: String,
    agent_type: String,
    outcome: OpsmeshResult<TaskOutput>,
    elapsed_ms: u64,
}

/// Runs plans stored in the [`PlanRegistry`] in dependency order.
///
/// The same loop serves blocking and background execution. Plan state is
/// only ever touched through short [`PlanRegistry::update`] calls, so no lock
/// is held while an agent runs.
#[derive(Clone)]
pub struct PlanExecutor {
    agents: Arc<AgentRegistry>,
    knowledge: Arc<KnowledgeBase>,
    plans: Arc<PlanRegistry>,
    monitor: Arc<AgentMonitor>,
    config: OrchestratorConfig,
}

impl PlanExecutor {
    pub fn new(
        agents: Arc<AgentRegistry>,
        knowledge: Arc<KnowledgeBase>,
        plans: Arc<PlanRegistry>,
        monitor: Arc<AgentMonitor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            agents,
            knowledge,
            plans,
            monitor,
            config,
        }
    }

    /// Run a pending plan inline until it reaches a terminal status.
    pub async fn run(&self, plan_id: PlanId) -> OpsmeshResult<ExecutionPlan> {
        self.plans.begin(plan_id)?;
        self.drive(plan_id).await
    }

    /// Start a pending plan on a background worker.
    ///
    /// The plan moves to `Running` before this returns, so a second start
    /// fails with `PlanAlreadyStarted` even if the worker has not been polled.
    pub fn spawn(
        &self,
        plan_id: PlanId,
    ) -> OpsmeshResult<JoinHandle<OpsmeshResult<ExecutionPlan>>> {
        self.plans.begin(plan_id)?;
        let executor = self.clone();
        Ok(tokio::spawn(async move {
            let result = executor.drive(plan_id).await;
            if let Err(e) = &result {
                error!(plan_id = %plan_id, error = %e, "Background plan worker failed");
            }
            result
        }))
    }

    async fn drive(&self, plan_id: PlanId) -> OpsmeshResult<ExecutionPlan> {
        let semaphore = match self.config.max_concurrency {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let mut in_flight: JoinSet<Finished> = JoinSet::new();

        loop {
            for (call, permit) in self.dispatch_ready(plan_id, semaphore.as_ref())? {
                self.monitor.start_task(&call.agent_type).await;
                in_flight.spawn(run_task(Arc::clone(&self.agents), call, permit));
            }

            match in_flight.join_next().await {
                None => break,
                Some(Ok(finished)) => self.settle(plan_id, finished).await?,
                Some(Err(e)) => {
                    error!(plan_id = %plan_id, error = %e, "Task worker aborted");
                }
            }
        }

        self.finalize(plan_id)
    }

    /// Promote the next readiness wave and move as many `Ready` tasks to
    /// `Running` as the concurrency limit allows.
    fn dispatch_ready(
        &self,
        plan_id: PlanId,
        semaphore: Option<&Arc<Semaphore>>,
    ) -> OpsmeshResult<Vec<(TaskCall, Option<OwnedSemaphorePermit>)>> {
        self.plans.update(plan_id, |plan| {
            let promoted = plan.promote_ready();
            if !promoted.is_empty() {
                debug!(plan_id = %plan_id, tasks = ?promoted, "Readiness wave");
            }

            let mut calls = Vec::new();
            for task in plan
                .tasks
                .iter_mut()
                .filter(|t| t.status == TaskStatus::Ready)
            {
                let permit = match semaphore {
                    Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                        Ok(permit) => Some(permit),
                        // Stays Ready until a running task frees a slot.
                        Err(_) => break,
                    },
                    None => None,
                };
                if task.transition(TaskStatus::Running) {
                    info!(
                        plan_id = %plan_id,
                        task_id = %task.id,
                        agent = %task.agent_type,
                        "Task dispatched"
                    );
                    calls.push((task.to_call(plan_id), permit));
                }
            }
            calls
        })
    }

    /// Record a finished task and apply the failure policy.
    async fn settle(&self, plan_id: PlanId, finished: Finished) -> OpsmeshResult<()> {
        let Finished {
            task_id,
            agent_type,
            outcome,
            elapsed_ms,
        } = finished;

        let failure = match outcome {
            Ok(output) if !output.is_error => {
                if self.records_deployments(&agent_type) {
                    let description = self
                        .plans
                        .update(plan_id, |plan| {
                            plan.task(&task_id).map(|t| t.description.clone())
                        })?
                        .unwrap_or_default();
                    let record = self.knowledge.record_deployment(
                        DeploymentRecord::new(agent_type.as_str(), description)
                            .for_task(plan_id, task_id.as_str())
                            .with_details(output.payload.clone()),
                    );
                    debug!(plan_id = %plan_id, task_id = %task_id, record_id = %record.id, "Deployment recorded");
                }
                self.plans.update(plan_id, |plan| {
                    if let Some(task) = plan.task_mut(&task_id) {
                        task.result = Some(output.payload);
                        task.transition(TaskStatus::Completed);
                    }
                })?;
                info!(
                    plan_id = %plan_id,
                    task_id = %task_id,
                    agent = %agent_type,
                    duration_ms = elapsed_ms,
                    "Task completed"
                );
                None
            }
            Ok(output) => Some(match output.payload {
                serde_json::Value::String(detail) => detail,
                other => other.to_string(),
            }),
            Err(e) => Some(e.to_string()),
        };

        let succeeded = failure.is_none();
        if let Some(detail) = failure {
            let policy = self.config.failure_policy;
            let skipped = self.plans.update(plan_id, |plan| {
                if let Some(task) = plan.task_mut(&task_id) {
                    task.error = Some(detail.clone());
                    task.transition(TaskStatus::Failed);
                }
                let mut skipped = plan.skip_dependents(&task_id);
                if policy == FailurePolicy::FailFast {
                    skipped.extend(plan.skip_unstarted(&format!(
                        "skipped: task '{task_id}' failed under fail-fast policy"
                    )));
                }
                skipped
            })?;
            warn!(
                plan_id = %plan_id,
                task_id = %task_id,
                agent = %agent_type,
                error = %detail,
                skipped = ?skipped,
                "Task failed"
            );
        }

        self.monitor
            .finish_task(&agent_type, elapsed_ms, succeeded)
            .await;
        Ok(())
    }

    fn records_deployments(&self, agent_type: &str) -> bool {
        self.agents
            .get(agent_type)
            .is_some_and(|agent| agent.descriptor().records_deployments)
    }

    /// Close out the plan and derive its final status.
    fn finalize(&self, plan_id: PlanId) -> OpsmeshResult<ExecutionPlan> {
        self.plans.update(plan_id, |plan| {
            if !plan.is_settled() {
                warn!(plan_id = %plan_id, "Plan loop ended with unsettled tasks");
            }
            for task in &mut plan.tasks {
                match task.status {
                    TaskStatus::Running => {
                        task.error = Some("task worker lost before reporting".to_string());
                        task.transition(TaskStatus::Failed);
                    }
                    TaskStatus::Pending | TaskStatus::Ready => {
                        if task.error.is_none() {
                            task.error = Some("skipped: never became runnable".to_string());
                        }
                        task.transition(TaskStatus::Skipped);
                    }
                    _ => {}
                }
            }

            plan.status = plan.aggregate_status();
            plan.completed_at = Some(Utc::now());
            info!(
                plan_id = %plan_id,
                status = %plan.status,
                completed = plan.count(TaskStatus::Completed),
                failed = plan.count(TaskStatus::Failed),
                skipped = plan.count(TaskStatus::Skipped),
                "Plan finished"
            );
            plan.clone()
        })
    }
}

/// Execute one task. The agent runs on its own tokio task so a panic is
/// reported as an execution error instead of tearing down the loop.
async fn run_task(
    agents: Arc<AgentRegistry>,
    call: TaskCall,
    permit: Option<OwnedSemaphorePermit>,
) -> Finished {
    let _permit = permit;
    let task_id = call.task_id.clone();
    let agent_type = call.agent_type.clone();
    let started = Instant::now();

    let outcome = match tokio::spawn(async move { agents.execute(&call).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(OpsmeshError::Execution(format!(
            "agent '{agent_type}' panicked"
        ))),
        Err(e) => Err(OpsmeshError::Execution(e.to_string())),
    };

    Finished {
        task_id,
        agent_type,
        outcome,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}
