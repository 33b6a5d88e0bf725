use crate::builder::PlanBuilder;
use crate::config::OrchestratorConfig;
use crate::executor::PlanExecutor;
use crate::monitor::{AgentMonitor, AgentState};
use crate::registry::PlanRegistry;
use crate::router::Router;
use crate::types::{ExecutionMode, ExecutionPlan, PlanStatus, PlanSummary, TaskSpec};
use opsmesh_agents::{register_builtins, AgentDescriptor, AgentRegistry};
use opsmesh_core::{OpsmeshError, OpsmeshResult, PlanId};
use opsmesh_knowledge::{DeploymentRecord, KnowledgeBase, ResourceMap};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What a caller submits for execution.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Free text routed to every agent that can handle it.
    Request(String),
    /// An explicit task list with dependencies.
    Tasks { title: String, tasks: Vec<TaskSpec> },
}

/// Returned by [`Orchestrator::submit`].
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub plan_id: PlanId,
    pub status: PlanStatus,
    /// Final snapshot for blocking runs; `None` for background runs.
    pub plan: Option<ExecutionPlan>,
}

/// Entry point tying routing, plan building and execution together.
pub struct Orchestrator {
    config: OrchestratorConfig,
    knowledge: Arc<KnowledgeBase>,
    agents: Arc<AgentRegistry>,
    router: Router,
    plans: Arc<PlanRegistry>,
    monitor: Arc<AgentMonitor>,
    executor: PlanExecutor,
}

impl Orchestrator {
    pub fn new(
        agents: AgentRegistry,
        knowledge: Arc<KnowledgeBase>,
        config: OrchestratorConfig,
    ) -> Self {
        let agents = Arc::new(agents);
        let plans = Arc::new(PlanRegistry::new());
        let monitor = Arc::new(AgentMonitor::new());
        let executor = PlanExecutor::new(
            Arc::clone(&agents),
            Arc::clone(&knowledge),
            Arc::clone(&plans),
            Arc::clone(&monitor),
            config.clone(),
        );
        info!(
            agents = agents.agent_count(),
            max_concurrency = config.max_concurrency,
            failure_policy = ?config.failure_policy,
            "Orchestrator initialized"
        );
        Self {
            router: Router::new(Arc::clone(&agents)),
            config,
            knowledge,
            agents,
            plans,
            monitor,
            executor,
        }
    }

    /// An orchestrator with a fresh knowledge base and the built-in
    /// infrastructure, deployment and monitoring agents.
    pub fn with_builtins(config: OrchestratorConfig) -> Self {
        let knowledge = Arc::new(KnowledgeBase::new());
        let mut agents = AgentRegistry::new();
        register_builtins(&mut agents, Arc::clone(&knowledge));
        Self::new(agents, knowledge, config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Agent types that would handle `request`. Empty is a valid answer.
    pub fn analyze(&self, request: &str) -> Vec<String> {
        self.router.route(request)
    }

    /// Build the routed plan for `request` without registering or running it.
    pub fn preview(&self, request: &str) -> OpsmeshResult<ExecutionPlan> {
        let matched = self.router.route_required(request)?;
        PlanBuilder::from_routes(request, &matched, self.config.chain_routed_tasks)
    }

    /// Build, register and execute a plan.
    ///
    /// Build errors (routing, duplicate ids, unknown dependencies, cycles)
    /// are returned before anything is registered.
    pub async fn submit(
        &self,
        submission: Submission,
        mode: ExecutionMode,
    ) -> OpsmeshResult<SubmitOutcome> {
        let plan = match submission {
            Submission::Request(request) => self.preview(&request)?,
            Submission::Tasks { title, tasks } => {
                let unregistered = self.router.unregistered(&tasks);
                if !unregistered.is_empty() {
                    warn!(agent_types = ?unregistered, "Plan references unregistered agent types");
                }
                PlanBuilder::build(title, tasks)?
            }
        };
        let plan_id = self.register_plan(plan);
        let plan = self.execute(plan_id, mode).await?;
        Ok(SubmitOutcome {
            plan_id,
            status: plan.as_ref().map_or(PlanStatus::Running, |p| p.status),
            plan,
        })
    }

    pub async fn submit_request(
        &self,
        request: impl Into<String>,
        mode: ExecutionMode,
    ) -> OpsmeshResult<SubmitOutcome> {
        self.submit(Submission::Request(request.into()), mode).await
    }

    pub async fn submit_tasks(
        &self,
        title: impl Into<String>,
        tasks: Vec<TaskSpec>,
        mode: ExecutionMode,
    ) -> OpsmeshResult<SubmitOutcome> {
        self.submit(
            Submission::Tasks {
                title: title.into(),
                tasks,
            },
            mode,
        )
        .await
    }

    /// Store an already-built plan without running it.
    pub fn register_plan(&self, plan: ExecutionPlan) -> PlanId {
        self.plans.insert(plan)
    }

    /// Run a registered pending plan. Blocking mode returns the final
    /// snapshot; background mode returns `None` once the worker is started.
    pub async fn execute(
        &self,
        plan_id: PlanId,
        mode: ExecutionMode,
    ) -> OpsmeshResult<Option<ExecutionPlan>> {
        match mode {
            ExecutionMode::Blocking => self.executor.run(plan_id).await.map(Some),
            ExecutionMode::Background => {
                // Completion is observed through the registry, not the handle.
                drop(self.executor.spawn(plan_id)?);
                Ok(None)
            }
        }
    }

    /// Wait until a started plan reaches a terminal status and return the
    /// final snapshot. Any number of callers may wait on the same plan. A
    /// plan that was never started is returned as it is.
    pub async fn wait(&self, plan_id: PlanId) -> OpsmeshResult<ExecutionPlan> {
        let mut status = self.plans.subscribe(plan_id)?;
        if self.plans.status(plan_id)? != PlanStatus::Pending {
            status
                .wait_for(|s| s.is_terminal())
                .await
                .map_err(|e| OpsmeshError::Execution(format!("plan status channel closed: {e}")))?;
        }
        self.plans.get(plan_id)
    }

    pub fn get_plan(&self, plan_id: PlanId) -> OpsmeshResult<ExecutionPlan> {
        self.plans.get(plan_id)
    }

    pub fn list_plans(&self) -> Vec<PlanSummary> {
        self.plans.list()
    }

    pub fn list_resources(&self, resource_type: Option<&str>) -> ResourceMap {
        self.knowledge.list_resources(resource_type)
    }

    pub fn list_deployments(&self) -> Vec<DeploymentRecord> {
        self.knowledge.list_deployments()
    }

    pub fn list_agents(&self) -> Vec<AgentDescriptor> {
        self.agents
            .list_descriptors()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn agent_metrics(&self) -> Vec<AgentState> {
        self.monitor.snapshot().await
    }

    /// Per-agent states plus the aggregate across all agents, as JSON.
    pub async fn metrics_report(&self) -> serde_json::Value {
        self.monitor.to_json().await
    }
}
