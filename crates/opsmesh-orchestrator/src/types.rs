use chrono::{DateTime, Utc};
use opsmesh_core::{Metadata, PlanId, TaskCall};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

/// Status of a task within a plan.
///
/// Allowed transitions: `Pending → Ready → Running → {Completed | Failed}`,
/// and `Pending | Ready → Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Skipped)
                | (Ready, Skipped)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Overall status of an execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Some independent branches completed while another branch failed.
    Partial,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Partial
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Running => "running",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Partial => "partial",
        };
        f.write_str(s)
    }
}

/// How a plan is run once submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run inline; return when the plan reaches a terminal status.
    #[default]
    Blocking,
    /// Run on a background worker; return immediately.
    Background,
}

/// A task descriptor handed to the plan builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub agent_type: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Metadata,
    /// Identifiers of tasks in the same batch this task waits for.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            description: description.into(),
            parameters: Metadata::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// A task inside an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub agent_type: String,
    pub description: String,
    pub parameters: Metadata,
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub(crate) fn from_spec(spec: TaskSpec) -> Self {
        let mut depends_on: Vec<String> = Vec::with_capacity(spec.depends_on.len());
        for dep in spec.depends_on {
            if !depends_on.contains(&dep) {
                depends_on.push(dep);
            }
        }
        Self {
            id: spec.id,
            agent_type: spec.agent_type,
            description: spec.description,
            parameters: spec.parameters,
            depends_on,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether it moved.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                task_id = %self.id,
                from = %self.status,
                to = %next,
                "Rejected task status transition"
            );
            return false;
        }
        match next {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.status = next;
        true
    }

    /// Time spent running, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn to_call(&self, plan_id: PlanId) -> TaskCall {
        TaskCall {
            plan_id,
            task_id: self.id.clone(),
            agent_type: self.agent_type.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// A validated, dependency-ordered collection of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub title: String,
    /// The request the plan was built from.
    pub description: String,
    /// Tasks in declaration order.
    pub tasks: Vec<AgentTask>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionPlan {
    pub fn task(&self, id: &str) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut AgentTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// No task is pending, ready or running.
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Promote every pending task whose dependencies all completed to `Ready`.
    /// Returns the ids promoted in this wave.
    pub(crate) fn promote_ready(&mut self) -> Vec<String> {
        let completed: HashSet<String> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect();

        let mut promoted = Vec::new();
        for task in &mut self.tasks {
            if task.status == TaskStatus::Pending
                && task.depends_on.iter().all(|d| completed.contains(d))
                && task.transition(TaskStatus::Ready)
            {
                promoted.push(task.id.clone());
            }
        }
        promoted
    }

    /// All tasks that depend on `id`, directly or transitively.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            for dep in &task.depends_on {
                reverse.entry(dep.as_str()).or_default().push(task.id.as_str());
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for &child in reverse.get(current).map(Vec::as_slice).unwrap_or_default() {
                if seen.insert(child) {
                    out.push(child.to_string());
                    queue.push_back(child);
                }
            }
        }
        out
    }

    /// Skip every not-yet-started transitive dependent of `id`.
    pub(crate) fn skip_dependents(&mut self, id: &str) -> Vec<String> {
        let dependents = self.dependents_of(id);
        let mut skipped = Vec::new();
        for dep_id in dependents {
            if let Some(task) = self.task_mut(&dep_id) {
                if matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
                    task.error = Some(format!("skipped: dependency '{id}' failed"));
                    task.transition(TaskStatus::Skipped);
                    skipped.push(dep_id);
                }
            }
        }
        skipped
    }

    /// Skip every task in the plan that has not started.
    pub(crate) fn skip_unstarted(&mut self, reason: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        for task in &mut self.tasks {
            if matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
                task.error = Some(reason.to_string());
                task.transition(TaskStatus::Skipped);
                skipped.push(task.id.clone());
            }
        }
        skipped
    }

    /// Ids of tasks nothing else depends on.
    pub fn sink_ids(&self) -> Vec<&str> {
        let depended: HashSet<&str> = self
            .tasks
            .iter()
            .flat_map(|t| t.depends_on.iter().map(String::as_str))
            .collect();
        self.tasks
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| !depended.contains(id))
            .collect()
    }

    /// Final status derived from task statuses.
    ///
    /// `Completed` when every task completed. Otherwise `Partial` when at
    /// least one sink task (a branch end) completed, else `Failed`.
    pub fn aggregate_status(&self) -> PlanStatus {
        if self.tasks.iter().all(|t| t.status == TaskStatus::Completed) {
            return PlanStatus::Completed;
        }
        let sink_completed = self.sink_ids().into_iter().any(|id| {
            self.task(id)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        });
        if sink_completed {
            PlanStatus::Partial
        } else {
            PlanStatus::Failed
        }
    }

    /// Task ids in an order where every task follows its dependencies.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.depends_on.len()))
            .collect();
        let mut queue: VecDeque<&str> = self
            .tasks
            .iter()
            .filter(|t| t.depends_on.is_empty())
            .map(|t| t.id.as_str())
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for task in &self.tasks {
                if task.depends_on.iter().any(|d| d == id) {
                    if let Some(deg) = in_degree.get_mut(task.id.as_str()) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(task.id.as_str());
                        }
                    }
                }
            }
        }
        order
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            id: self.id,
            title: self.title.clone(),
            status: self.status,
            total_tasks: self.tasks.len(),
            completed_tasks: self.count(TaskStatus::Completed),
            failed_tasks: self.count(TaskStatus::Failed),
            skipped_tasks: self.count(TaskStatus::Skipped),
            created_at: self.created_at,
        }
    }
}

/// Condensed view of a plan for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: PlanId,
    pub title: String,
    pub status: PlanStatus,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub created_at: DateTime<Utc>,
}
