use crate::types::{AgentTask, ExecutionPlan, PlanStatus, TaskSpec};
use chrono::Utc;
use opsmesh_core::{OpsmeshError, OpsmeshResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

const TITLE_PREVIEW_CHARS: usize = 50;

/// Turns task descriptors into validated execution plans.
///
/// Validation runs in a fixed order: identifier uniqueness, dependency
/// resolution, then acyclicity. The first failure aborts the build.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanBuilder;

impl PlanBuilder {
    /// Build a plan from explicit task descriptors.
    pub fn build(title: impl Into<String>, specs: Vec<TaskSpec>) -> OpsmeshResult<ExecutionPlan> {
        let title = title.into();
        let description = title.clone();
        Self::build_with_description(title, description, specs)
    }

    /// Build a plan, recording the originating request as its description.
    pub fn build_with_description(
        title: impl Into<String>,
        description: impl Into<String>,
        specs: Vec<TaskSpec>,
    ) -> OpsmeshResult<ExecutionPlan> {
        Self::validate(&specs)?;

        let plan = ExecutionPlan {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            tasks: specs.into_iter().map(AgentTask::from_spec).collect(),
            status: PlanStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        info!(
            plan_id = %plan.id,
            title = %plan.title,
            tasks = plan.tasks.len(),
            "Plan built"
        );
        Ok(plan)
    }

    /// Build a plan for a routed request: one task per matched agent type.
    ///
    /// With `chain` set, each task depends on the one before it, in the order
    /// the agent types are given. Fails with `RoutingFailure` when nothing
    /// matched.
    pub fn from_routes(
        request: &str,
        agent_types: &[String],
        chain: bool,
    ) -> OpsmeshResult<ExecutionPlan> {
        if agent_types.is_empty() {
            return Err(OpsmeshError::RoutingFailure(request.to_string()));
        }

        let mut specs = Vec::with_capacity(agent_types.len());
        for (i, agent_type) in agent_types.iter().enumerate() {
            let mut spec = TaskSpec::new(
                agent_type.clone(),
                agent_type.clone(),
                format!("{} task for: {request}", capitalize(agent_type)),
            );
            if chain && i > 0 {
                spec = spec.depends_on([agent_types[i - 1].clone()]);
            }
            specs.push(spec);
        }

        Self::build_with_description(plan_title(request), request, specs)
    }

    /// Check a batch of descriptors without building a plan.
    pub fn validate(specs: &[TaskSpec]) -> OpsmeshResult<()> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(specs.len());
        for spec in specs {
            if !ids.insert(spec.id.as_str()) {
                return Err(OpsmeshError::DuplicateTaskId(spec.id.clone()));
            }
        }

        for spec in specs {
            if let Some(missing) = spec.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(OpsmeshError::UnknownDependency {
                    task: spec.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let graph: HashMap<&str, &[String]> = specs
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
            .collect();
        let mut visited: HashMap<&str, u8> = HashMap::new();
        for spec in specs {
            if let Some(at) = dfs_cycle(spec.id.as_str(), &graph, &mut visited) {
                debug!(task = at, "Cycle found during plan validation");
                return Err(OpsmeshError::CyclicDependency(at.to_string()));
            }
        }
        Ok(())
    }
}

/// Returns the task where a back edge was found, if any.
fn dfs_cycle<'a>(
    id: &'a str,
    graph: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashMap<&'a str, u8>,
) -> Option<&'a str> {
    match visited.get(id) {
        Some(1) => return Some(id), // back edge = cycle
        Some(2) => return None,     // already processed
        _ => {}
    }
    visited.insert(id, 1); // mark as in progress
    if let Some(&deps) = graph.get(id) {
        for dep in deps {
            if let Some(at) = dfs_cycle(dep.as_str(), graph, visited) {
                return Some(at);
            }
        }
    }
    visited.insert(id, 2); // mark as done
    None
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn plan_title(request: &str) -> String {
    if request.chars().count() <= TITLE_PREVIEW_CHARS {
        format!("Plan for: {request}")
    } else {
        let head: String = request.chars().take(TITLE_PREVIEW_CHARS).collect();
        format!("Plan for: {head}...")
    }
}
