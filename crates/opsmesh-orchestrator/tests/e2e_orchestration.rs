#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end orchestration tests.
//!
//! Drives the orchestrator with scripted agents that succeed, fail, sleep or
//! panic on demand, and checks dependency ordering, failure propagation,
//! aggregation, background execution and the knowledge-base side effects.

use async_trait::async_trait;
use opsmesh_agents::{Agent, AgentDescriptor, AgentRegistry};
use opsmesh_core::{OpsmeshError, OpsmeshResult, TaskCall, TaskOutput};
use opsmesh_knowledge::KnowledgeBase;
use opsmesh_orchestrator::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Scripted agent: per-task behaviour, event log and concurrency tracking
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    /// Reports failure through the output instead of an error.
    FailSoft,
    Sleep(u64),
    Panic,
}

#[derive(Default)]
struct Trace {
    events: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Trace {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {event}"))
    }
}

struct ScriptedAgent {
    descriptor: AgentDescriptor,
    script: HashMap<String, Behavior>,
    trace: Arc<Trace>,
    knowledge: Arc<KnowledgeBase>,
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &TaskCall) -> OpsmeshResult<TaskOutput> {
        let now = self.trace.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.trace.peak.fetch_max(now, Ordering::SeqCst);
        self.trace
            .events
            .lock()
            .unwrap()
            .push(format!("start:{}", call.task_id));

        let behavior = self
            .script
            .get(&call.task_id)
            .copied()
            .unwrap_or(Behavior::Succeed);
        if let Behavior::Sleep(ms) = behavior {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if let Some(resource) = call.param_str("resource") {
            self.knowledge
                .register_resource("scripted", resource, HashMap::new());
        }

        self.trace
            .events
            .lock()
            .unwrap()
            .push(format!("end:{}", call.task_id));
        self.trace.running.fetch_sub(1, Ordering::SeqCst);

        match behavior {
            Behavior::Fail => Err(OpsmeshError::Execution(format!(
                "{} exploded",
                call.task_id
            ))),
            Behavior::FailSoft => Ok(TaskOutput::failure("quota exceeded")),
            Behavior::Panic => panic!("scripted panic"),
            Behavior::Succeed | Behavior::Sleep(_) => {
                Ok(TaskOutput::success(json!({ "task": call.task_id })))
            }
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    trace: Arc<Trace>,
}

fn harness(script: &[(&str, Behavior)], config: OrchestratorConfig) -> Harness {
    let knowledge = Arc::new(KnowledgeBase::new());
    let trace = Arc::new(Trace::default());
    let script: HashMap<String, Behavior> =
        script.iter().map(|(id, b)| (id.to_string(), *b)).collect();

    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(ScriptedAgent {
        descriptor: AgentDescriptor::new("worker", "Scripted worker").with_keywords(["work"]),
        script: script.clone(),
        trace: Arc::clone(&trace),
        knowledge: Arc::clone(&knowledge),
    }));
    agents.register(Arc::new(ScriptedAgent {
        descriptor: AgentDescriptor::new("shipper", "Scripted deployer")
            .with_keywords(["ship"])
            .recording_deployments(),
        script,
        trace: Arc::clone(&trace),
        knowledge: Arc::clone(&knowledge),
    }));

    Harness {
        orchestrator: Orchestrator::new(agents, knowledge, config),
        trace,
    }
}

fn status_of(plan: &ExecutionPlan, id: &str) -> TaskStatus {
    plan.task(id).unwrap().status
}

// ---------------------------------------------------------------------------
// Dependency ordering and aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
    let h = harness(&[("t1", Behavior::Sleep(30))], OrchestratorConfig::default());
    let outcome = h
        .orchestrator
        .submit_tasks(
            "chain",
            vec![
                TaskSpec::new("t2", "worker", "second").depends_on(["t1"]),
                TaskSpec::new("t1", "worker", "first"),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::Completed);
    assert!(h.trace.position("end:t1") < h.trace.position("start:t2"));

    let plan = outcome.plan.unwrap();
    let t1 = plan.task("t1").unwrap();
    let t2 = plan.task("t2").unwrap();
    assert!(t1.completed_at.unwrap() <= t2.started_at.unwrap());
    // Declaration order is kept regardless of execution order.
    assert_eq!(plan.tasks[0].id, "t2");
}

#[tokio::test]
async fn test_failed_dependency_skips_dependent() {
    let h = harness(&[("t1", Behavior::Fail)], OrchestratorConfig::default());
    let plan = h
        .orchestrator
        .submit_tasks(
            "broken chain",
            vec![
                TaskSpec::new("t1", "worker", "first"),
                TaskSpec::new("t2", "worker", "second").depends_on(["t1"]),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(status_of(&plan, "t1"), TaskStatus::Failed);
    assert_eq!(status_of(&plan, "t2"), TaskStatus::Skipped);
    assert!(plan.task("t1").unwrap().error.as_deref().unwrap().contains("exploded"));
    assert!(!h.trace.events().contains(&"start:t2".to_string()));
}

#[tokio::test]
async fn test_independent_branch_gives_partial() {
    let h = harness(&[("t1", Behavior::Fail)], OrchestratorConfig::default());
    let plan = h
        .orchestrator
        .submit_tasks(
            "branches",
            vec![
                TaskSpec::new("t1", "worker", "a"),
                TaskSpec::new("t2", "worker", "b").depends_on(["t1"]),
                TaskSpec::new("t3", "worker", "c"),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    assert_eq!(status_of(&plan, "t2"), TaskStatus::Skipped);
    assert_eq!(status_of(&plan, "t3"), TaskStatus::Completed);
    assert_eq!(plan.status, PlanStatus::Partial);
}

#[tokio::test]
async fn test_transitive_dependents_skipped() {
    let h = harness(&[("a", Behavior::Fail)], OrchestratorConfig::default());
    let plan = h
        .orchestrator
        .submit_tasks(
            "deep",
            vec![
                TaskSpec::new("a", "worker", "a"),
                TaskSpec::new("b", "worker", "b").depends_on(["a"]),
                TaskSpec::new("c", "worker", "c").depends_on(["b"]),
                TaskSpec::new("d", "worker", "d").depends_on(["c", "b"]),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    for id in ["b", "c", "d"] {
        assert_eq!(status_of(&plan, id), TaskStatus::Skipped, "task {id}");
    }
    assert_eq!(plan.summary().skipped_tasks, 3);
}

#[tokio::test]
async fn test_soft_failure_output_fails_task() {
    let h = harness(&[("t1", Behavior::FailSoft)], OrchestratorConfig::default());
    let plan = h
        .orchestrator
        .submit_tasks(
            "soft",
            vec![TaskSpec::new("t1", "worker", "a")],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    assert_eq!(status_of(&plan, "t1"), TaskStatus::Failed);
    assert_eq!(plan.task("t1").unwrap().error.as_deref(), Some("quota exceeded"));
    assert_eq!(plan.status, PlanStatus::Failed);
}

#[tokio::test]
async fn test_agent_panic_is_recorded_as_failure() {
    let h = harness(
        &[("boom", Behavior::Panic)],
        OrchestratorConfig::default(),
    );
    let plan = h
        .orchestrator
        .submit_tasks(
            "panics",
            vec![
                TaskSpec::new("boom", "worker", "a"),
                TaskSpec::new("fine", "worker", "b"),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    assert_eq!(status_of(&plan, "boom"), TaskStatus::Failed);
    assert!(plan.task("boom").unwrap().error.as_deref().unwrap().contains("panicked"));
    assert_eq!(status_of(&plan, "fine"), TaskStatus::Completed);
    assert_eq!(plan.status, PlanStatus::Partial);
}

#[tokio::test]
async fn test_unknown_agent_fails_at_dispatch() {
    let h = harness(&[], OrchestratorConfig::default());
    let plan = h
        .orchestrator
        .submit_tasks(
            "missing agent",
            vec![
                TaskSpec::new("db", "database", "Create a database"),
                TaskSpec::new("app", "worker", "Use it").depends_on(["db"]),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    assert_eq!(status_of(&plan, "db"), TaskStatus::Failed);
    assert!(plan.task("db").unwrap().error.as_deref().unwrap().contains("database"));
    assert_eq!(status_of(&plan, "app"), TaskStatus::Skipped);
}

// ---------------------------------------------------------------------------
// Build errors and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_build_errors_register_no_plan() {
    let h = harness(&[], OrchestratorConfig::default());
    let orch = &h.orchestrator;

    let err = orch
        .submit_tasks(
            "cycle",
            vec![
                TaskSpec::new("a", "worker", "a").depends_on(["c"]),
                TaskSpec::new("b", "worker", "b").depends_on(["a"]),
                TaskSpec::new("c", "worker", "c").depends_on(["b"]),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsmeshError::CyclicDependency(_)));

    let err = orch
        .submit_request("nothing matches this", ExecutionMode::Blocking)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsmeshError::RoutingFailure(_)));
    assert!(err.is_build_error());

    assert!(orch.list_plans().is_empty());
    assert!(h.trace.events().is_empty());
}

#[tokio::test]
async fn test_unknown_plan_not_found() {
    let h = harness(&[], OrchestratorConfig::default());
    let missing = Uuid::new_v4();
    assert!(matches!(
        h.orchestrator.get_plan(missing),
        Err(OpsmeshError::PlanNotFound(id)) if id == missing
    ));
    assert!(h
        .orchestrator
        .execute(missing, ExecutionMode::Blocking)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_plan_cannot_start_twice() {
    let h = harness(&[("t1", Behavior::Sleep(50))], OrchestratorConfig::default());
    let orch = &h.orchestrator;
    let plan = PlanBuilder::build("once", vec![TaskSpec::new("t1", "worker", "a")]).unwrap();
    let id = orch.register_plan(plan);

    orch.execute(id, ExecutionMode::Background).await.unwrap();
    let err = orch.execute(id, ExecutionMode::Blocking).await.unwrap_err();
    assert!(matches!(err, OpsmeshError::PlanAlreadyStarted(_)));

    let finished = orch.wait(id).await.unwrap();
    assert_eq!(finished.status, PlanStatus::Completed);
    let err = orch.execute(id, ExecutionMode::Background).await.unwrap_err();
    assert!(matches!(err, OpsmeshError::PlanAlreadyStarted(_)));
}

#[tokio::test]
async fn test_background_returns_before_completion() {
    let h = harness(&[("slow", Behavior::Sleep(100))], OrchestratorConfig::default());
    let outcome = h
        .orchestrator
        .submit_tasks(
            "background",
            vec![TaskSpec::new("slow", "worker", "take your time")],
            ExecutionMode::Background,
        )
        .await
        .unwrap();

    assert!(outcome.plan.is_none());
    assert_eq!(outcome.status, PlanStatus::Running);
    let snapshot = h.orchestrator.get_plan(outcome.plan_id).unwrap();
    assert_eq!(snapshot.status, PlanStatus::Running);

    let plan = h.orchestrator.wait(outcome.plan_id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.duration().is_some());
    assert_eq!(
        h.orchestrator.get_plan(outcome.plan_id).unwrap().status,
        PlanStatus::Completed
    );
}

#[tokio::test]
async fn test_concurrent_waiters_all_see_final_plan() {
    let h = harness(&[("slow", Behavior::Sleep(80))], OrchestratorConfig::default());
    let outcome = h
        .orchestrator
        .submit_tasks(
            "shared wait",
            vec![TaskSpec::new("slow", "worker", "take your time")],
            ExecutionMode::Background,
        )
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        h.orchestrator.wait(outcome.plan_id),
        h.orchestrator.wait(outcome.plan_id)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.status, PlanStatus::Completed);
    assert_eq!(second.status, PlanStatus::Completed);
    assert_eq!(second.task("slow").unwrap().status, TaskStatus::Completed);
    assert!(first.completed_at.is_some());
    assert_eq!(first.completed_at, second.completed_at);
}

// ---------------------------------------------------------------------------
// Concurrency and policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ready_wave_runs_concurrently() {
    let script: Vec<(String, Behavior)> = (0..4)
        .map(|i| (format!("t{i}"), Behavior::Sleep(50)))
        .collect();
    let script: Vec<(&str, Behavior)> = script.iter().map(|(id, b)| (id.as_str(), *b)).collect();
    let h = harness(&script, OrchestratorConfig::default());

    let tasks = (0..4)
        .map(|i| TaskSpec::new(format!("t{i}"), "worker", "parallel"))
        .collect();
    h.orchestrator
        .submit_tasks("wave", tasks, ExecutionMode::Blocking)
        .await
        .unwrap();

    assert!(h.trace.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_max_concurrency_is_respected() {
    let script: Vec<(String, Behavior)> = (0..6)
        .map(|i| (format!("t{i}"), Behavior::Sleep(20)))
        .collect();
    let script: Vec<(&str, Behavior)> = script.iter().map(|(id, b)| (id.as_str(), *b)).collect();
    let h = harness(&script, OrchestratorConfig::default().with_max_concurrency(2));

    let tasks = (0..6)
        .map(|i| TaskSpec::new(format!("t{i}"), "worker", "bounded"))
        .collect();
    let outcome = h
        .orchestrator
        .submit_tasks("bounded", tasks, ExecutionMode::Blocking)
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::Completed);
    assert!(h.trace.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_fail_fast_skips_unstarted_tasks() {
    let config = OrchestratorConfig::default()
        .with_failure_policy(FailurePolicy::FailFast)
        .with_max_concurrency(1);
    let h = harness(&[("t1", Behavior::Fail)], config);
    let plan = h
        .orchestrator
        .submit_tasks(
            "fail fast",
            vec![
                TaskSpec::new("t1", "worker", "a"),
                TaskSpec::new("t2", "worker", "b"),
                TaskSpec::new("t3", "worker", "c"),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap()
        .plan
        .unwrap();

    assert_eq!(status_of(&plan, "t2"), TaskStatus::Skipped);
    assert_eq!(status_of(&plan, "t3"), TaskStatus::Skipped);
    assert_eq!(plan.status, PlanStatus::Failed);
}

#[tokio::test]
async fn test_parallel_tasks_register_every_resource() {
    let h = harness(&[], OrchestratorConfig::default());
    let tasks: Vec<TaskSpec> = (0..16)
        .map(|i| {
            TaskSpec::new(format!("t{i}"), "worker", "register")
                .with_param("resource", json!(format!("res-{i}")))
        })
        .collect();
    h.orchestrator
        .submit_tasks("fan out", tasks, ExecutionMode::Blocking)
        .await
        .unwrap();

    let resources = h.orchestrator.list_resources(Some("scripted"));
    assert_eq!(resources["scripted"].len(), 16);
}

// ---------------------------------------------------------------------------
// Knowledge-base side effects and introspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_deployment_history_only_for_deploying_agents() {
    let h = harness(&[("bad", Behavior::Fail)], OrchestratorConfig::default());
    let outcome = h
        .orchestrator
        .submit_tasks(
            "ship it",
            vec![
                TaskSpec::new("prep", "worker", "prepare"),
                TaskSpec::new("ship", "shipper", "Ship v2").depends_on(["prep"]),
                TaskSpec::new("bad", "shipper", "Ship v3"),
            ],
            ExecutionMode::Blocking,
        )
        .await
        .unwrap();

    let deployments = h.orchestrator.list_deployments();
    assert_eq!(deployments.len(), 1);
    let record = &deployments[0];
    assert_eq!(record.agent_type, "shipper");
    assert_eq!(record.description, "Ship v2");
    assert_eq!(record.plan_id, Some(outcome.plan_id));
    assert_eq!(record.task_id.as_deref(), Some("ship"));
    assert_eq!(record.details, json!({ "task": "ship" }));
}

#[tokio::test]
async fn test_routed_request_chains_matched_agents() {
    let h = harness(&[], OrchestratorConfig::default());
    assert_eq!(h.orchestrator.analyze("work then ship"), vec!["worker", "shipper"]);

    let plan = h
        .orchestrator
        .submit_request("work then ship", ExecutionMode::Blocking)
        .await
        .unwrap()
        .plan
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert_eq!(plan.task("shipper").unwrap().depends_on, vec!["worker"]);
    assert!(h.trace.position("end:worker") < h.trace.position("start:shipper"));
}

#[tokio::test]
async fn test_list_plans_and_metrics() {
    let h = harness(&[("x", Behavior::Fail)], OrchestratorConfig::default());
    let orch = &h.orchestrator;
    orch.submit_tasks(
        "first",
        vec![TaskSpec::new("ok", "worker", "a")],
        ExecutionMode::Blocking,
    )
    .await
    .unwrap();
    orch.submit_tasks(
        "second",
        vec![TaskSpec::new("x", "worker", "b")],
        ExecutionMode::Blocking,
    )
    .await
    .unwrap();

    let plans = orch.list_plans();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].title, "first");
    assert_eq!(plans[0].status, PlanStatus::Completed);
    assert_eq!(plans[1].status, PlanStatus::Failed);
    assert_eq!(plans[1].failed_tasks, 1);

    let metrics = orch.agent_metrics().await;
    let worker = metrics.iter().find(|s| s.agent_type == "worker").unwrap();
    assert_eq!(worker.metrics.tasks_completed, 1);
    assert_eq!(worker.metrics.tasks_failed, 1);
    assert_eq!(worker.status, WorkerStatus::Error);
}
