//! Plan building, capability routing and dependency-ordered execution.
//!
//! A request is routed to every agent whose capability predicate accepts it,
//! turned into an [`ExecutionPlan`] by the [`PlanBuilder`], stored in the
//! [`PlanRegistry`] and run by the [`PlanExecutor`] one readiness wave at a
//! time. The [`Orchestrator`] ties the pieces together.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Facade for analyze, submit, wait and the listings.
//! - [`PlanBuilder`]: Validates task descriptors and builds plans.
//! - [`PlanExecutor`]: The scheduling loop, blocking or on a background worker.
//! - [`Router`]: Maps requests to agent types.
//! - [`AgentMonitor`]: Per-agent execution metrics.

/// Plan construction and validation.
pub mod builder;
/// Orchestrator settings.
pub mod config;
/// The orchestrator facade.
pub mod engine;
/// The scheduling loop.
pub mod executor;
/// Task files.
pub mod manifest;
/// Per-agent activity tracking.
pub mod monitor;
/// Keyed plan storage.
pub mod registry;
/// Request routing.
pub mod router;
/// Task and plan types.
pub mod types;

pub use builder::PlanBuilder;
pub use config::{FailurePolicy, OrchestratorConfig};
pub use engine::{Orchestrator, SubmitOutcome, Submission};
pub use executor::PlanExecutor;
pub use manifest::PlanManifest;
pub use monitor::{AgentMetrics, AgentMonitor, AgentState, WorkerStatus};
pub use registry::PlanRegistry;
pub use router::Router;
pub use types::{
    AgentTask, ExecutionMode, ExecutionPlan, PlanStatus, PlanSummary, TaskSpec, TaskStatus,
};
