//! Core types and error definitions for the Opsmesh orchestrator.
//!
//! This crate provides the foundational types shared across all Opsmesh crates:
//! the unified error enum and the aliases used for identifiers and free-form
//! key/value payloads.
//!
//! # Main types
//!
//! - [`OpsmeshError`]: Unified error enum covering routing, plan building,
//!   dispatch and lookup failures.
//! - [`OpsmeshResult`]: Convenience alias for `Result<T, OpsmeshError>`.
//! - [`PlanId`]: Identifier assigned to every execution plan.
//! - [`Metadata`]: Free-form key/value map used for task parameters,
//!   resource metadata and memory items.
//! - [`TaskCall`]: What an agent receives when a task is dispatched to it.
//! - [`TaskOutput`]: What an agent hands back after executing a task.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier of an execution plan.
pub type PlanId = Uuid;

/// Free-form key/value payload, opaque to the orchestration core.
pub type Metadata = HashMap<String, serde_json::Value>;

// --- Error types ---

/// Top-level error type for Opsmesh.
///
/// Build-time variants ([`DuplicateTaskId`](OpsmeshError::DuplicateTaskId),
/// [`UnknownDependency`](OpsmeshError::UnknownDependency),
/// [`CyclicDependency`](OpsmeshError::CyclicDependency)) abort plan creation.
/// [`Execution`](OpsmeshError::Execution) and
/// [`AgentNotFound`](OpsmeshError::AgentNotFound) are recorded on the failing
/// task by the executor and never escape a plan run.
#[derive(Debug, thiserror::Error)]
pub enum OpsmeshError {
    /// No registered agent can handle the request.
    #[error("Routing failure: no agent can handle request '{0}'")]
    RoutingFailure(String),

    /// Two task descriptors in the same batch share an identifier.
    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// A task depends on an identifier that is not part of its batch.
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// The task declaring the dependency.
        task: String,
        /// The identifier that could not be resolved.
        dependency: String,
    },

    /// The dependency graph contains a cycle through the named task.
    #[error("Cyclic dependency detected at task '{0}'")]
    CyclicDependency(String),

    /// A task targets an agent type that is not registered.
    #[error("No agent registered for type '{0}'")]
    AgentNotFound(String),

    /// An agent failed while executing a task.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The plan has already been started and cannot run again.
    #[error("Plan {0} has already been started")]
    PlanAlreadyStarted(PlanId),

    /// No plan is registered under the identifier.
    #[error("Plan {0} not found")]
    PlanNotFound(PlanId),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpsmeshError {
    /// Returns `true` for errors raised while validating a plan.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            OpsmeshError::RoutingFailure(_)
                | OpsmeshError::DuplicateTaskId(_)
                | OpsmeshError::UnknownDependency { .. }
                | OpsmeshError::CyclicDependency(_)
        )
    }

    /// Returns `true` when the error signals a missing plan.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OpsmeshError::PlanNotFound(_))
    }
}

/// A convenience `Result` alias using [`OpsmeshError`].
pub type OpsmeshResult<T> = Result<T, OpsmeshError>;

// --- Task call types ---

/// A request from the executor to run one task on an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCall {
    /// The plan the task belongs to.
    pub plan_id: PlanId,
    /// Identifier of the task within its plan.
    pub task_id: String,
    /// Agent type the task is addressed to.
    pub agent_type: String,
    /// Human-readable description of the work.
    pub description: String,
    /// Named parameters, opaque to the orchestration core.
    #[serde(default)]
    pub parameters: Metadata,
}

impl TaskCall {
    /// Returns a string parameter, if present and a string.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }
}

/// The result reported by an agent for a [`TaskCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Result payload (or failure detail when `is_error` is set).
    pub payload: serde_json::Value,
    /// Whether the agent reports the task as failed.
    pub is_error: bool,
}

impl TaskOutput {
    /// Creates a successful output.
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    /// Creates a failure indicator carrying the given detail.
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            payload: serde_json::Value::String(detail.into()),
            is_error: true,
        }
    }
}
