//! Agent capability contract and registry for Opsmesh.
//!
//! An agent is a task executor specialized for one domain. Every agent
//! implements the same [`Agent`] trait: a capability predicate used for
//! routing and an `execute` operation used by the plan executor. New agent
//! types are added by registering an implementation with [`AgentRegistry`].
//!
//! # Main types
//!
//! - [`Agent`]: Capability contract implemented by every agent.
//! - [`AgentDescriptor`]: Agent type tag, description and keyword set.
//! - [`AgentRegistry`]: Holds one agent instance per agent type.
//! - [`InfrastructureAgent`], [`DeploymentAgent`], [`MonitoringAgent`]: Built-ins.

/// The agent trait and its descriptor.
pub mod agent;
/// Built-in DevOps agents.
pub mod builtins;
/// Registry of agents keyed by agent type.
pub mod registry;

pub use agent::{Agent, AgentDescriptor};
pub use builtins::{register_builtins, DeploymentAgent, InfrastructureAgent, MonitoringAgent};
pub use registry::AgentRegistry;
