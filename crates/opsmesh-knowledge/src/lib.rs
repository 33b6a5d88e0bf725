//! Shared knowledge base for multi-agent DevOps orchestration.
//!
//! Every agent and the plan executor read and write the same
//! [`KnowledgeBase`]: the registry of created resources, the append-only
//! deployment history and per-agent memory. All three live behind one coarse
//! lock that is held for a single call only.
//!
//! # Main types
//!
//! - [`KnowledgeBase`]: Lock-guarded store shared through `Arc`.
//! - [`KnowledgeState`]: The guarded state, reachable inside [`KnowledgeBase::transaction`].
//! - [`ResourceRecord`]: A registered resource and its metadata.
//! - [`DeploymentRecord`]: One entry of the deployment history.
//! - [`MemoryItem`]: One entry of an agent's memory.

/// Record types stored in the knowledge base.
pub mod records;
/// The lock-guarded store.
pub mod store;

pub use records::{DeploymentRecord, MemoryItem, ResourceRecord};
pub use store::{KnowledgeBase, KnowledgeSnapshot, KnowledgeState, ResourceMap};
