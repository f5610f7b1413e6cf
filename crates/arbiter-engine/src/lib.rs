//! The Arbiter orchestration engine
//!
//! Composes the bandit, breaker, cost optimizer, guardrail, traffic
//! allocator, and deployment gate into a single request dispatcher, runs
//! the periodic optimization and allocation loops, and owns the runtime
//! snapshot contract.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod active;
mod health;
mod orchestrator;
mod router;
mod snapshot;

pub use orchestrator::{Collaborators, Orchestrator};
pub use snapshot::RuntimeSnapshot;
