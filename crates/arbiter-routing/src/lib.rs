//! Cost-aware routing and traffic allocation
//!
//! The cost-performance optimizer keeps a per-arm route profile and may
//! override the bandit's candidate under one of four strategies. The
//! allocation engine turns per-arm composite scores into smoothed traffic
//! shares published copy-on-write for the request hot path.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod allocation;
pub mod profile;
pub mod strategy;

pub use allocation::{AllocationEngine, TrafficAllocation};
pub use profile::{CostTracker, RouteProfile};
pub use strategy::{CostDecision, select_cost_aware};
