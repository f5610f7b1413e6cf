//! Contextual multi-armed bandit for arm selection
//!
//! Three layers: the per-(context, arm) statistics store, the contextual
//! bandit with its Thompson-style surrogate and configurable bias table,
//! and the optimizer that adds UCB/hybrid selection, experiment-manager
//! consultation, recommendations, and exploration-rate auto-tuning.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod bandit;
pub mod optimizer;
pub mod stats;

pub use bandit::{BestArm, ContextualBandit};
pub use optimizer::{
    BanditOptimizer, RecPriority, Recommendation, RecommendationKind, Selection,
    SelectionStrategy,
};
pub use stats::{ArmStats, StatsTable};
