//! Deployment gating, rollback, and paired response comparison
//!
//! The deployment controller decides per request whether the new routing
//! pipeline sees live traffic (dark, shadow, canary, or active), the
//! rollback manager watches the canary window and SLO reports for breaches,
//! and the win-rate comparator turns paired control/treatment responses
//! into promote/rollback advice.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod controller;
pub mod mode;
pub mod rollback;
pub mod winrate;

pub use controller::{CanaryMetrics, CanarySample, DeploymentController, ShadowComparison};
pub use mode::{DeploymentMode, RouteDirective};
pub use rollback::{RollbackDecision, RollbackEvent, RollbackManager};
pub use winrate::{
    Advice, ComparisonResult, ExperimentScorecard, LengthHeuristic, PairedSample, QualityScorer,
    ResponseSample, Winner, compare,
};
