//! The experiment manager seam
//!
//! Storage and assignment bookkeeping live outside the core. Failures on
//! this seam are never fatal: callers log and fall through to their own
//! selection.

use async_trait::async_trait;

use crate::arm::Arm;
use crate::context::BanditContext;
use crate::outcome::RequestOutcome;

/// An active experiment's arm assignment for one context
#[derive(Debug, Clone)]
pub struct ExperimentAssignment {
    pub arm: Arm,
    pub experiment_name: String,
    pub confidence: f64,
}

/// Result of analyzing a finished or running experiment
#[derive(Debug, Clone)]
pub struct ExperimentAnalysis {
    pub winner: Option<Arm>,
    /// Statistical significance of the winner, in `[0, 1]`
    pub confidence: f64,
}

/// External experiment lifecycle manager
#[async_trait]
pub trait ExperimentManager: Send + Sync {
    /// Look up the arm an active experiment assigns to this context
    async fn assignment(
        &self,
        context: &BanditContext,
    ) -> Result<Option<ExperimentAssignment>, String>;

    /// Report an outcome for an experiment-assigned request
    async fn record_outcome(
        &self,
        context: &BanditContext,
        outcome: &RequestOutcome,
    ) -> Result<(), String>;

    /// Names of currently active experiments
    async fn list_active(&self) -> Result<Vec<String>, String>;

    /// Analyze an experiment by name
    async fn analyze(&self, name: &str) -> Result<ExperimentAnalysis, String>;

    /// Stop an experiment, recording the reason
    async fn stop(&self, name: &str, reason: &str) -> Result<(), String>;
}
