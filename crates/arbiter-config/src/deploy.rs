//! Deployment gating and rollback configuration

use serde::Deserialize;

/// Startup deployment mode
///
/// At runtime the mode is owned by the feature-flag service; this setting
/// only seeds the gate before the first flag snapshot arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeploymentModeConfig {
    Dark,
    Shadow,
    Canary,
    Active,
}

/// Immutable SLO thresholds that trigger rollback
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RollbackThresholds {
    /// Error rate over the sample window
    pub max_error_rate: f64,
    /// p95 latency over the sample window, in milliseconds
    pub max_p95_latency_ms: f64,
    /// Average cost ceiling as a multiple of the baseline cost
    pub max_cost_multiplier: f64,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.05,
            max_p95_latency_ms: 5_000.0,
            max_cost_multiplier: 2.0,
        }
    }
}

/// Deployment controller and rollback manager settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DeploymentConfig {
    pub mode: DeploymentModeConfig,
    /// Share of traffic on the new pipeline in canary mode, in percent
    pub canary_percentage: f64,
    pub thresholds: RollbackThresholds,
    /// Consecutive SLO violations before rollback
    pub slo_violation_threshold: u32,
    /// Canary sample window size used for rollback evaluation
    pub sample_window: usize,
    /// Evaluate rollback every this many canary requests
    pub evaluate_every: u64,
    /// Gradual rollback traffic-percentage ladder
    pub rollback_steps: Vec<f64>,
    /// Dwell time per ladder step
    pub step_dwell_secs: u64,
    /// Cooldown between rollbacks
    pub cooldown_secs: u64,
    /// Bounded size of the rollback event history
    pub max_history: usize,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentModeConfig::Active,
            canary_percentage: 10.0,
            thresholds: RollbackThresholds::default(),
            slo_violation_threshold: 3,
            sample_window: 20,
            evaluate_every: 10,
            rollback_steps: vec![90.0, 70.0, 50.0, 30.0, 10.0],
            step_dwell_secs: 300,
            cooldown_secs: 600,
            max_history: 100,
        }
    }
}
