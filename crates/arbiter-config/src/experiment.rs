//! Experiment lifecycle configuration

use serde::Deserialize;

/// Experiment manager integration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExperimentConfig {
    /// Consult the experiment manager during routing
    pub enabled: bool,
    /// Minimum share of traffic an experiment may claim
    pub min_traffic_for_experiment: f64,
    /// Significance above which a decided experiment may be stopped
    pub significance_threshold: f64,
    /// Stop decided experiments without operator action
    pub auto_stop: bool,
    /// Let the optimizer propose new experiments
    pub auto_experiment_enabled: bool,
    /// Let the active loop re-allocate traffic
    pub auto_traffic_allocation_enabled: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_traffic_for_experiment: 0.10,
            significance_threshold: 0.95,
            auto_stop: true,
            auto_experiment_enabled: false,
            auto_traffic_allocation_enabled: true,
        }
    }
}
