//! Process identity and background loop timers

use serde::Deserialize;

/// Process-wide orchestrator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrchestratorConfig {
    /// Deployment region tag carried on audit events and metrics
    pub region: String,
    /// Project name carried on audit events and metrics
    pub project_name: String,
    /// Seed for the decision RNG; absent means seeded from the OS
    pub rng_seed: Option<u64>,
    /// Bounded size of the in-process event history ring
    pub event_history_size: usize,
    /// Background loop timers
    pub loops: LoopConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            region: "eu-central-1".to_owned(),
            project_name: "arbiter".to_owned(),
            rng_seed: None,
            event_history_size: default_event_history_size(),
            loops: LoopConfig::default(),
        }
    }
}

const fn default_event_history_size() -> usize {
    500
}

/// Intervals for the two cooperative periodic tasks
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoopConfig {
    /// Optimization cycle interval (recommendations, experiment checks)
    pub optimization_interval_secs: u64,
    /// Traffic re-allocation interval
    pub traffic_allocation_interval_secs: u64,
    /// Apply low-risk recommendations without operator action
    pub auto_apply_recommendations: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            optimization_interval_secs: 30 * 60,
            traffic_allocation_interval_secs: 15 * 60,
            auto_apply_recommendations: true,
        }
    }
}
