//! Cost-performance optimizer configuration

use serde::Deserialize;

/// The four cost-aware routing strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CostStrategyKind {
    /// Cheapest arm wins, subject to a success-rate floor
    AggressiveCost,
    /// Weighted cost/performance/latency score
    BalancedCostPerf,
    /// Balanced, rejecting arms with degraded latency
    PerformanceAware,
    /// Aggressive off-peak, balanced otherwise
    DynamicTime,
}

/// Cost optimizer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostConfig {
    /// Whether the cost optimizer participates in routing
    pub enabled: bool,
    pub strategy: CostStrategyKind,
    /// Cost reduction target against the baseline, as a fraction
    pub target_cost_reduction: f64,
    /// Weight of normalized cost in the balanced score
    pub weight_cost: f64,
    /// Weight of success rate in the balanced score
    pub weight_perf: f64,
    /// Weight of normalized latency in the balanced score
    pub weight_latency: f64,
    /// Latency degradation tolerated by `PerformanceAware`, as a fraction
    /// over the fastest arm
    pub max_degradation_frac: f64,
    /// Success-rate floor for `AggressiveCost`
    pub min_success_rate: f64,
    /// Hours of day (UTC) treated as off-peak by `DynamicTime`
    pub off_peak_hours: Vec<u8>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CostStrategyKind::BalancedCostPerf,
            target_cost_reduction: 0.20,
            weight_cost: 0.4,
            weight_perf: 0.4,
            weight_latency: 0.2,
            max_degradation_frac: 0.2,
            min_success_rate: 0.5,
            off_peak_hours: vec![0, 1, 2, 3, 4, 5, 6, 22, 23],
        }
    }
}
