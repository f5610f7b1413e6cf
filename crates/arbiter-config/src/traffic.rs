//! Traffic allocation configuration

use serde::Deserialize;

/// Traffic allocator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrafficConfig {
    /// Whether allocation sampling participates in routing
    pub enabled: bool,
    /// Floor share every arm keeps after normalization
    pub min_share: f64,
    /// Smoothing factor toward the target allocation per tick
    pub smoothing: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_share: 0.05,
            smoothing: 0.3,
        }
    }
}
