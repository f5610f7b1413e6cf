//! Circuit breaker configuration

use serde::Deserialize;

/// Per-arm circuit breaker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BreakerConfig {
    /// Consecutive failures before a Closed breaker opens
    pub failure_threshold: u32,
    /// How long an Open breaker blocks before allowing a probe
    pub recovery_timeout_ms: u64,
    /// Consecutive half-open successes required to close
    pub half_open_max_calls: u32,
    /// Interval of the background health probe against open arms
    pub health_check_interval_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 3,
            health_check_interval_secs: 30,
        }
    }
}
