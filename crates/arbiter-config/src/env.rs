//! Environment variable overrides
//!
//! Every override is optional; unparsable values are logged and skipped so
//! a bad environment never takes the process down.

use std::str::FromStr;

use crate::Config;

/// Apply `ARBITER_*` environment overrides on top of a config
pub fn apply(config: &mut Config) {
    if let Ok(region) = std::env::var("ARBITER_REGION") {
        config.orchestrator.region = region;
    }
    if let Ok(project) = std::env::var("ARBITER_PROJECT") {
        config.orchestrator.project_name = project;
    }

    set_parsed("ARBITER_RNG_SEED", &mut config.orchestrator.rng_seed);
    set("ARBITER_OPTIMIZATION_INTERVAL_SECS", &mut config.orchestrator.loops.optimization_interval_secs);
    set(
        "ARBITER_TRAFFIC_ALLOCATION_INTERVAL_SECS",
        &mut config.orchestrator.loops.traffic_allocation_interval_secs,
    );

    set("ARBITER_FAILURE_THRESHOLD", &mut config.breaker.failure_threshold);
    set("ARBITER_RECOVERY_TIMEOUT_MS", &mut config.breaker.recovery_timeout_ms);
    set("ARBITER_HALF_OPEN_MAX_CALLS", &mut config.breaker.half_open_max_calls);
    set(
        "ARBITER_HEALTH_CHECK_INTERVAL_SECS",
        &mut config.breaker.health_check_interval_secs,
    );

    set("ARBITER_TARGET_COST_REDUCTION", &mut config.cost.target_cost_reduction);

    set(
        "ARBITER_MIN_TRAFFIC_FOR_EXPERIMENT",
        &mut config.experiments.min_traffic_for_experiment,
    );
    set("ARBITER_SIGNIFICANCE_THRESHOLD", &mut config.experiments.significance_threshold);
    set("ARBITER_AUTO_EXPERIMENTS", &mut config.experiments.auto_experiment_enabled);
    set(
        "ARBITER_AUTO_TRAFFIC_ALLOCATION",
        &mut config.experiments.auto_traffic_allocation_enabled,
    );
}

/// Overwrite `slot` when the variable is present and parses
fn set<T: FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            }
        }
    }
}

/// Like [`set`] for `Option<T>` slots
fn set_parsed<T: FromStr>(name: &str, slot: &mut Option<T>) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *slot = Some(value),
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply() {
        temp_env::with_vars(
            [
                ("ARBITER_REGION", Some("us-east-1")),
                ("ARBITER_FAILURE_THRESHOLD", Some("7")),
                ("ARBITER_RNG_SEED", Some("1234")),
            ],
            || {
                let mut config = Config::default();
                apply(&mut config);
                assert_eq!(config.orchestrator.region, "us-east-1");
                assert_eq!(config.breaker.failure_threshold, 7);
                assert_eq!(config.orchestrator.rng_seed, Some(1234));
            },
        );
    }

    #[test]
    fn unparsable_override_is_skipped() {
        temp_env::with_vars([("ARBITER_FAILURE_THRESHOLD", Some("not-a-number"))], || {
            let mut config = Config::default();
            apply(&mut config);
            assert_eq!(config.breaker.failure_threshold, 5);
        });
    }
}
