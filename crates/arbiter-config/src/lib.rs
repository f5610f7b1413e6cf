#![allow(clippy::must_use_candidate)]

//! Configuration for the Arbiter control plane
//!
//! One module per concern, deserializable from TOML with environment
//! overrides applied on top. Every knob has a production default; an empty
//! config file yields a working orchestrator.

pub mod bandit;
pub mod breaker;
pub mod cost;
pub mod deploy;
mod env;
pub mod experiment;
pub mod guardrails;
mod loader;
pub mod orchestrator;
pub mod traffic;

use serde::Deserialize;

pub use bandit::{BanditConfig, BiasRule, BiasTarget};
pub use breaker::BreakerConfig;
pub use cost::{CostConfig, CostStrategyKind};
pub use deploy::{DeploymentConfig, DeploymentModeConfig, RollbackThresholds};
pub use experiment::ExperimentConfig;
pub use guardrails::{FallbackChains, GuardrailConfig};
pub use loader::ConfigError;
pub use orchestrator::{LoopConfig, OrchestratorConfig};
pub use traffic::TrafficConfig;

/// Top-level Arbiter configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Process-wide identity and timers
    pub orchestrator: OrchestratorConfig,
    /// Contextual bandit and optimizer
    pub bandit: BanditConfig,
    /// Per-arm circuit breaker
    pub breaker: BreakerConfig,
    /// Cost-performance optimizer
    pub cost: CostConfig,
    /// Task-role guardrail
    pub guardrails: GuardrailConfig,
    /// Traffic allocation
    pub traffic: TrafficConfig,
    /// Deployment gating and rollback
    pub deployment: DeploymentConfig,
    /// Experiment lifecycle
    pub experiments: ExperimentConfig,
}

impl Config {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown fields.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        loader::parse(source)
    }

    /// Load a TOML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable or malformed.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = loader::load_file(path)?;
        env::apply(&mut config);
        Ok(config)
    }

    /// Defaults with environment overrides, no config file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        env::apply(&mut config);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert!((config.traffic.min_share - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_toml_str("[nonsense]\nx = 1\n").is_err());
    }

    #[test]
    fn partial_document_overrides_one_section() {
        let config = Config::from_toml_str("[breaker]\nfailure_threshold = 3\n").unwrap();
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.half_open_max_calls, 3);
    }
}
