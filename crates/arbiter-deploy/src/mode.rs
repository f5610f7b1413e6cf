//! Deployment modes and per-request routing directives

use arbiter_core::{BanditMode, FlagSnapshot};
use arbiter_config::{DeploymentConfig, DeploymentModeConfig};
use serde::{Deserialize, Serialize};

/// How much of live traffic the new pipeline receives
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeploymentMode {
    /// No live dispatch; callers get a synthesized fallback
    Dark,
    /// Primary path serves; a shadow copy exercises the new pipeline
    Shadow,
    /// A percentage of requests take the new pipeline
    Canary { percentage: f64 },
    /// The new pipeline takes everything
    Active,
}

impl DeploymentMode {
    /// Seed mode from startup configuration
    pub fn from_config(config: &DeploymentConfig) -> Self {
        match config.mode {
            DeploymentModeConfig::Dark => Self::Dark,
            DeploymentModeConfig::Shadow => Self::Shadow,
            DeploymentModeConfig::Canary => Self::Canary {
                percentage: config.canary_percentage,
            },
            DeploymentModeConfig::Active => Self::Active,
        }
    }

    /// Runtime mode from a feature-flag snapshot
    ///
    /// The flag service owns the mode; `off` means the new pipeline is
    /// dark-launched.
    pub fn from_flags(flags: &FlagSnapshot, canary_percentage: f64) -> Self {
        match flags.bandit_mode {
            BanditMode::Off => Self::Dark,
            BanditMode::Shadow => Self::Shadow,
            BanditMode::Canary => Self::Canary {
                percentage: canary_percentage,
            },
            BanditMode::Active => Self::Active,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Shadow => "shadow",
            Self::Canary { .. } => "canary",
            Self::Active => "active",
        }
    }
}

/// What the deployment gate tells the router to do with one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RouteDirective {
    /// Return the synthesized dark-mode response
    SyntheticFallback,
    /// Serve from the primary path and shadow the new pipeline
    ShadowPair,
    /// Serve from the primary path only
    Primary,
    /// Serve from the new pipeline
    NewPipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_modes() {
        let mut flags = FlagSnapshot::default();
        flags.bandit_mode = BanditMode::Off;
        assert_eq!(DeploymentMode::from_flags(&flags, 10.0), DeploymentMode::Dark);

        flags.bandit_mode = BanditMode::Canary;
        assert_eq!(
            DeploymentMode::from_flags(&flags, 25.0),
            DeploymentMode::Canary { percentage: 25.0 }
        );
    }

    #[test]
    fn mode_serializes_tagged() {
        let json = serde_json::to_string(&DeploymentMode::Canary { percentage: 10.0 }).unwrap();
        let back: DeploymentMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DeploymentMode::Canary { percentage: 10.0 });
    }
}
