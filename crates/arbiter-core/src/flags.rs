//! The feature flag seam
//!
//! Flag persistence is external. The router reads one immutable snapshot
//! per request; the snapshot maps directly onto the deployment gate.

use std::collections::HashMap;

use crate::arm::Arm;

/// Rollout stage of the new routing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BanditMode {
    /// Dark-launched: no live dispatch through the new pipeline
    Off,
    /// Shadow traffic alongside the primary path
    Shadow,
    /// Percentage rollout
    Canary,
    /// Full traffic
    Active,
}

/// Immutable flag snapshot read at most once per request
#[derive(Debug, Clone)]
pub struct FlagSnapshot {
    pub egress_enabled: bool,
    /// Per-arm kill switches; an absent entry means enabled
    pub arm_enabled: HashMap<Arm, bool>,
    pub bandit_mode: BanditMode,
    /// Whether Active mode may fall back to the primary path on failure
    pub fallback_enabled: bool,
}

impl FlagSnapshot {
    pub fn arm_is_enabled(&self, arm: Arm) -> bool {
        self.arm_enabled.get(&arm).copied().unwrap_or(true)
    }
}

impl Default for FlagSnapshot {
    fn default() -> Self {
        Self {
            egress_enabled: true,
            arm_enabled: HashMap::new(),
            bandit_mode: BanditMode::Active,
            fallback_enabled: true,
        }
    }
}

/// Source of flag snapshots
pub trait FlagSource: Send + Sync {
    fn snapshot(&self) -> FlagSnapshot;
}

/// Fixed flags, used when no external flag service is wired
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    pub flags: FlagSnapshot,
}

impl StaticFlags {
    pub fn new(flags: FlagSnapshot) -> Self {
        Self { flags }
    }
}

impl FlagSource for StaticFlags {
    fn snapshot(&self) -> FlagSnapshot {
        self.flags.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_arm_flag_means_enabled() {
        let snapshot = FlagSnapshot::default();
        assert!(snapshot.arm_is_enabled(Arm::Bedrock));

        let mut snapshot = FlagSnapshot::default();
        snapshot.arm_enabled.insert(Arm::Gemini, false);
        assert!(!snapshot.arm_is_enabled(Arm::Gemini));
        assert!(snapshot.arm_is_enabled(Arm::OpenAi));
    }
}
