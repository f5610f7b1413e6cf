//! Per-arm, per-context outcome counters
//!
//! Context-sharded via `DashMap`: one shard lock per context key, so
//! concurrent records on different contexts never contend. Every record
//! lands in the context slot and the reserved `"global"` slot.

use std::collections::HashMap;

use arbiter_core::Arm;
use arbiter_core::context::GLOBAL_KEY;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Additive counters for one arm in one context
///
/// Counters only grow, which makes recording commutative: any interleaving
/// of the same outcomes produces identical stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub trials: u64,
    pub wins: u64,
    pub total_cost_eur: f64,
    pub total_latency_ms: f64,
}

impl ArmStats {
    /// Fraction of winning trials, zero before the first trial
    pub fn win_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.wins as f64 / self.trials as f64
            }
        }
    }

    /// Mean cost per trial in EUR, zero before the first trial
    pub fn avg_cost(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.total_cost_eur / self.trials as f64
            }
        }
    }

    /// Mean latency per trial in milliseconds, zero before the first trial
    pub fn avg_latency(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.total_latency_ms / self.trials as f64
            }
        }
    }

    fn record(&mut self, success: bool, cost_eur: f64, latency_ms: f64) {
        self.trials += 1;
        if success {
            self.wins += 1;
        }
        self.total_cost_eur += cost_eur;
        self.total_latency_ms += latency_ms;
    }
}

/// The context-keyed statistics table
///
/// The `"global"` slot always exists.
#[derive(Debug, Default)]
pub struct StatsTable {
    contexts: DashMap<String, HashMap<Arm, ArmStats>>,
}

impl StatsTable {
    pub fn new() -> Self {
        let contexts = DashMap::new();
        contexts.insert(GLOBAL_KEY.to_owned(), HashMap::new());
        Self { contexts }
    }

    /// Record one outcome under `key` and under `"global"`
    pub fn record(&self, key: &str, arm: Arm, success: bool, cost_eur: f64, latency_ms: f64) {
        self.contexts
            .entry(key.to_owned())
            .or_default()
            .entry(arm)
            .or_default()
            .record(success, cost_eur, latency_ms);

        if key != GLOBAL_KEY {
            self.contexts
                .entry(GLOBAL_KEY.to_owned())
                .or_default()
                .entry(arm)
                .or_default()
                .record(success, cost_eur, latency_ms);
        }
    }

    /// Stats for one arm in one context, zeroed when never observed
    pub fn arm(&self, key: &str, arm: Arm) -> ArmStats {
        self.contexts
            .get(key)
            .and_then(|slot| slot.get(&arm).copied())
            .unwrap_or_default()
    }

    /// Snapshot of every arm's stats in one context
    pub fn snapshot(&self, key: &str) -> HashMap<Arm, ArmStats> {
        self.contexts
            .get(key)
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }

    /// Total trials across all arms in one context
    pub fn total_trials(&self, key: &str) -> u64 {
        self.contexts
            .get(key)
            .map(|slot| slot.values().map(|s| s.trials).sum())
            .unwrap_or(0)
    }

    /// Every context key currently held, the global slot included
    pub fn context_keys(&self) -> Vec<String> {
        self.contexts.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop one context's slot; the global slot is recreated empty
    pub fn reset(&self, key: &str) {
        self.contexts.remove(key);
        if key == GLOBAL_KEY {
            self.contexts.insert(GLOBAL_KEY.to_owned(), HashMap::new());
        }
    }

    /// Clone the whole table for snapshot export
    pub fn export(&self) -> HashMap<String, HashMap<Arm, ArmStats>> {
        self.contexts
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Replace the whole table from an exported snapshot
    pub fn import(&self, table: HashMap<String, HashMap<Arm, ArmStats>>) {
        self.contexts.clear();
        for (key, slot) in table {
            self.contexts.insert(key, slot);
        }
        self.contexts.entry(GLOBAL_KEY.to_owned()).or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_rates_handle_zero_trials() {
        let stats = ArmStats::default();
        assert!(stats.win_rate().abs() < f64::EPSILON);
        assert!(stats.avg_cost().abs() < f64::EPSILON);
        assert!(stats.avg_latency().abs() < f64::EPSILON);
    }

    #[test]
    fn record_updates_context_and_global() {
        let table = StatsTable::new();
        table.record("legal|standard|no-tools", Arm::Bedrock, true, 0.02, 800.0);

        let ctx = table.arm("legal|standard|no-tools", Arm::Bedrock);
        assert_eq!(ctx.trials, 1);
        assert_eq!(ctx.wins, 1);

        let global = table.arm(GLOBAL_KEY, Arm::Bedrock);
        assert_eq!(global.trials, 1);
    }

    #[test]
    fn global_records_are_not_double_counted() {
        let table = StatsTable::new();
        table.record(GLOBAL_KEY, Arm::OpenAi, true, 0.01, 100.0);
        assert_eq!(table.arm(GLOBAL_KEY, Arm::OpenAi).trials, 1);
    }

    #[test]
    fn record_order_is_commutative() {
        let a = StatsTable::new();
        a.record("k", Arm::Gemini, true, 0.01, 100.0);
        a.record("k", Arm::Gemini, false, 0.03, 900.0);

        let b = StatsTable::new();
        b.record("k", Arm::Gemini, false, 0.03, 900.0);
        b.record("k", Arm::Gemini, true, 0.01, 100.0);

        assert_eq!(a.arm("k", Arm::Gemini), b.arm("k", Arm::Gemini));
    }

    #[test]
    fn wins_never_exceed_trials() {
        let table = StatsTable::new();
        for i in 0..50 {
            table.record("k", Arm::OpenAi, i % 3 != 0, 0.01, 50.0);
        }
        let stats = table.arm("k", Arm::OpenAi);
        assert!(stats.wins <= stats.trials);
        assert_eq!(stats.trials, 50);
    }

    #[test]
    fn reset_drops_one_context_only() {
        let table = StatsTable::new();
        table.record("a", Arm::OpenAi, true, 0.01, 50.0);
        table.record("b", Arm::OpenAi, true, 0.01, 50.0);

        table.reset("a");
        assert_eq!(table.arm("a", Arm::OpenAi).trials, 0);
        assert_eq!(table.arm("b", Arm::OpenAi).trials, 1);
        // Global keeps both observations
        assert_eq!(table.arm(GLOBAL_KEY, Arm::OpenAi).trials, 2);
    }

    #[test]
    fn export_import_roundtrip() {
        let table = StatsTable::new();
        table.record("k", Arm::Bedrock, true, 0.05, 1200.0);

        let restored = StatsTable::new();
        restored.import(table.export());
        assert_eq!(restored.arm("k", Arm::Bedrock), table.arm("k", Arm::Bedrock));
        assert_eq!(
            restored.arm(GLOBAL_KEY, Arm::Bedrock),
            table.arm(GLOBAL_KEY, Arm::Bedrock)
        );
    }
}
