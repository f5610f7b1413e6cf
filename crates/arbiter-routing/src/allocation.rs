//! Traffic allocation from per-arm composite scores
//!
//! Each allocator tick turns global arm statistics into a target share per
//! arm, smooths toward it from the previous allocation, and publishes the
//! result as an immutable snapshot. The request path reads exactly one
//! snapshot, lock-free against the published pointer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use arbiter_bandit::ArmStats;
use arbiter_config::TrafficConfig;
use arbiter_core::Arm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Composite score weights
const WEIGHT_WIN_RATE: f64 = 0.4;
const WEIGHT_LATENCY: f64 = 0.3;
const WEIGHT_COST: f64 = 0.2;
const WEIGHT_CONFIDENCE: f64 = 0.1;

/// Latency at which the latency score bottoms out, in milliseconds
const LATENCY_CEILING_MS: f64 = 3_000.0;

/// Cost at which the cost score bottoms out, in EUR
const COST_CEILING_EUR: f64 = 0.20;

/// Trials at which the confidence score saturates
const CONFIDENCE_TRIALS: f64 = 50.0;

/// Score assigned to an arm with no observations
const UNKNOWN_SCORE: f64 = 0.5;

/// Immutable traffic shares over the arm set
///
/// Invariants after any normalize: shares sum to one and every arm keeps
/// at least the configured floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficAllocation {
    shares: HashMap<Arm, f64>,
}

impl TrafficAllocation {
    /// Uniform allocation over all arms
    pub fn uniform() -> Self {
        #[allow(clippy::cast_precision_loss)]
        let share = 1.0 / Arm::ALL.len() as f64;
        Self {
            shares: Arm::ALL.into_iter().map(|arm| (arm, share)).collect(),
        }
    }

    pub fn share(&self, arm: Arm) -> f64 {
        self.shares.get(&arm).copied().unwrap_or(0.0)
    }

    pub fn shares(&self) -> &HashMap<Arm, f64> {
        &self.shares
    }

    /// Enforce the floor share and renormalize to a unit sum
    ///
    /// Arms below the floor are pinned to it; the remaining mass is
    /// re-scaled proportionally over the free arms, repeating until no
    /// free arm falls under the floor.
    fn normalize(mut self, min_share: f64) -> Self {
        let total: f64 = self.shares.values().sum();
        if total <= f64::MIN_POSITIVE {
            return Self::uniform();
        }
        for share in self.shares.values_mut() {
            *share /= total;
        }

        let mut pinned: Vec<Arm> = Vec::new();
        loop {
            for (&arm, share) in &mut self.shares {
                if *share < min_share && !pinned.contains(&arm) {
                    pinned.push(arm);
                }
            }
            for &arm in &pinned {
                if let Some(share) = self.shares.get_mut(&arm) {
                    *share = min_share;
                }
            }
            if pinned.len() >= self.shares.len() {
                return Self::uniform();
            }

            #[allow(clippy::cast_precision_loss)]
            let free_budget = 1.0 - min_share * pinned.len() as f64;
            let free_sum: f64 = self
                .shares
                .iter()
                .filter(|(arm, _)| !pinned.contains(arm))
                .map(|(_, share)| *share)
                .sum();
            if free_sum <= f64::MIN_POSITIVE {
                return Self::uniform();
            }
            let scale = free_budget / free_sum;
            let mut violated = false;
            for (arm, share) in &mut self.shares {
                if !pinned.contains(arm) {
                    *share *= scale;
                    if *share < min_share {
                        violated = true;
                    }
                }
            }
            if !violated {
                return self;
            }
        }
    }
}

/// Composite score of one arm from its global statistics
pub fn composite_score(stats: &ArmStats) -> f64 {
    if stats.trials == 0 {
        return UNKNOWN_SCORE;
    }
    let latency_score = (1.0 - stats.avg_latency() / LATENCY_CEILING_MS).max(0.0);
    let cost_score = (1.0 - stats.avg_cost() / COST_CEILING_EUR).max(0.0);
    #[allow(clippy::cast_precision_loss)]
    let confidence_score = (stats.trials as f64 / CONFIDENCE_TRIALS).min(1.0);

    WEIGHT_WIN_RATE * stats.win_rate()
        + WEIGHT_LATENCY * latency_score
        + WEIGHT_COST * cost_score
        + WEIGHT_CONFIDENCE * confidence_score
}

/// The traffic allocator (the allocation half of the active loop)
pub struct AllocationEngine {
    config: TrafficConfig,
    current: RwLock<Arc<TrafficAllocation>>,
    rng: Mutex<StdRng>,
}

impl AllocationEngine {
    pub fn new(config: TrafficConfig, seed: Option<u64>) -> Self {
        Self {
            config,
            current: RwLock::new(Arc::new(TrafficAllocation::uniform())),
            rng: Mutex::new(seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)),
        }
    }

    /// The currently published allocation snapshot
    pub fn current(&self) -> Arc<TrafficAllocation> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    /// Recompute the allocation from global arm statistics and publish it
    ///
    /// Target shares are proportional to composite scores plus an
    /// exploration bonus for under-sampled arms; the published value is
    /// smoothed toward the target from the previous allocation.
    pub fn retick(&self, stats: &HashMap<Arm, ArmStats>) -> Arc<TrafficAllocation> {
        let scores: HashMap<Arm, f64> = Arm::ALL
            .into_iter()
            .map(|arm| {
                let arm_stats = stats.get(&arm).copied().unwrap_or_default();
                (arm, composite_score(&arm_stats))
            })
            .collect();

        let total_score: f64 = scores.values().sum();
        let max_trials = stats.values().map(|s| s.trials).max().unwrap_or(0);

        let mut target = TrafficAllocation {
            shares: Arm::ALL
                .into_iter()
                .map(|arm| {
                    let raw = if total_score <= f64::MIN_POSITIVE {
                        0.0
                    } else {
                        scores[&arm] / total_score
                    };
                    let bonus = if max_trials == 0 {
                        0.0
                    } else {
                        let trials = stats.get(&arm).map_or(0, |s| s.trials);
                        #[allow(clippy::cast_precision_loss)]
                        {
                            (max_trials - trials) as f64 / (max_trials as f64 * 10.0)
                        }
                    };
                    (arm, raw + bonus)
                })
                .collect(),
        };
        target = target.normalize(self.config.min_share);

        let previous = self.current();
        let smoothed = TrafficAllocation {
            shares: Arm::ALL
                .into_iter()
                .map(|arm| {
                    let prev = previous.share(arm);
                    let next = prev + self.config.smoothing * (target.share(arm) - prev);
                    (arm, next)
                })
                .collect(),
        }
        .normalize(self.config.min_share);

        tracing::debug!(shares = ?smoothed.shares, "traffic allocation published");

        let published = Arc::new(smoothed);
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::clone(&published);
        published
    }

    /// Sample an arm from the published allocation, restricted to the
    /// permitted list and renormalized over it
    pub fn sample(&self, permitted: &[Arm]) -> Option<Arm> {
        if permitted.is_empty() {
            return None;
        }
        let allocation = self.current();
        let total: f64 = permitted.iter().map(|&arm| allocation.share(arm)).sum();
        if total <= f64::MIN_POSITIVE {
            return permitted.first().copied();
        }

        let roll = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            rng.random::<f64>() * total
        };

        let mut cumulative = 0.0;
        for &arm in permitted {
            cumulative += allocation.share(arm);
            if roll < cumulative {
                return Some(arm);
            }
        }
        permitted.last().copied()
    }

    /// Replace the published allocation, as during snapshot import
    pub fn import(&self, allocation: TrafficAllocation) {
        let normalized = allocation.normalize(self.config.min_share);
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(normalized);
    }
}
