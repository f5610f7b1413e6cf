//! The contextual bandit
//!
//! Selection uses a Beta-mean surrogate: `(1 + wins) / (2 + trials)` plus
//! a small uniform jitter, then the configured context bias, clamped to
//! `[0, 1]`. This is deliberately not a true Beta sampler; substituting one
//! changes the calibration of downstream allocation behavior.

use std::collections::HashMap;
use std::sync::Mutex;

use arbiter_config::BiasRule;
use arbiter_core::context::GLOBAL_KEY;
use arbiter_core::{Arm, BanditContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::stats::{ArmStats, StatsTable};

/// Jitter half-width around the Beta mean
const JITTER: f64 = 0.1;

/// Trials an arm needs before `best_arm` will consider it
const MIN_TRIALS_FOR_BEST: u64 = 10;

/// Trials above which `best_arm` confidence uses the boosted formula
const TRIALS_FOR_CONFIDENT_BEST: u64 = 50;

/// The best-performing arm for a context, with selection confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestArm {
    pub arm: Arm,
    pub confidence: f64,
}

/// Thompson-surrogate contextual bandit over the closed arm set
pub struct ContextualBandit {
    stats: StatsTable,
    bias: Vec<BiasRule>,
    rng: Mutex<StdRng>,
}

impl ContextualBandit {
    /// Build a bandit with the given bias table and RNG seed
    ///
    /// An absent seed draws one from the OS; a fixed seed makes every
    /// selection reproducible.
    pub fn new(bias: Vec<BiasRule>, seed: Option<u64>) -> Self {
        Self {
            stats: StatsTable::new(),
            bias,
            rng: Mutex::new(seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)),
        }
    }

    /// Select one arm for the context
    ///
    /// Never fails: an absent context scores against the global slot, and
    /// ties break toward the earlier arm in [`Arm::ALL`].
    pub fn choose(&self, context: Option<&BanditContext>) -> Arm {
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
        let empty = BanditContext::default();
        let bias_context = context.unwrap_or(&empty);

        let mut best = Arm::ALL[0];
        let mut best_score = f64::NEG_INFINITY;

        for arm in Arm::ALL {
            let stats = self.stats.arm(&key, arm);
            let score = self.surrogate_score(arm, &stats, bias_context);
            if score > best_score {
                best = arm;
                best_score = score;
            }
        }

        tracing::trace!(arm = %best, context = %key, score = best_score, "bandit selection");
        best
    }

    /// Beta-mean-plus-jitter score with the context bias applied
    fn surrogate_score(&self, arm: Arm, stats: &ArmStats, context: &BanditContext) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let (alpha, beta) = (
            1.0 + stats.wins as f64,
            1.0 + (stats.trials - stats.wins) as f64,
        );
        let mean = alpha / (alpha + beta);

        let jitter = {
            let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            (rng.random::<f64>() - 0.5) * JITTER
        };

        let bias: f64 = self.bias.iter().map(|r| r.delta_for(arm, context)).sum();

        (mean + jitter + bias).clamp(0.0, 1.0)
    }

    /// Record one outcome under the context's key and the global key
    pub fn record(
        &self,
        arm: Arm,
        success: bool,
        cost_eur: f64,
        latency_ms: f64,
        context: Option<&BanditContext>,
    ) {
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
        self.stats.record(&key, arm, success, cost_eur, latency_ms);
    }

    /// Per-arm stats for the context's slot
    pub fn stats(&self, context: Option<&BanditContext>) -> HashMap<Arm, ArmStats> {
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
        self.stats.snapshot(&key)
    }

    /// The highest win-rate arm with enough trials, or the deterministic
    /// default at confidence 0.5
    pub fn best_arm(&self, context: Option<&BanditContext>) -> BestArm {
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);

        let mut best: Option<(Arm, ArmStats)> = None;
        for arm in Arm::ALL {
            let stats = self.stats.arm(&key, arm);
            if stats.trials <= MIN_TRIALS_FOR_BEST {
                continue;
            }
            let better = best
                .as_ref()
                .is_none_or(|(_, b)| stats.win_rate() > b.win_rate());
            if better {
                best = Some((arm, stats));
            }
        }

        best.map_or(
            BestArm {
                arm: Arm::ALL[0],
                confidence: 0.5,
            },
            |(arm, stats)| {
                let confidence = if stats.trials > TRIALS_FOR_CONFIDENT_BEST {
                    (stats.win_rate() + 0.1).min(0.95)
                } else {
                    stats.win_rate().max(0.5)
                };
                BestArm { arm, confidence }
            },
        )
    }

    /// Drop the context's table entry
    pub fn reset_context(&self, context: Option<&BanditContext>) {
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
        self.stats.reset(&key);
    }

    /// The underlying statistics table
    pub fn table(&self) -> &StatsTable {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_config::BanditConfig;

    fn bandit() -> ContextualBandit {
        ContextualBandit::new(BanditConfig::default().bias, Some(7))
    }

    fn ctx(domain: &str) -> BanditContext {
        BanditContext {
            domain: Some(domain.to_owned()),
            ..BanditContext::default()
        }
    }

    #[test]
    fn choose_always_returns_an_arm() {
        let bandit = bandit();
        // No data at all: any arm is acceptable, the call must not panic
        let arm = bandit.choose(None);
        assert!(Arm::ALL.contains(&arm));
    }

    #[test]
    fn strong_winner_dominates_selection() {
        let bandit = bandit();
        for _ in 0..200 {
            bandit.record(Arm::OpenAi, true, 0.01, 100.0, None);
            bandit.record(Arm::Bedrock, false, 0.05, 900.0, None);
            bandit.record(Arm::Gemini, false, 0.01, 400.0, None);
        }

        let mut openai_picks = 0;
        for _ in 0..100 {
            if bandit.choose(None) == Arm::OpenAi {
                openai_picks += 1;
            }
        }
        // Beta means: ~0.995 vs ~0.005; jitter is ±0.05, so OpenAI wins every draw
        assert!(openai_picks > 95, "openai picked {openai_picks}/100");
    }

    #[test]
    fn tool_requirement_steers_away_from_gemini() {
        let bandit = bandit();
        let context = BanditContext {
            require_tools: Some(true),
            ..BanditContext::default()
        };
        // With no data the means are equal; the -0.30 bias must keep
        // Gemini from winning any draw
        for _ in 0..100 {
            assert_ne!(bandit.choose(Some(&context)), Arm::Gemini);
        }
    }

    #[test]
    fn best_arm_requires_trials() {
        let bandit = bandit();
        for _ in 0..5 {
            bandit.record(Arm::Gemini, true, 0.01, 100.0, None);
        }
        // 5 trials is below the floor: deterministic default
        let best = bandit.best_arm(None);
        assert_eq!(best.arm, Arm::ALL[0]);
        assert!((best.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn best_arm_confidence_boost_after_fifty_trials() {
        let bandit = bandit();
        for i in 0..60 {
            bandit.record(Arm::Gemini, i % 5 != 0, 0.01, 100.0, None);
        }
        let best = bandit.best_arm(None);
        assert_eq!(best.arm, Arm::Gemini);
        // win rate 0.8 → confidence min(0.95, 0.9)
        assert!((best.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn context_slots_are_independent() {
        let bandit = bandit();
        for _ in 0..20 {
            bandit.record(Arm::OpenAi, true, 0.01, 100.0, Some(&ctx("legal")));
        }
        assert_eq!(bandit.stats(Some(&ctx("legal")))[&Arm::OpenAi].trials, 20);
        assert!(!bandit.stats(Some(&ctx("culinary"))).contains_key(&Arm::OpenAi));

        bandit.reset_context(Some(&ctx("legal")));
        assert!(bandit.stats(Some(&ctx("legal"))).is_empty());
        // Global still remembers
        assert_eq!(bandit.stats(None)[&Arm::OpenAi].trials, 20);
    }

    #[test]
    fn seeded_bandits_agree() {
        let a = ContextualBandit::new(BanditConfig::default().bias, Some(99));
        let b = ContextualBandit::new(BanditConfig::default().bias, Some(99));
        for _ in 0..50 {
            assert_eq!(a.choose(None), b.choose(None));
        }
    }
}
