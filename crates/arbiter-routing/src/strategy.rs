//! Cost-aware override of the routing candidate
//!
//! Consumes the bandit's candidate and may replace it according to the
//! configured strategy. Arms without observations never win an override:
//! a zero success rate fails every floor.

use arbiter_config::{CostConfig, CostStrategyKind};
use arbiter_core::Arm;

use crate::profile::CostTracker;

/// The cost optimizer's verdict on a routing candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostDecision {
    pub arm: Arm,
    /// True when the optimizer replaced the candidate
    pub overridden: bool,
}

/// Apply the configured cost strategy to a candidate arm
///
/// `permitted` is the guardrail's ordered arm list; the override never
/// leaves it. Emergency traffic must not reach this function.
pub fn select_cost_aware(
    candidate: Arm,
    permitted: &[Arm],
    tracker: &CostTracker,
    hour_of_day: u8,
    config: &CostConfig,
) -> CostDecision {
    let chosen = match config.strategy {
        CostStrategyKind::AggressiveCost => aggressive(permitted, tracker, config),
        CostStrategyKind::BalancedCostPerf => balanced(permitted, tracker, config, false),
        CostStrategyKind::PerformanceAware => balanced(permitted, tracker, config, true),
        CostStrategyKind::DynamicTime => {
            if config.off_peak_hours.contains(&hour_of_day) {
                aggressive(permitted, tracker, config)
            } else {
                balanced(permitted, tracker, config, false)
            }
        }
    };

    chosen.map_or(
        CostDecision {
            arm: candidate,
            overridden: false,
        },
        |arm| {
            if arm != candidate {
                tracing::debug!(
                    candidate = %candidate,
                    override_arm = %arm,
                    strategy = %config.strategy,
                    "cost optimizer overrode candidate"
                );
            }
            CostDecision {
                arm,
                overridden: arm != candidate,
            }
        },
    )
}

/// Cheapest arm meeting the success-rate floor
fn aggressive(permitted: &[Arm], tracker: &CostTracker, config: &CostConfig) -> Option<Arm> {
    permitted
        .iter()
        .copied()
        .map(|arm| (arm, tracker.profile(arm)))
        .filter(|(_, p)| p.trials > 0 && p.success_rate >= config.min_success_rate)
        .min_by(|(_, a), (_, b)| a.avg_cost_per_request.total_cmp(&b.avg_cost_per_request))
        .map(|(arm, _)| arm)
}

/// Weighted cost/performance/latency score; optionally rejects arms with
/// degraded latency relative to the fastest
fn balanced(
    permitted: &[Arm],
    tracker: &CostTracker,
    config: &CostConfig,
    latency_gate: bool,
) -> Option<Arm> {
    let profiles: Vec<_> = permitted
        .iter()
        .copied()
        .map(|arm| (arm, tracker.profile(arm)))
        .filter(|(_, p)| p.trials > 0)
        .collect();
    if profiles.is_empty() {
        return None;
    }

    let max_cost = profiles
        .iter()
        .map(|(_, p)| p.avg_cost_per_request)
        .fold(f64::NEG_INFINITY, f64::max)
        .max(f64::MIN_POSITIVE);
    let max_latency = profiles
        .iter()
        .map(|(_, p)| p.avg_latency_ms)
        .fold(f64::NEG_INFINITY, f64::max)
        .max(f64::MIN_POSITIVE);
    let min_latency = profiles
        .iter()
        .map(|(_, p)| p.avg_latency_ms)
        .fold(f64::INFINITY, f64::min);

    profiles
        .into_iter()
        .filter(|(_, p)| {
            !latency_gate || p.avg_latency_ms <= (1.0 + config.max_degradation_frac) * min_latency
        })
        .map(|(arm, p)| {
            let norm_cost = p.avg_cost_per_request / max_cost;
            let norm_latency = p.avg_latency_ms / max_latency;
            let score = config.weight_cost * (1.0 - norm_cost) + config.weight_perf * p.success_rate
                - config.weight_latency * norm_latency;
            (arm, score)
        })
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(arm, _)| arm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::RequestOutcome;

    fn tracker_with(arms: &[(Arm, bool, f64, f64, u64)]) -> CostTracker {
        let tracker = CostTracker::new(0.2);
        for &(arm, success, cost, latency, n) in arms {
            for _ in 0..n {
                tracker.record(&RequestOutcome {
                    request_id: "r".to_owned(),
                    arm,
                    success,
                    latency_ms: latency,
                    cost_eur: cost,
                    quality_score: None,
                    user_rating: None,
                });
            }
        }
        tracker
    }

    fn config(strategy: CostStrategyKind) -> CostConfig {
        CostConfig {
            strategy,
            ..CostConfig::default()
        }
    }

    #[test]
    fn aggressive_picks_cheapest_reliable_arm() {
        let tracker = tracker_with(&[
            (Arm::Bedrock, true, 0.08, 500.0, 20),
            (Arm::OpenAi, true, 0.02, 600.0, 20),
            (Arm::Gemini, false, 0.01, 400.0, 20), // cheap but failing
        ]);
        let decision = select_cost_aware(
            Arm::Bedrock,
            &Arm::ALL,
            &tracker,
            12,
            &config(CostStrategyKind::AggressiveCost),
        );
        assert_eq!(decision.arm, Arm::OpenAi);
        assert!(decision.overridden);
    }

    #[test]
    fn aggressive_keeps_candidate_without_qualified_arms() {
        let tracker = CostTracker::new(0.2);
        let decision = select_cost_aware(
            Arm::OpenAi,
            &Arm::ALL,
            &tracker,
            12,
            &config(CostStrategyKind::AggressiveCost),
        );
        assert_eq!(decision.arm, Arm::OpenAi);
        assert!(!decision.overridden);
    }

    #[test]
    fn balanced_trades_cost_against_success() {
        let tracker = tracker_with(&[
            (Arm::Bedrock, true, 0.10, 800.0, 20),
            (Arm::OpenAi, true, 0.02, 500.0, 20),
        ]);
        let decision = select_cost_aware(
            Arm::Bedrock,
            &[Arm::Bedrock, Arm::OpenAi],
            &tracker,
            12,
            &config(CostStrategyKind::BalancedCostPerf),
        );
        // Same success rate, cheaper and faster: OpenAI wins
        assert_eq!(decision.arm, Arm::OpenAi);
    }

    #[test]
    fn performance_aware_rejects_slow_arms() {
        // Gemini is cheapest but three times slower than the fastest
        let tracker = tracker_with(&[
            (Arm::OpenAi, true, 0.04, 400.0, 20),
            (Arm::Gemini, true, 0.01, 1_300.0, 20),
        ]);
        let decision = select_cost_aware(
            Arm::Gemini,
            &[Arm::OpenAi, Arm::Gemini],
            &tracker,
            12,
            &config(CostStrategyKind::PerformanceAware),
        );
        assert_eq!(decision.arm, Arm::OpenAi);
    }

    #[test]
    fn dynamic_time_switches_on_hour() {
        let tracker = tracker_with(&[
            (Arm::Bedrock, true, 0.10, 200.0, 20), // fast but expensive
            (Arm::Gemini, true, 0.01, 1_000.0, 20), // slow but cheap
        ]);
        let cfg = config(CostStrategyKind::DynamicTime);

        // 3 AM is off-peak: aggressive picks the cheap arm
        let night = select_cost_aware(Arm::Bedrock, &[Arm::Bedrock, Arm::Gemini], &tracker, 3, &cfg);
        assert_eq!(night.arm, Arm::Gemini);

        // Noon is peak: balanced scoring runs instead
        let noon = select_cost_aware(Arm::Bedrock, &[Arm::Bedrock, Arm::Gemini], &tracker, 12, &cfg);
        assert!(noon.arm == Arm::Bedrock || noon.arm == Arm::Gemini);
    }

    #[test]
    fn override_never_leaves_permitted_list() {
        let tracker = tracker_with(&[
            (Arm::OpenAi, true, 0.05, 500.0, 20),
            (Arm::Gemini, true, 0.01, 400.0, 20),
        ]);
        // Gemini is cheapest overall but not permitted
        let decision = select_cost_aware(
            Arm::OpenAi,
            &[Arm::OpenAi],
            &tracker,
            3,
            &config(CostStrategyKind::AggressiveCost),
        );
        assert_eq!(decision.arm, Arm::OpenAi);
    }
}
