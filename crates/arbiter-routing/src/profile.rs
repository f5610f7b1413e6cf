//! Per-arm cost/performance profiles and target tracking
//!
//! Profiles are plain running averages rather than exponential smoothing:
//! the averages are order-independent, which keeps outcome recording
//! commutative.

use std::collections::HashMap;
use std::sync::Mutex;

use arbiter_core::{Arm, RequestOutcome};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Requests that establish the cost baseline before reduction tracking
const BASELINE_WINDOW: u64 = 100;

/// Guard against division by a zero average cost
const COST_EPSILON: f64 = 1e-9;

/// Observed cost/performance profile of one arm
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteProfile {
    pub avg_cost_per_request: f64,
    pub avg_latency_ms: f64,
    /// Fraction of successful requests, in `[0, 1]`
    pub success_rate: f64,
    /// Success per EUR; never negative
    pub cost_efficiency_score: f64,
    pub trials: u64,
}

impl RouteProfile {
    fn record(&mut self, outcome: &RequestOutcome) {
        self.trials += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.trials as f64;
        self.avg_cost_per_request += (outcome.cost_eur - self.avg_cost_per_request) / n;
        self.avg_latency_ms += (outcome.latency_ms - self.avg_latency_ms) / n;
        let success = f64::from(u8::from(outcome.success));
        self.success_rate += (success - self.success_rate) / n;
        self.cost_efficiency_score =
            self.success_rate / self.avg_cost_per_request.max(COST_EPSILON);
    }
}

#[derive(Debug, Default)]
struct ReductionState {
    requests: u64,
    /// Mean cost of the first `BASELINE_WINDOW` requests
    baseline_cost: f64,
    /// Mean cost of everything after the baseline window
    actual_cost: f64,
    actual_requests: u64,
}

/// The cost-performance optimizer's state (C5)
pub struct CostTracker {
    profiles: DashMap<Arm, RouteProfile>,
    reduction: Mutex<ReductionState>,
    target_cost_reduction: f64,
}

impl CostTracker {
    pub fn new(target_cost_reduction: f64) -> Self {
        Self {
            profiles: DashMap::new(),
            reduction: Mutex::new(ReductionState::default()),
            target_cost_reduction,
        }
    }

    /// Fold one outcome into the arm's profile and the reduction tracker
    pub fn record(&self, outcome: &RequestOutcome) {
        self.profiles
            .entry(outcome.arm)
            .or_default()
            .record(outcome);

        let mut reduction = self
            .reduction
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        reduction.requests += 1;
        if reduction.requests <= BASELINE_WINDOW {
            #[allow(clippy::cast_precision_loss)]
            let n = reduction.requests as f64;
            reduction.baseline_cost += (outcome.cost_eur - reduction.baseline_cost) / n;
        } else {
            reduction.actual_requests += 1;
            #[allow(clippy::cast_precision_loss)]
            let n = reduction.actual_requests as f64;
            reduction.actual_cost += (outcome.cost_eur - reduction.actual_cost) / n;
        }
        drop(reduction);

        if self.target_met() {
            tracing::debug!(
                target = self.target_cost_reduction,
                "cost reduction target met"
            );
        }
    }

    /// Profile for one arm, zeroed when never observed
    pub fn profile(&self, arm: Arm) -> RouteProfile {
        self.profiles.get(&arm).map(|p| *p).unwrap_or_default()
    }

    /// Snapshot of every observed profile
    pub fn snapshot(&self) -> HashMap<Arm, RouteProfile> {
        self.profiles.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    /// The baseline per-request cost, once any traffic has been observed
    pub fn baseline_cost(&self) -> Option<f64> {
        let reduction = self
            .reduction
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (reduction.requests > 0).then_some(reduction.baseline_cost)
    }

    /// Achieved cost reduction against the baseline, once both are known
    pub fn current_reduction(&self) -> Option<f64> {
        let reduction = self
            .reduction
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if reduction.requests <= BASELINE_WINDOW
            || reduction.actual_requests == 0
            || reduction.baseline_cost <= COST_EPSILON
        {
            return None;
        }
        Some(1.0 - reduction.actual_cost / reduction.baseline_cost)
    }

    /// Whether the configured reduction target has been reached
    pub fn target_met(&self) -> bool {
        self.current_reduction()
            .is_some_and(|r| r >= self.target_cost_reduction)
    }

    /// Clone the profile table for snapshot export
    pub fn export(&self) -> HashMap<Arm, RouteProfile> {
        self.snapshot()
    }

    /// Replace the profile table from an exported snapshot
    pub fn import(&self, profiles: HashMap<Arm, RouteProfile>) {
        self.profiles.clear();
        for (arm, profile) in profiles {
            self.profiles.insert(arm, profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(arm: Arm, success: bool, cost: f64, latency: f64) -> RequestOutcome {
        RequestOutcome {
            request_id: "r".to_owned(),
            arm,
            success,
            latency_ms: latency,
            cost_eur: cost,
            quality_score: None,
            user_rating: None,
        }
    }

    #[test]
    fn running_averages_track() {
        let tracker = CostTracker::new(0.2);
        tracker.record(&outcome(Arm::OpenAi, true, 0.02, 100.0));
        tracker.record(&outcome(Arm::OpenAi, false, 0.04, 300.0));

        let profile = tracker.profile(Arm::OpenAi);
        assert_eq!(profile.trials, 2);
        assert!((profile.avg_cost_per_request - 0.03).abs() < 1e-12);
        assert!((profile.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((profile.success_rate - 0.5).abs() < 1e-12);
        assert!(profile.cost_efficiency_score >= 0.0);
    }

    #[test]
    fn unobserved_arm_has_zero_profile() {
        let tracker = CostTracker::new(0.2);
        let profile = tracker.profile(Arm::Gemini);
        assert_eq!(profile.trials, 0);
        assert!(profile.success_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn reduction_needs_baseline_first() {
        let tracker = CostTracker::new(0.2);
        for _ in 0..50 {
            tracker.record(&outcome(Arm::OpenAi, true, 0.05, 100.0));
        }
        assert_eq!(tracker.current_reduction(), None);
    }

    #[test]
    fn target_met_after_cheaper_traffic() {
        let tracker = CostTracker::new(0.2);
        // Baseline window at 0.05 EUR per request
        for _ in 0..100 {
            tracker.record(&outcome(Arm::Bedrock, true, 0.05, 100.0));
        }
        // Then everything at 0.03 EUR: reduction 0.4
        for _ in 0..100 {
            tracker.record(&outcome(Arm::Gemini, true, 0.03, 100.0));
        }
        let reduction = tracker.current_reduction().unwrap();
        assert!((reduction - 0.4).abs() < 1e-9);
        assert!(tracker.target_met());
    }

    #[test]
    fn export_import_roundtrip() {
        let tracker = CostTracker::new(0.2);
        tracker.record(&outcome(Arm::OpenAi, true, 0.02, 100.0));

        let restored = CostTracker::new(0.2);
        restored.import(tracker.export());
        assert_eq!(restored.profile(Arm::OpenAi), tracker.profile(Arm::OpenAi));
    }
}
