//! SLO breach detection and rollback sequencing (C10)
//!
//! Evaluates the canary window and external SLO reports against the
//! configured thresholds. A hard breach (or a run of consecutive SLO
//! violations) asks for an emergency rollback; a single soft breach walks
//! the gradual ladder instead. A cooldown prevents rollback thrash.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use arbiter_config::DeploymentConfig;
use serde::{Deserialize, Serialize};

use crate::controller::CanaryMetrics;

/// Error-rate multiple over the threshold that upgrades a rollback to
/// an emergency
const EMERGENCY_ERROR_MULTIPLE: f64 = 2.0;

/// What the rollback manager wants done
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackDecision {
    /// Go dark immediately and trip every breaker
    Emergency { reason: String },
    /// Step the canary percentage down the ladder
    Gradual { to_percentage: f64, reason: String },
}

/// One recorded rollback, bounded history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEvent {
    pub id: String,
    /// Unix epoch milliseconds
    pub at_epoch_ms: u64,
    pub emergency: bool,
    pub reason: String,
    /// The ladder step taken, for gradual rollbacks
    pub to_percentage: Option<f64>,
}

#[derive(Debug, Default)]
struct LadderState {
    /// Index of the next ladder step
    position: usize,
    last_step_at: Option<Instant>,
}

/// The performance rollback manager
pub struct RollbackManager {
    config: DeploymentConfig,
    history: Mutex<VecDeque<RollbackEvent>>,
    consecutive_slo_violations: AtomicU32,
    last_rollback_at: Mutex<Option<Instant>>,
    ladder: Mutex<LadderState>,
}

impl RollbackManager {
    pub fn new(config: DeploymentConfig) -> Self {
        Self {
            config,
            history: Mutex::new(VecDeque::new()),
            consecutive_slo_violations: AtomicU32::new(0),
            last_rollback_at: Mutex::new(None),
            ladder: Mutex::new(LadderState::default()),
        }
    }

    /// Feed an external SLO report; violations must be consecutive to count
    pub fn report_slo(&self, violated: bool) {
        if violated {
            self.consecutive_slo_violations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.consecutive_slo_violations.store(0, Ordering::Relaxed);
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rollback_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < Duration::from_secs(self.config.cooldown_secs))
    }

    /// Evaluate the rollback triggers
    ///
    /// `baseline_cost` is the per-request cost the canary is compared
    /// against; absent means the cost trigger cannot fire.
    pub fn evaluate(
        &self,
        metrics: Option<&CanaryMetrics>,
        baseline_cost: Option<f64>,
    ) -> Option<RollbackDecision> {
        if self.in_cooldown() {
            tracing::debug!("rollback evaluation skipped during cooldown");
            return None;
        }

        let thresholds = &self.config.thresholds;
        let slo_run = self.consecutive_slo_violations.load(Ordering::Relaxed);
        if slo_run >= self.config.slo_violation_threshold {
            return Some(RollbackDecision::Emergency {
                reason: format!("{slo_run} consecutive SLO violations"),
            });
        }

        let metrics = metrics?;

        if metrics.avg_error_rate > thresholds.max_error_rate * EMERGENCY_ERROR_MULTIPLE {
            return Some(RollbackDecision::Emergency {
                reason: format!(
                    "canary error rate {:.3} far above limit {:.3}",
                    metrics.avg_error_rate, thresholds.max_error_rate
                ),
            });
        }

        let mut soft_reason = None;
        if metrics.avg_error_rate > thresholds.max_error_rate {
            soft_reason = Some(format!(
                "canary error rate {:.3} above limit {:.3}",
                metrics.avg_error_rate, thresholds.max_error_rate
            ));
        } else if metrics.p95_latency_ms > thresholds.max_p95_latency_ms {
            soft_reason = Some(format!(
                "canary p95 latency {:.0} ms above limit {:.0} ms",
                metrics.p95_latency_ms, thresholds.max_p95_latency_ms
            ));
        } else if let Some(baseline) = baseline_cost {
            if baseline > 0.0 && metrics.avg_cost_eur > thresholds.max_cost_multiplier * baseline {
                soft_reason = Some(format!(
                    "canary cost {:.4} above {:.1}x baseline {:.4}",
                    metrics.avg_cost_eur, thresholds.max_cost_multiplier, baseline
                ));
            }
        }

        let reason = soft_reason?;
        self.next_ladder_step()
            .map(|to_percentage| RollbackDecision::Gradual {
                to_percentage,
                reason: reason.clone(),
            })
            .or(Some(RollbackDecision::Emergency { reason }))
    }

    /// Next ladder percentage, honoring the per-step dwell time
    fn next_ladder_step(&self) -> Option<f64> {
        let mut ladder = self
            .ladder
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let dwell = Duration::from_secs(self.config.step_dwell_secs);
        if ladder
            .last_step_at
            .is_some_and(|at| at.elapsed() < dwell)
        {
            // Still dwelling on the current step; report it unchanged
            return self
                .config
                .rollback_steps
                .get(ladder.position.saturating_sub(1))
                .copied();
        }

        let step = self.config.rollback_steps.get(ladder.position).copied()?;
        ladder.position += 1;
        ladder.last_step_at = Some(Instant::now());
        Some(step)
    }

    /// Record an executed rollback and start the cooldown
    pub fn record(&self, emergency: bool, reason: &str, to_percentage: Option<f64>) -> RollbackEvent {
        let event = RollbackEvent {
            id: uuid::Uuid::new_v4().to_string(),
            at_epoch_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            emergency,
            reason: reason.to_owned(),
            to_percentage,
        };

        tracing::warn!(
            emergency,
            reason,
            to_percentage = ?to_percentage,
            "rollback recorded"
        );

        let mut history = self
            .history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if history.len() >= self.config.max_history {
            history.pop_front();
        }
        history.push_back(event.clone());
        drop(history);

        *self
            .last_rollback_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
        self.consecutive_slo_violations.store(0, Ordering::Relaxed);

        event
    }

    /// Snapshot of the rollback history, oldest first
    pub fn history(&self) -> Vec<RollbackEvent> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(error_rate: f64, p95: f64, cost: f64) -> CanaryMetrics {
        CanaryMetrics {
            avg_error_rate: error_rate,
            p95_latency_ms: p95,
            avg_cost_eur: cost,
            samples: 20,
        }
    }

    fn manager(config: DeploymentConfig) -> RollbackManager {
        RollbackManager::new(config)
    }

    #[test]
    fn healthy_canary_no_rollback() {
        let m = manager(DeploymentConfig::default());
        let decision = m.evaluate(Some(&metrics(0.01, 800.0, 0.01)), Some(0.01));
        assert!(decision.is_none());
    }

    #[test]
    fn soft_error_breach_walks_the_ladder() {
        let mut config = DeploymentConfig::default();
        config.step_dwell_secs = 0;
        let m = manager(config);

        let decision = m.evaluate(Some(&metrics(0.08, 800.0, 0.01)), Some(0.01));
        let Some(RollbackDecision::Gradual { to_percentage, .. }) = decision else {
            panic!("expected gradual rollback, got {decision:?}");
        };
        assert!((to_percentage - 90.0).abs() < f64::EPSILON);

        // The next breach steps further down
        let decision = m.evaluate(Some(&metrics(0.08, 800.0, 0.01)), Some(0.01));
        let Some(RollbackDecision::Gradual { to_percentage, .. }) = decision else {
            panic!("expected gradual rollback");
        };
        assert!((to_percentage - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn extreme_error_rate_is_an_emergency() {
        let m = manager(DeploymentConfig::default());
        let decision = m.evaluate(Some(&metrics(0.5, 800.0, 0.01)), Some(0.01));
        assert!(matches!(decision, Some(RollbackDecision::Emergency { .. })));
    }

    #[test]
    fn latency_breach_triggers() {
        let mut config = DeploymentConfig::default();
        config.step_dwell_secs = 0;
        let m = manager(config);
        let decision = m.evaluate(Some(&metrics(0.0, 9_000.0, 0.01)), None);
        assert!(matches!(decision, Some(RollbackDecision::Gradual { .. })));
    }

    #[test]
    fn cost_breach_needs_a_baseline() {
        let mut config = DeploymentConfig::default();
        config.step_dwell_secs = 0;
        let m = manager(config);

        // 5x the baseline cost, but no baseline known: nothing fires
        assert!(m.evaluate(Some(&metrics(0.0, 800.0, 0.05)), None).is_none());
        // With a baseline the multiplier trips
        let decision = m.evaluate(Some(&metrics(0.0, 800.0, 0.05)), Some(0.01));
        assert!(matches!(decision, Some(RollbackDecision::Gradual { .. })));
    }

    #[test]
    fn consecutive_slo_violations_force_emergency() {
        let m = manager(DeploymentConfig::default());
        m.report_slo(true);
        m.report_slo(true);
        // A success in between resets the run
        m.report_slo(false);
        m.report_slo(true);
        m.report_slo(true);
        assert!(m.evaluate(None, None).is_none());

        m.report_slo(true);
        let decision = m.evaluate(None, None);
        assert!(matches!(decision, Some(RollbackDecision::Emergency { .. })));
    }

    #[test]
    fn cooldown_suppresses_evaluation() {
        let m = manager(DeploymentConfig::default());
        m.record(true, "test", None);
        let decision = m.evaluate(Some(&metrics(0.9, 9_000.0, 1.0)), Some(0.01));
        assert!(decision.is_none());
    }

    #[test]
    fn history_is_bounded() {
        let mut config = DeploymentConfig::default();
        config.max_history = 3;
        config.cooldown_secs = 0;
        let m = manager(config);
        for i in 0..10 {
            m.record(false, &format!("r{i}"), Some(50.0));
        }
        let history = m.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].reason, "r9");
    }
}
