//! Selection strategies layered on the contextual bandit
//!
//! UCB for cold starts, the Thompson surrogate once data accumulates, and
//! a hybrid that switches between them on total trial volume. Also produces
//! periodic optimization recommendations and owns the one self-tuning knob:
//! the UCB exploration rate.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use arbiter_config::BanditConfig;
use arbiter_core::context::GLOBAL_KEY;
use arbiter_core::{Arm, BanditContext, DecisionSource, ExperimentManager};

use crate::bandit::ContextualBandit;

/// Confidence radius above which an arm still needs exploration
const EXPLORATION_RADIUS: f64 = 0.1;

/// Cap on the auto-tuned exploration rate
const MAX_EXPLORATION_RATE: f64 = 0.3;

/// Floor the decayed exploration rate never drops below
const MIN_EXPLORATION_RATE: f64 = 0.05;

/// How long a boosted exploration rate holds before decaying
const EXPLORATION_DECAY_AFTER: Duration = Duration::from_secs(30 * 60);

/// The three selection algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SelectionStrategy {
    Ucb,
    Thompson,
    Hybrid,
}

/// One arm selection with its provenance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub arm: Arm,
    pub confidence: f64,
    pub strategy: SelectionStrategy,
    pub source: DecisionSource,
    /// True while the chosen arm's estimate is still wide
    pub exploration_needed: bool,
}

/// Advice produced by the periodic recommendation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecommendationKind {
    Exploration,
    Exploitation,
    ContextSpecific,
    Experiment,
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RecPriority {
    Low,
    Medium,
    High,
}

/// One optimization recommendation
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: RecPriority,
    pub detail: String,
    /// The context the recommendation is about, when context-specific
    pub context: Option<String>,
}

/// Bandit optimizer wrapping the contextual bandit
pub struct BanditOptimizer {
    bandit: ContextualBandit,
    config: BanditConfig,
    exploration_rate: Mutex<f64>,
    /// When a boosted exploration rate is due to decay
    decay_due: Mutex<Option<Instant>>,
    /// Recommendations are recomputed at most once per interval
    cached_recommendations: Mutex<Option<(Instant, Vec<Recommendation>)>>,
}

impl BanditOptimizer {
    pub fn new(config: BanditConfig, seed: Option<u64>) -> Self {
        let bandit = ContextualBandit::new(config.bias.clone(), seed);
        let exploration_rate = Mutex::new(config.exploration_rate);
        Self {
            bandit,
            config,
            exploration_rate,
            decay_due: Mutex::new(None),
            cached_recommendations: Mutex::new(None),
        }
    }

    /// The wrapped bandit, for recording and stats access
    pub fn bandit(&self) -> &ContextualBandit {
        &self.bandit
    }

    /// Current (possibly auto-tuned) exploration rate
    pub fn exploration_rate(&self) -> f64 {
        *self
            .exploration_rate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Select an arm with the given strategy
    pub fn select(&self, strategy: SelectionStrategy, context: Option<&BanditContext>) -> Selection {
        match strategy {
            SelectionStrategy::Ucb => self.select_ucb(context),
            SelectionStrategy::Thompson => self.select_thompson(context),
            SelectionStrategy::Hybrid => {
                let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
                let total = self.bandit.table().total_trials(&key);
                if total < 3 * self.config.min_trials_for_confidence {
                    let mut selection = self.select_ucb(context);
                    selection.strategy = SelectionStrategy::Hybrid;
                    selection
                } else {
                    let mut selection = self.select_thompson(context);
                    selection.strategy = SelectionStrategy::Hybrid;
                    selection
                }
            }
        }
    }

    /// Upper-confidence-bound selection; unplayed arms win outright
    fn select_ucb(&self, context: Option<&BanditContext>) -> Selection {
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
        let total = self.bandit.table().total_trials(&key);
        let rate = self.exploration_rate();

        let mut best = Arm::ALL[0];
        let mut best_score = f64::NEG_INFINITY;
        let mut best_radius = f64::INFINITY;
        let mut best_trials = 0_u64;

        for arm in Arm::ALL {
            let stats = self.bandit.table().arm(&key, arm);
            let (score, radius) = if stats.trials == 0 {
                (f64::INFINITY, f64::INFINITY)
            } else {
                #[allow(clippy::cast_precision_loss)]
                let radius = rate * (2.0 * (total.max(1) as f64).ln() / stats.trials as f64).sqrt();
                (stats.win_rate() + radius, radius)
            };
            if score > best_score {
                best = arm;
                best_score = score;
                best_radius = radius;
                best_trials = stats.trials;
            }
        }

        let exploration_needed =
            best_radius > EXPLORATION_RADIUS || best_trials < self.config.min_trials_for_confidence;
        let confidence = if best_radius.is_finite() {
            (1.0 - best_radius).clamp(0.0, 0.95)
        } else {
            0.0
        };

        Selection {
            arm: best,
            confidence,
            strategy: SelectionStrategy::Ucb,
            source: DecisionSource::Bandit,
            exploration_needed,
        }
    }

    /// Thompson-surrogate selection via the wrapped bandit
    fn select_thompson(&self, context: Option<&BanditContext>) -> Selection {
        let arm = self.bandit.choose(context);
        let key = context.map_or_else(|| GLOBAL_KEY.to_owned(), BanditContext::key);
        let stats = self.bandit.table().arm(&key, arm);

        let confidence = if stats.trials > 50 {
            (stats.win_rate() + 0.1).min(0.95)
        } else {
            stats.win_rate().max(0.5)
        };

        Selection {
            arm,
            confidence,
            strategy: SelectionStrategy::Thompson,
            source: DecisionSource::Bandit,
            exploration_needed: stats.trials < self.config.min_trials_for_confidence,
        }
    }

    /// The routing entry point: experiment assignment first, hybrid fallback
    ///
    /// Experiment manager errors are logged and swallowed; routing never
    /// fails on this seam.
    pub async fn optimal_arm(
        &self,
        context: Option<&BanditContext>,
        experiments: Option<&dyn ExperimentManager>,
    ) -> Selection {
        if let Some(manager) = experiments {
            let empty = BanditContext::default();
            let lookup = context.unwrap_or(&empty);
            match manager.assignment(lookup).await {
                Ok(Some(assignment)) => {
                    tracing::debug!(
                        arm = %assignment.arm,
                        experiment = %assignment.experiment_name,
                        "arm assigned by experiment"
                    );
                    return Selection {
                        arm: assignment.arm,
                        confidence: assignment.confidence,
                        strategy: SelectionStrategy::Hybrid,
                        source: DecisionSource::Experiment,
                        exploration_needed: false,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "experiment lookup failed, falling back to bandit");
                }
            }
        }

        self.select(SelectionStrategy::Hybrid, context)
    }

    /// The current recommendation set, recomputed at most once per
    /// configured interval
    pub fn recommendations(&self, experiments_available: bool) -> Vec<Recommendation> {
        let interval = Duration::from_secs(self.config.optimization_interval_secs);
        let mut cached = self
            .cached_recommendations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some((at, recommendations)) = cached.as_ref() {
            if at.elapsed() < interval {
                return recommendations.clone();
            }
        }

        let fresh = self.compute_recommendations(experiments_available);
        *cached = Some((Instant::now(), fresh.clone()));
        fresh
    }

    fn compute_recommendations(&self, experiments_available: bool) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let table = self.bandit.table();

        // Under-explored arms, judged on the global slot
        let under_explored: Vec<Arm> = Arm::ALL
            .into_iter()
            .filter(|&arm| table.arm(GLOBAL_KEY, arm).trials < self.config.min_trials_for_confidence)
            .collect();
        if !under_explored.is_empty() {
            out.push(Recommendation {
                kind: RecommendationKind::Exploration,
                priority: RecPriority::High,
                detail: format!(
                    "{} arm(s) below {} trials",
                    under_explored.len(),
                    self.config.min_trials_for_confidence
                ),
                context: None,
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let baseline = 1.0 / Arm::ALL.len() as f64;

        for key in table.context_keys() {
            let slot = table.snapshot(&key);
            let Some(best) = slot
                .values()
                .max_by(|a, b| a.win_rate().total_cmp(&b.win_rate()))
            else {
                continue;
            };
            let improvement = best.win_rate() - baseline;

            // A settled winner worth exploiting
            if best.trials > 50 && (best.win_rate() + 0.1).min(0.95) > 0.9 {
                out.push(Recommendation {
                    kind: RecommendationKind::Exploitation,
                    priority: RecPriority::Low,
                    detail: format!("confident winner at win rate {:.2}", best.win_rate()),
                    context: Some(key.clone()),
                });
            }

            // A context where stratification is not paying off
            if improvement < 0.1 && key != GLOBAL_KEY {
                out.push(Recommendation {
                    kind: RecommendationKind::ContextSpecific,
                    priority: RecPriority::Medium,
                    detail: format!("improvement over uniform baseline is {improvement:.2}"),
                    context: Some(key.clone()),
                });
            }

            // A margin big enough to justify a formal experiment
            if experiments_available && improvement > 0.2 && best.trials > 30 {
                out.push(Recommendation {
                    kind: RecommendationKind::Experiment,
                    priority: RecPriority::Medium,
                    detail: format!("candidate experiment, improvement {improvement:.2}"),
                    context: Some(key.clone()),
                });
            }
        }

        out
    }

    /// Apply auto-tuning from a recommendation set
    ///
    /// A high-priority exploration recommendation boosts the exploration
    /// rate by 1.2x (capped) and schedules its decay.
    pub fn apply_auto_tuning(&self, recommendations: &[Recommendation]) {
        let needs_boost = recommendations.iter().any(|r| {
            r.kind == RecommendationKind::Exploration && r.priority == RecPriority::High
        });
        if !needs_boost {
            return;
        }

        let mut rate = self
            .exploration_rate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let boosted = (*rate * 1.2).min(MAX_EXPLORATION_RATE);
        if (boosted - *rate).abs() > f64::EPSILON {
            tracing::info!(from = *rate, to = boosted, "boosting exploration rate");
        }
        *rate = boosted;
        drop(rate);

        *self
            .decay_due
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(Instant::now() + EXPLORATION_DECAY_AFTER);
    }

    /// Decay a boosted exploration rate once its hold time has passed
    ///
    /// Called from the periodic optimization cycle.
    pub fn maybe_decay_exploration(&self) {
        let mut due = self
            .decay_due
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if due.is_some_and(|at| Instant::now() >= at) {
            *due = None;
            drop(due);
            let mut rate = self
                .exploration_rate
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *rate = (*rate * 0.9).max(MIN_EXPLORATION_RATE);
            tracing::info!(rate = *rate, "decayed exploration rate");
        }
    }
}
