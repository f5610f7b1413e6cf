//! Paired win-rate comparison and promote/rollback advice (C11)
//!
//! Scores control/treatment response pairs on quality, latency, cost, and
//! satisfaction, aggregates winners per experiment, and derives statistical
//! significance from a two-sided z-test on the win proportion.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Composite score weights
const WEIGHT_QUALITY: f64 = 0.4;
const WEIGHT_LATENCY: f64 = 0.2;
const WEIGHT_COST: f64 = 0.2;
const WEIGHT_SATISFACTION: f64 = 0.2;

/// Composite magnitude below which a pair is a tie
const TIE_EPSILON: f64 = 1e-3;

/// Guard for normalization denominators
const NORM_EPSILON: f64 = 1e-9;

/// Minimum samples before any advice other than `Continue`
const MIN_SAMPLE_SIZE: u64 = 100;

/// Win-rate floor for promotion
const PROMOTE_WIN_RATE: f64 = 0.85;

/// Revenue lift floor for promotion
const PROMOTE_REVENUE_LIFT: f64 = 0.02;

/// Win-rate ceiling for rollback
const ROLLBACK_WIN_RATE: f64 = 0.5;

/// Revenue lift ceiling for rollback
const ROLLBACK_REVENUE_LIFT: f64 = -0.05;

/// Significance required for either decision
const DECISION_SIGNIFICANCE: f64 = 0.95;

/// Scores the text quality of one response
///
/// Pluggable because the default is an admitted placeholder: it prefers
/// responses whose length is near 500 characters, pending a real grader.
pub trait QualityScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// The length-proximity heuristic
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthHeuristic;

impl QualityScorer for LengthHeuristic {
    fn score(&self, text: &str) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let len = text.chars().count() as f64;
        (1.0 - (len - 500.0).abs() / 500.0).max(0.0)
    }
}

/// One side of a paired comparison
#[derive(Debug, Clone)]
pub struct ResponseSample {
    pub text: String,
    pub latency_ms: f64,
    pub cost_eur: f64,
    /// Normalized satisfaction in `[0, 1]`, when collected
    pub satisfaction: Option<f64>,
}

/// A control/treatment pair for the same prompt and context
#[derive(Debug, Clone)]
pub struct PairedSample {
    pub control: ResponseSample,
    pub treatment: ResponseSample,
}

/// Who won a paired comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Winner {
    Control,
    Treatment,
    Tie,
}

/// Outcome of one paired comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonResult {
    pub winner: Winner,
    /// Signed composite; positive means the treatment was better
    pub score: f64,
    pub confidence: f64,
}

/// Advice for the experiment owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Advice {
    Promote,
    Rollback,
    Continue,
}

/// Aggregate statistics for one experiment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScorecardTotals {
    pub control_wins: u64,
    pub treatment_wins: u64,
    pub ties: u64,
}

/// Normalized delta with positive meaning "treatment better"
fn delta_higher_is_better(control: f64, treatment: f64) -> f64 {
    let denom = control.abs().max(treatment.abs()).max(NORM_EPSILON);
    ((treatment - control) / denom).clamp(-1.0, 1.0)
}

/// As [`delta_higher_is_better`] with the sign flipped for lower-is-better
/// metrics
fn delta_lower_is_better(control: f64, treatment: f64) -> f64 {
    delta_higher_is_better(treatment, control)
}

/// Compare one control/treatment pair
pub fn compare(pair: &PairedSample, scorer: &dyn QualityScorer) -> ComparisonResult {
    let quality = delta_higher_is_better(
        scorer.score(&pair.control.text),
        scorer.score(&pair.treatment.text),
    );
    let latency = delta_lower_is_better(pair.control.latency_ms, pair.treatment.latency_ms);
    let cost = delta_lower_is_better(pair.control.cost_eur, pair.treatment.cost_eur);
    let satisfaction = match (pair.control.satisfaction, pair.treatment.satisfaction) {
        (Some(c), Some(t)) => delta_higher_is_better(c, t),
        _ => 0.0,
    };

    let score = WEIGHT_QUALITY * quality
        + WEIGHT_LATENCY * latency
        + WEIGHT_COST * cost
        + WEIGHT_SATISFACTION * satisfaction;

    let winner = if score > TIE_EPSILON {
        Winner::Treatment
    } else if score < -TIE_EPSILON {
        Winner::Control
    } else {
        Winner::Tie
    };

    ComparisonResult {
        winner,
        score,
        confidence: (0.5 + score.abs()).min(0.95),
    }
}

/// Running experiment scorecard
pub struct ExperimentScorecard {
    totals: Mutex<ScorecardTotals>,
}

impl Default for ExperimentScorecard {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentScorecard {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(ScorecardTotals::default()),
        }
    }

    /// Fold one comparison into the totals
    pub fn record(&self, result: &ComparisonResult) {
        let mut totals = self
            .totals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match result.winner {
            Winner::Control => totals.control_wins += 1,
            Winner::Treatment => totals.treatment_wins += 1,
            Winner::Tie => totals.ties += 1,
        }
    }

    pub fn totals(&self) -> ScorecardTotals {
        *self
            .totals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn sample_size(&self) -> u64 {
        let totals = self.totals();
        totals.control_wins + totals.treatment_wins + totals.ties
    }

    /// Treatment share of all comparisons
    pub fn treatment_win_rate(&self) -> f64 {
        let totals = self.totals();
        let n = totals.control_wins + totals.treatment_wins + totals.ties;
        if n == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            totals.treatment_wins as f64 / n as f64
        }
    }

    /// Two-sided z-test significance of the win proportion against 0.5
    pub fn significance(&self) -> f64 {
        let n = self.sample_size();
        if n == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let p_hat = self.treatment_win_rate();
        let z = (p_hat - 0.5) / (0.25 / n_f).sqrt();
        let p_value = 2.0 * (1.0 - standard_normal_cdf(z.abs()));
        1.0 - p_value
    }

    /// 95% Wald interval for the treatment win rate
    pub fn confidence_interval(&self) -> (f64, f64) {
        let n = self.sample_size();
        if n == 0 {
            return (0.0, 1.0);
        }
        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let p_hat = self.treatment_win_rate();
        let half_width = 1.96 * (p_hat * (1.0 - p_hat) / n_f).sqrt();
        ((p_hat - half_width).max(0.0), (p_hat + half_width).min(1.0))
    }

    /// Advice from the current totals and the observed revenue lift
    ///
    /// Below the minimum sample size the only possible advice is to
    /// continue collecting.
    pub fn advice(&self, revenue_lift: f64) -> Advice {
        if self.sample_size() < MIN_SAMPLE_SIZE {
            return Advice::Continue;
        }

        let rate = self.treatment_win_rate();
        let significance = self.significance();

        if rate >= PROMOTE_WIN_RATE
            && significance > DECISION_SIGNIFICANCE
            && revenue_lift > PROMOTE_REVENUE_LIFT
        {
            Advice::Promote
        } else if rate < ROLLBACK_WIN_RATE
            && significance > DECISION_SIGNIFICANCE
            && revenue_lift < ROLLBACK_REVENUE_LIFT
        {
            Advice::Rollback
        } else {
            Advice::Continue
        }
    }

    /// Restore totals from a snapshot
    pub fn import(&self, totals: ScorecardTotals) {
        *self
            .totals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = totals;
    }
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    // Abramowitz & Stegun 7.1.26, max absolute error 1.5e-7
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / 0.327_591_1_f64.mul_add(x, 1.0);
    let poly = t
        * 1.061_405_429_f64.mul_add(t, -1.453_152_027)
            .mul_add(t, 1.421_413_741)
            .mul_add(t, -0.284_496_736)
            .mul_add(t, 0.254_829_592);
    sign * (-x * x).exp().mul_add(-poly, 1.0)
}
