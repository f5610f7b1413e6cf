//! The deployment controller
//!
//! Owns the mode cache, rolls the canary coin, keeps the bounded canary
//! sample window, and builds shadow comparisons. Shadow-side failures are
//! contained here: they surface only inside the comparison record, never
//! in the primary response or any arm's failure counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use arbiter_config::DeploymentConfig;
use arbiter_core::{RouteError, RouteResponse};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::mode::{DeploymentMode, RouteDirective};

/// One canary observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanarySample {
    pub success: bool,
    pub latency_ms: f64,
    pub cost_eur: f64,
}

/// Aggregates over the canary sample window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanaryMetrics {
    pub avg_error_rate: f64,
    pub p95_latency_ms: f64,
    pub avg_cost_eur: f64,
    pub samples: usize,
}

/// Latency/cost/content comparison of a shadow pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowComparison {
    pub latency_delta_ms: f64,
    pub cost_delta_eur: f64,
    /// Jaccard similarity over whitespace tokens, in `[0, 1]`
    pub content_similarity: f64,
    pub errors: Vec<String>,
}

/// Per-request deployment gating (C9)
pub struct DeploymentController {
    mode: RwLock<DeploymentMode>,
    samples: Mutex<VecDeque<CanarySample>>,
    canary_requests: AtomicU64,
    config: DeploymentConfig,
    rng: Mutex<StdRng>,
}

impl DeploymentController {
    pub fn new(config: DeploymentConfig, seed: Option<u64>) -> Self {
        Self {
            mode: RwLock::new(DeploymentMode::from_config(&config)),
            samples: Mutex::new(VecDeque::new()),
            canary_requests: AtomicU64::new(0),
            config,
            rng: Mutex::new(seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)),
        }
    }

    /// The cached deployment mode
    pub fn mode(&self) -> DeploymentMode {
        *self
            .mode
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace the cached mode, as when a flag snapshot changes it
    pub fn set_mode(&self, mode: DeploymentMode) {
        let mut slot = self
            .mode
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *slot != mode {
            tracing::info!(from = slot.name(), to = mode.name(), "deployment mode changed");
        }
        *slot = mode;
    }

    /// The configured canary percentage, for ladder walking
    pub fn configured_canary_percentage(&self) -> f64 {
        self.config.canary_percentage
    }

    /// Gate one request
    pub fn decide(&self) -> RouteDirective {
        match self.mode() {
            DeploymentMode::Dark => RouteDirective::SyntheticFallback,
            DeploymentMode::Shadow => RouteDirective::ShadowPair,
            DeploymentMode::Canary { percentage } => {
                let roll = {
                    let mut rng = self
                        .rng
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    rng.random::<f64>() * 100.0
                };
                if roll < percentage {
                    RouteDirective::NewPipeline
                } else {
                    RouteDirective::Primary
                }
            }
            DeploymentMode::Active => RouteDirective::NewPipeline,
        }
    }

    /// Record one canary observation
    ///
    /// Returns true when the rollback evaluation cadence is due.
    pub fn record_canary(&self, sample: CanarySample) -> bool {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if samples.len() >= self.config.sample_window {
            samples.pop_front();
        }
        samples.push_back(sample);
        drop(samples);

        let seen = self.canary_requests.fetch_add(1, Ordering::Relaxed) + 1;
        self.config.evaluate_every > 0 && seen % self.config.evaluate_every == 0
    }

    /// Aggregates over the current sample window
    pub fn canary_metrics(&self) -> Option<CanaryMetrics> {
        let samples = self
            .samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if samples.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = samples.len() as f64;
        let errors = samples.iter().filter(|s| !s.success).count();
        let avg_cost = samples.iter().map(|s| s.cost_eur).sum::<f64>() / n;

        let mut latencies: Vec<f64> = samples.iter().map(|s| s.latency_ms).collect();
        latencies.sort_by(f64::total_cmp);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let p95_index = ((0.95 * (latencies.len() - 1) as f64).round() as usize)
            .min(latencies.len() - 1);

        #[allow(clippy::cast_precision_loss)]
        Some(CanaryMetrics {
            avg_error_rate: errors as f64 / n,
            p95_latency_ms: latencies[p95_index],
            avg_cost_eur: avg_cost,
            samples: samples.len(),
        })
    }

    /// Export the canary window for the runtime snapshot
    pub fn export_samples(&self) -> Vec<CanarySample> {
        self.samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Restore the canary window from a snapshot
    pub fn import_samples(&self, imported: Vec<CanarySample>) {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        samples.clear();
        for sample in imported.into_iter().take(self.config.sample_window) {
            samples.push_back(sample);
        }
    }

    /// Build the comparison record for a shadow pair
    ///
    /// The shadow result may be an error; it lands in `errors` and goes no
    /// further.
    pub fn compare_shadow(
        primary: &RouteResponse,
        shadow: &Result<RouteResponse, RouteError>,
    ) -> ShadowComparison {
        match shadow {
            Ok(shadow_response) => ShadowComparison {
                latency_delta_ms: shadow_response.latency_ms - primary.latency_ms,
                cost_delta_eur: shadow_response.cost_eur - primary.cost_eur,
                content_similarity: jaccard_similarity(
                    primary.text.as_deref().unwrap_or(""),
                    shadow_response.text.as_deref().unwrap_or(""),
                ),
                errors: Vec::new(),
            },
            Err(e) => ShadowComparison {
                latency_delta_ms: 0.0,
                cost_delta_eur: 0.0,
                content_similarity: 0.0,
                errors: vec!["shadow_failed".to_owned(), e.code().to_owned()],
            },
        }
    }
}

/// Jaccard similarity over whitespace-tokenized text
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}
