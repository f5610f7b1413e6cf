//! Outcome records fed back into the learning components

use serde::{Deserialize, Serialize};

use crate::arm::Arm;

/// The observed result of one provider call
///
/// Partial outcomes are recorded too: a timed-out call carries the latency
/// measured up to cancellation with `success = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request_id: String,
    pub arm: Arm,
    pub success: bool,
    pub latency_ms: f64,
    pub cost_eur: f64,
    /// Graded answer quality in `[0, 1]`, when available
    #[serde(default)]
    pub quality_score: Option<f64>,
    /// Explicit user rating in `[1, 5]`, when available
    #[serde(default)]
    pub user_rating: Option<u8>,
}

impl RequestOutcome {
    pub fn new(request_id: impl Into<String>, arm: Arm, success: bool) -> Self {
        Self {
            request_id: request_id.into(),
            arm,
            success,
            latency_ms: 0.0,
            cost_eur: 0.0,
            quality_score: None,
            user_rating: None,
        }
    }
}
