//! Response types produced by the intelligent router

use serde::{Deserialize, Serialize};

use crate::arm::{Arm, TaskType};

/// Which layer of the decision pipeline chose the arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DecisionSource {
    /// Assigned by an active experiment
    Experiment,
    /// Bandit optimizer selection
    Bandit,
    /// Sampled from the traffic allocation
    Traffic,
    /// Cost optimizer override
    Cost,
    /// Deterministic default (no other layer decided)
    Default,
}

/// Decision metadata attached to every response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// True when the guardrail redirected the request away from the
    /// intended arm
    #[serde(default)]
    pub delegated: bool,
    /// The arm originally intended, when delegated
    #[serde(default)]
    pub original_arm: Option<Arm>,
    /// Task role the guardrail classified the request into
    #[serde(default)]
    pub role: Option<TaskType>,
    pub source: DecisionSource,
    pub confidence: f64,
}

impl Default for ResponseMetadata {
    fn default() -> Self {
        Self {
            delegated: false,
            original_arm: None,
            role: None,
            source: DecisionSource::Default,
            confidence: 0.5,
        }
    }
}

/// One completed routing attempt, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub request_id: String,
    pub arm: Arm,
    pub model_ref: String,
    #[serde(default)]
    pub text: Option<String>,
    pub latency_ms: f64,
    pub cost_eur: f64,
    pub success: bool,
    /// Stable error code when `success` is false
    #[serde(default)]
    pub error: Option<String>,
    pub metadata: ResponseMetadata,
}

impl RouteResponse {
    /// Build a failed response carrying the stable error code of `error`
    /// and the cumulative latency spent so far
    pub fn failure(
        request_id: impl Into<String>,
        arm: Arm,
        latency_ms: f64,
        code: &str,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            arm,
            model_ref: String::new(),
            text: None,
            latency_ms,
            cost_eur: 0.0,
            success: false,
            error: Some(code.to_owned()),
            metadata,
        }
    }
}
