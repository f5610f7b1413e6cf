//! The closed set of backend arms and routing paths

use serde::{Deserialize, Serialize};

/// A backend provider option selectable by the decision core
///
/// The reference configuration carries exactly three arms. The declaration
/// order is load-bearing: ties in arm selection break toward the earlier
/// variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Arm {
    /// Premium tier, reserved for system-role tasks by the guardrail
    Bedrock,
    /// General-purpose tier
    OpenAi,
    /// Budget tier
    Gemini,
}

impl Arm {
    /// All arms in tie-break order
    pub const ALL: [Self; 3] = [Self::Bedrock, Self::OpenAi, Self::Gemini];

    /// Stable lowercase name, used as a metrics dimension
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bedrock => "bedrock",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

/// Transport used to reach a provider
///
/// The direct path skips the mediation layer and is reserved for
/// low-latency critical traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoutePath {
    /// Direct provider call, no mediation
    Direct,
    /// Call through the mediation layer
    Mediated,
}

/// The task role a request is classified into by the guardrail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskType {
    /// Infrastructure, monitoring, and orchestration work
    System,
    /// End-user facing assistance
    User,
    /// Audience analysis and marketing work
    Audience,
}
