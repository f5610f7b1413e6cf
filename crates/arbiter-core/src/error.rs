//! The routing error taxonomy
//!
//! Every failure surfaced to a caller or handled by fallback iteration is
//! one of these kinds. Codes are stable strings carried in failed responses.

use thiserror::Error;

use crate::arm::Arm;

/// Errors produced while deciding on or executing a route
#[derive(Debug, Error)]
pub enum RouteError {
    /// The provider call exceeded the per-request SLA timeout
    #[error("provider call on {arm} timed out after {timeout_ms} ms")]
    ProviderTimeout { arm: Arm, timeout_ms: u64 },

    /// The provider returned an error
    #[error("provider {arm} failed: {message}")]
    Provider {
        arm: Arm,
        message: String,
        /// Transient failures are retried on another arm
        transient: bool,
    },

    /// The arm's circuit breaker is open
    #[error("circuit breaker open for {0}")]
    BreakerOpen(Arm),

    /// The arm's breaker is half-open and its probe budget is spent
    #[error("circuit breaker half-open limit reached for {0}")]
    BreakerHalfOpenFull(Arm),

    /// The guardrail rejected the request with no permitted fallback
    #[error("guardrail blocked request: {reason}")]
    GuardrailBlocked { reason: String },

    /// The compliance verdict carried critical violations
    #[error("compliance check rejected routing: {reason}")]
    ComplianceBlocked { reason: String },

    /// The content safety verdict disallowed the prompt
    #[error("content safety check rejected request: {reason}")]
    SafetyBlocked { reason: String },

    /// The deployment is dark; no live traffic is dispatched
    #[error("deployment is dark")]
    DeploymentDark,

    /// Every permitted arm was attempted and failed
    #[error("all permitted arms failed")]
    AllArmsFailed,

    /// Invalid configuration, fatal at startup only
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RouteError {
    /// Stable error code, suitable for response payloads and metrics
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ProviderTimeout { .. } => "provider_timeout",
            Self::Provider { transient: true, .. } => "provider_transient",
            Self::Provider { transient: false, .. } => "provider_permanent",
            Self::BreakerOpen(_) => "breaker_open",
            Self::BreakerHalfOpenFull(_) => "breaker_half_open_full",
            Self::GuardrailBlocked { .. } => "guardrail_blocked",
            Self::ComplianceBlocked { .. } => "compliance_blocked",
            Self::SafetyBlocked { .. } => "safety_blocked",
            Self::DeploymentDark => "deployment_dark",
            Self::AllArmsFailed => "all_arms_failed",
            Self::Config(_) => "config_error",
        }
    }

    /// Whether the router may recover by falling back to another arm
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. }
                | Self::Provider { transient: true, .. }
                | Self::BreakerOpen(_)
                | Self::BreakerHalfOpenFull(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RouteError::BreakerOpen(Arm::Bedrock).is_retryable());
        assert!(
            RouteError::ProviderTimeout {
                arm: Arm::Gemini,
                timeout_ms: 5_000
            }
            .is_retryable()
        );
        assert!(
            !RouteError::Provider {
                arm: Arm::OpenAi,
                message: "bad request".to_owned(),
                transient: false,
            }
            .is_retryable()
        );
        assert!(!RouteError::AllArmsFailed.is_retryable());
        assert!(
            !RouteError::SafetyBlocked {
                reason: "pii".to_owned()
            }
            .is_retryable()
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(RouteError::DeploymentDark.code(), "deployment_dark");
        assert_eq!(RouteError::BreakerOpen(Arm::OpenAi).code(), "breaker_open");
        assert_eq!(
            RouteError::Provider {
                arm: Arm::OpenAi,
                message: String::new(),
                transient: true,
            }
            .code(),
            "provider_transient"
        );
    }
}
