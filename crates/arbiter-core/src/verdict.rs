//! Compliance and content safety seams
//!
//! Both checks run outside the core; the router only consults the verdict.
//! Collaborator errors are non-fatal and routing proceeds.

use async_trait::async_trait;

use crate::arm::Arm;
use crate::request::{OperationKind, Priority};

/// Violation severity shared by both verdict kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The routing decision submitted for compliance validation
#[derive(Debug, Clone)]
pub struct RoutingPathCheck {
    pub route_type: crate::arm::RoutePath,
    pub arm: Arm,
    pub operation: OperationKind,
    pub priority: Priority,
}

/// A single compliance violation
#[derive(Debug, Clone)]
pub struct ComplianceViolation {
    pub rule: String,
    pub severity: Severity,
    pub detail: String,
}

/// Verdict returned by the compliance collaborator
#[derive(Debug, Clone)]
pub struct ComplianceVerdict {
    pub compliant: bool,
    /// Compliance score in `[0, 100]`
    pub score: f64,
    pub violations: Vec<ComplianceViolation>,
}

impl ComplianceVerdict {
    /// Routing is blocked only when non-compliant with critical violations
    pub fn blocks_routing(&self) -> bool {
        !self.compliant
            && self
                .violations
                .iter()
                .any(|v| v.severity == Severity::Critical)
    }
}

/// External compliance validator
#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    async fn validate_routing_path(
        &self,
        check: &RoutingPathCheck,
        correlation_id: &str,
    ) -> Result<ComplianceVerdict, String>;
}

/// Category of a content safety violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolationKind {
    Pii,
    Toxicity,
    Other(String),
}

/// A single content safety violation
#[derive(Debug, Clone)]
pub struct SafetyViolation {
    pub kind: SafetyViolationKind,
    pub severity: Severity,
    pub confidence: f64,
}

/// Verdict returned by the content safety collaborator
#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub allowed: bool,
    pub violations: Vec<SafetyViolation>,
}

/// External content safety checker
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    async fn check_content(&self, prompt: &str, channel: &str) -> Result<SafetyVerdict, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_critical_violations_block() {
        let verdict = ComplianceVerdict {
            compliant: false,
            score: 40.0,
            violations: vec![ComplianceViolation {
                rule: "region".to_owned(),
                severity: Severity::Medium,
                detail: String::new(),
            }],
        };
        assert!(!verdict.blocks_routing());

        let verdict = ComplianceVerdict {
            compliant: false,
            score: 10.0,
            violations: vec![ComplianceViolation {
                rule: "data-residency".to_owned(),
                severity: Severity::Critical,
                detail: String::new(),
            }],
        };
        assert!(verdict.blocks_routing());
    }

    #[test]
    fn compliant_verdict_never_blocks() {
        let verdict = ComplianceVerdict {
            compliant: true,
            score: 100.0,
            violations: vec![ComplianceViolation {
                rule: "audit".to_owned(),
                severity: Severity::Critical,
                detail: String::new(),
            }],
        };
        assert!(!verdict.blocks_routing());
    }
}
