//! Inbound request types and SLA timeout resolution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arm::Arm;

/// Request priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// The operation class a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Standard,
    Emergency,
    Infrastructure,
    Implementation,
    MetaMonitor,
}

impl OperationKind {
    /// Per-call SLA timeout for this operation class
    ///
    /// Exceeding the timeout is a failure recorded against the attempted arm.
    pub const fn sla_timeout(self) -> Duration {
        match self {
            Self::Emergency => Duration::from_secs(5),
            Self::Infrastructure | Self::MetaMonitor => Duration::from_secs(10),
            Self::Implementation => Duration::from_secs(15),
            Self::Standard => Duration::from_secs(30),
        }
    }
}

/// Caller-supplied request context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestContext {
    pub domain: Option<String>,
    pub intent: Option<String>,
    pub budget_tier: Option<String>,
    pub sla_ms: Option<u64>,
    pub preferred_arm: Option<Arm>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub pii_expected: Option<bool>,
}

/// A tool the provider may call while answering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub param_schema: serde_json::Value,
}

/// One inference request entering the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub priority: Priority,
    pub operation: OperationKind,
}

impl RouteRequest {
    /// Build a standard-priority request with a fresh id
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            context: RequestContext::default(),
            tools: Vec::new(),
            priority: Priority::Medium,
            operation: OperationKind::Standard,
        }
    }

    /// Whether this request bypasses cost optimization and takes the
    /// direct path
    pub fn is_emergency(&self) -> bool {
        self.priority == Priority::Critical || self.operation == OperationKind::Emergency
    }

    /// Effective per-call timeout: the caller SLA when tighter than the
    /// operation-class default
    pub fn timeout(&self) -> Duration {
        let sla = self.operation.sla_timeout();
        match self.context.sla_ms {
            Some(ms) if u128::from(ms) < sla.as_millis() => Duration::from_millis(ms),
            _ => sla,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sla_table() {
        assert_eq!(OperationKind::Emergency.sla_timeout(), Duration::from_secs(5));
        assert_eq!(OperationKind::Infrastructure.sla_timeout(), Duration::from_secs(10));
        assert_eq!(OperationKind::MetaMonitor.sla_timeout(), Duration::from_secs(10));
        assert_eq!(OperationKind::Implementation.sla_timeout(), Duration::from_secs(15));
        assert_eq!(OperationKind::Standard.sla_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn caller_sla_tightens_timeout() {
        let mut request = RouteRequest::new("hello");
        request.context.sla_ms = Some(1_000);
        assert_eq!(request.timeout(), Duration::from_millis(1_000));

        // A looser caller SLA never extends the class default
        request.context.sla_ms = Some(120_000);
        assert_eq!(request.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn critical_priority_is_emergency() {
        let mut request = RouteRequest::new("x");
        request.priority = Priority::Critical;
        assert!(request.is_emergency());

        let mut request = RouteRequest::new("x");
        request.operation = OperationKind::Emergency;
        assert!(request.is_emergency());
    }
}
