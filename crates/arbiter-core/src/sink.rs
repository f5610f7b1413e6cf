//! Audit and metrics seams
//!
//! Emissions are best-effort relative to the hot path: sinks must not
//! block, and sink failures never affect routing.

use serde::{Deserialize, Serialize};

use crate::arm::Arm;
use crate::response::DecisionSource;

/// Structured events emitted by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    DecisionMade {
        request_id: String,
        arm: Arm,
        source: DecisionSource,
        confidence: f64,
    },
    FallbackHop {
        request_id: String,
        from_arm: Arm,
        to_arm: Arm,
        error_code: String,
    },
    ViolationRecorded {
        violation_id: String,
        attempted_arm: Arm,
        redirected_to: Option<Arm>,
    },
    BreakerTransition {
        arm: Arm,
        from_state: String,
        to_state: String,
    },
    AllocationPublished {
        shares: Vec<(Arm, f64)>,
    },
    RollbackTriggered {
        rollback_id: String,
        emergency: bool,
        reason: String,
    },
    ShadowComparison {
        request_id: String,
        latency_delta_ms: f64,
        cost_delta_eur: f64,
        similarity: f64,
        errors: Vec<String>,
    },
}

/// Append-only audit event emitter, at-least-once, buffered externally
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Named numeric series with dimensions
pub trait MetricsSink: Send + Sync {
    fn record(&self, name: &str, value: f64, dimensions: &[(&str, &str)]);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl AuditSink for NoopSink {
    fn emit(&self, _event: AuditEvent) {}
}

impl MetricsSink for NoopSink {
    fn record(&self, _name: &str, _value: f64, _dimensions: &[(&str, &str)]) {}
}

/// Sink that forwards everything to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(event = ?event, "audit event");
    }
}

impl MetricsSink for TracingSink {
    fn record(&self, name: &str, value: f64, dimensions: &[(&str, &str)]) {
        tracing::debug!(metric = name, value, ?dimensions, "metric");
    }
}
