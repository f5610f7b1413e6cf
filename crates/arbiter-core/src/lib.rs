//! Shared vocabulary for the Arbiter control plane
//!
//! Defines the arm set, request/response/outcome wire types, the routing
//! error taxonomy, and the collaborator seams (provider client, experiment
//! manager, feature flags, compliance/safety verdicts, audit and metrics
//! sinks) that the decision core talks to but does not implement.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod arm;
pub mod context;
pub mod error;
pub mod experiment;
pub mod flags;
pub mod outcome;
pub mod provider;
pub mod request;
pub mod response;
pub mod sink;
pub mod verdict;

pub use arm::{Arm, RoutePath, TaskType};
pub use context::BanditContext;
pub use error::RouteError;
pub use experiment::{ExperimentAnalysis, ExperimentAssignment, ExperimentManager};
pub use flags::{BanditMode, FlagSnapshot, FlagSource, StaticFlags};
pub use outcome::RequestOutcome;
pub use provider::{ProbeResult, ProviderClient, ProviderReply};
pub use request::{OperationKind, Priority, RequestContext, RouteRequest, ToolSpec};
pub use response::{DecisionSource, ResponseMetadata, RouteResponse};
pub use sink::{AuditEvent, AuditSink, MetricsSink, NoopSink, TracingSink};
pub use verdict::{
    ComplianceChecker, ComplianceVerdict, ComplianceViolation, RoutingPathCheck, SafetyChecker,
    SafetyVerdict, SafetyViolation, SafetyViolationKind, Severity,
};
