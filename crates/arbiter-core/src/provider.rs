//! The provider client seam
//!
//! Concrete SDK calls live outside the control plane. The router only
//! needs a cancellable execute and a health probe per arm.

use async_trait::async_trait;

use crate::arm::{Arm, RoutePath};
use crate::error::RouteError;
use crate::request::RouteRequest;

/// Payload returned by a provider on success
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub text: String,
    /// Concrete model identifier the provider resolved to
    pub model_ref: String,
    pub cost_eur: f64,
}

/// Result of a provider health probe
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency_ms: f64,
}

/// Outbound interface to the backend providers
///
/// Implementations must honor caller cancellation: when the router's
/// deadline fires, the in-flight future is dropped.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Execute a request on the given arm via the given path
    async fn execute(
        &self,
        arm: Arm,
        path: RoutePath,
        request: &RouteRequest,
    ) -> Result<ProviderReply, RouteError>;

    /// Probe the arm's health endpoint
    async fn health_check(&self, arm: Arm) -> Result<ProbeResult, RouteError>;
}
