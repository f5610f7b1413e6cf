//! The owning root of the control plane
//!
//! One `Orchestrator` owns every component; collaborators arrive as
//! non-owning handles at init. There is no other mutable global state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use arbiter_bandit::BanditOptimizer;
use arbiter_breaker::CircuitBreaker;
use arbiter_config::Config;
use arbiter_core::{
    Arm, AuditEvent, AuditSink, ComplianceChecker, ExperimentManager, FlagSource, MetricsSink,
    NoopSink, ProviderClient, RouteError, SafetyChecker,
};
use arbiter_deploy::{
    Advice, ComparisonResult, DeploymentController, ExperimentScorecard, LengthHeuristic,
    PairedSample, QualityScorer, RollbackManager, compare,
};
use arbiter_guardrails::Guardrail;
use arbiter_routing::{AllocationEngine, CostTracker};
use tokio_util::sync::CancellationToken;

/// External seams handed to [`Orchestrator::init`]
///
/// Only the provider client is mandatory; every other collaborator is
/// optional and its absence degrades gracefully.
pub struct Collaborators {
    pub provider: Arc<dyn ProviderClient>,
    pub experiments: Option<Arc<dyn ExperimentManager>>,
    pub flags: Option<Arc<dyn FlagSource>>,
    pub compliance: Option<Arc<dyn ComplianceChecker>>,
    pub safety: Option<Arc<dyn SafetyChecker>>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<dyn MetricsSink>,
    pub quality: Arc<dyn QualityScorer>,
}

impl Collaborators {
    /// Provider only; everything else absent or no-op
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            experiments: None,
            flags: None,
            compliance: None,
            safety: None,
            audit: Arc::new(NoopSink),
            metrics: Arc::new(NoopSink),
            quality: Arc::new(LengthHeuristic),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) optimizer: BanditOptimizer,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) cost: CostTracker,
    pub(crate) guardrail: Guardrail,
    pub(crate) allocation: AllocationEngine,
    pub(crate) deployment: DeploymentController,
    pub(crate) rollback: RollbackManager,
    pub(crate) scorecard: ExperimentScorecard,
    pub(crate) collaborators: Collaborators,
    pub(crate) events: Mutex<VecDeque<AuditEvent>>,
    pub(crate) shutdown: CancellationToken,
}

/// The running control plane
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build the orchestrator from configuration and collaborators
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Config`] on an invalid configuration; this is
    /// the only fatal error path and fires at startup only.
    pub fn init(config: Config, collaborators: Collaborators) -> Result<Self, RouteError> {
        validate(&config)?;

        let seed = config.orchestrator.rng_seed;
        // Derive distinct streams per randomness consumer from one seed
        let optimizer = BanditOptimizer::new(config.bandit.clone(), seed);
        let allocation = AllocationEngine::new(config.traffic.clone(), seed.map(|s| s ^ 0x5eed));
        let deployment =
            DeploymentController::new(config.deployment.clone(), seed.map(|s| s ^ 0xc01));
        let breaker = CircuitBreaker::new(config.breaker.clone());
        let cost = CostTracker::new(config.cost.target_cost_reduction);
        let guardrail = Guardrail::new(config.guardrails.clone());
        let rollback = RollbackManager::new(config.deployment.clone());

        tracing::info!(
            region = %config.orchestrator.region,
            project = %config.orchestrator.project_name,
            "orchestrator initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                optimizer,
                breaker,
                cost,
                guardrail,
                allocation,
                deployment,
                rollback,
                scorecard: ExperimentScorecard::new(),
                collaborators,
                events: Mutex::new(VecDeque::new()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Start the background tasks: the optimization and allocation cycles
    /// and the breaker health probe
    pub fn start(&self) {
        crate::active::spawn(self.clone());
        crate::health::spawn(self.clone());
    }

    /// Signal every background task to stop
    pub fn shutdown(&self) {
        tracing::info!("orchestrator shutting down");
        self.inner.shutdown.cancel();
    }

    /// The guardrail's violation ring, for introspection
    pub fn violations(&self) -> Vec<arbiter_guardrails::Violation> {
        self.inner.guardrail.violations()
    }

    /// Rollback history, for introspection
    pub fn rollback_history(&self) -> Vec<arbiter_deploy::RollbackEvent> {
        self.inner.rollback.history()
    }

    /// The current deployment mode
    pub fn deployment_mode(&self) -> arbiter_deploy::DeploymentMode {
        self.inner.deployment.mode()
    }

    /// The bandit optimizer, for stats introspection
    pub fn optimizer(&self) -> &BanditOptimizer {
        &self.inner.optimizer
    }

    /// The circuit breaker, for state introspection
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// The cost tracker, for reduction introspection
    pub fn cost_tracker(&self) -> &CostTracker {
        &self.inner.cost
    }

    /// The currently published traffic allocation snapshot
    pub fn traffic_allocation(&self) -> Arc<arbiter_routing::TrafficAllocation> {
        self.inner.allocation.current()
    }

    /// The win-rate scorecard for the running experiment
    pub fn scorecard(&self) -> &ExperimentScorecard {
        &self.inner.scorecard
    }

    /// Score one control/treatment pair and fold it into the scorecard
    pub fn record_paired_comparison(&self, pair: &PairedSample) -> ComparisonResult {
        let result = compare(pair, self.inner.collaborators.quality.as_ref());
        self.inner.scorecard.record(&result);
        result
    }

    /// Promote/rollback advice from the current scorecard
    pub fn experiment_advice(&self, revenue_lift: f64) -> Advice {
        self.inner.scorecard.advice(revenue_lift)
    }

    /// Emit an audit event to the sink and the bounded in-process ring
    pub(crate) fn audit(&self, event: AuditEvent) {
        let mut ring = self
            .inner
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if ring.len() >= self.inner.config.orchestrator.event_history_size {
            ring.pop_front();
        }
        ring.push_back(event.clone());
        drop(ring);

        self.inner.collaborators.audit.emit(event);
    }

    /// Snapshot of the in-process event ring, oldest first
    pub fn event_history(&self) -> Vec<AuditEvent> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn metric(&self, name: &str, value: f64, dimensions: &[(&str, &str)]) {
        self.inner.collaborators.metrics.record(name, value, dimensions);
    }
}

fn validate(config: &Config) -> Result<(), RouteError> {
    if config.breaker.failure_threshold == 0 {
        return Err(RouteError::Config(
            "breaker.failure_threshold must be at least 1".to_owned(),
        ));
    }
    #[allow(clippy::cast_precision_loss)]
    if config.traffic.min_share * Arm::ALL.len() as f64 >= 1.0 {
        return Err(RouteError::Config(
            "traffic.min_share leaves no share to allocate".to_owned(),
        ));
    }
    if !(0.0..=1.0).contains(&config.traffic.smoothing) {
        return Err(RouteError::Config(
            "traffic.smoothing must lie in [0, 1]".to_owned(),
        ));
    }
    if !(0.0..=100.0).contains(&config.deployment.canary_percentage) {
        return Err(RouteError::Config(
            "deployment.canary_percentage must lie in [0, 100]".to_owned(),
        ));
    }
    if config.cost.weight_cost < 0.0
        || config.cost.weight_perf < 0.0
        || config.cost.weight_latency < 0.0
    {
        return Err(RouteError::Config(
            "cost weights must be non-negative".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::{ProbeResult, ProviderReply, RoutePath, RouteRequest};
    use async_trait::async_trait;

    struct NullProvider;

    #[async_trait]
    impl ProviderClient for NullProvider {
        async fn execute(
            &self,
            arm: Arm,
            _path: RoutePath,
            _request: &RouteRequest,
        ) -> Result<ProviderReply, RouteError> {
            Ok(ProviderReply {
                text: "ok".to_owned(),
                model_ref: format!("{arm}-model"),
                cost_eur: 0.01,
            })
        }

        async fn health_check(&self, _arm: Arm) -> Result<ProbeResult, RouteError> {
            Ok(ProbeResult {
                ok: true,
                latency_ms: 5.0,
            })
        }
    }

    #[test]
    fn init_accepts_defaults() {
        let orchestrator =
            Orchestrator::init(Config::default(), Collaborators::new(Arc::new(NullProvider)));
        assert!(orchestrator.is_ok());
    }

    #[test]
    fn init_rejects_bad_config() {
        let mut config = Config::default();
        config.traffic.min_share = 0.5;
        let result = Orchestrator::init(config, Collaborators::new(Arc::new(NullProvider)));
        assert!(matches!(result, Err(RouteError::Config(_))));

        let mut config = Config::default();
        config.breaker.failure_threshold = 0;
        let result = Orchestrator::init(config, Collaborators::new(Arc::new(NullProvider)));
        assert!(matches!(result, Err(RouteError::Config(_))));
    }

    #[test]
    fn event_ring_is_bounded() {
        let mut config = Config::default();
        config.orchestrator.event_history_size = 3;
        let orchestrator =
            Orchestrator::init(config, Collaborators::new(Arc::new(NullProvider))).unwrap();

        for i in 0..10 {
            orchestrator.audit(AuditEvent::DecisionMade {
                request_id: format!("r{i}"),
                arm: Arm::OpenAi,
                source: arbiter_core::DecisionSource::Bandit,
                confidence: 0.5,
            });
        }
        assert_eq!(orchestrator.event_history().len(), 3);
    }
}
