//! The active optimization loop (C8)
//!
//! Two cooperative periodic tasks, both bound to the orchestrator's
//! shutdown token: the optimization cycle refreshes recommendations,
//! applies the low-risk ones, and closes out decided experiments; the
//! allocation cycle recomputes and publishes traffic shares and runs the
//! rollback evaluation tick.

use std::time::Duration;

use arbiter_core::AuditEvent;
use arbiter_core::context::GLOBAL_KEY;

use crate::orchestrator::Orchestrator;

pub(crate) fn spawn(orchestrator: Orchestrator) {
    let optimization = orchestrator.clone();
    tokio::spawn(async move {
        let interval =
            Duration::from_secs(optimization.inner.config.orchestrator.loops.optimization_interval_secs);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would act on an empty table
        ticker.tick().await;

        loop {
            tokio::select! {
                () = optimization.inner.shutdown.cancelled() => break,
                _ = ticker.tick() => optimization.run_optimization_cycle().await,
            }
        }
        tracing::debug!("optimization cycle stopped");
    });

    let allocation = orchestrator;
    tokio::spawn(async move {
        let interval = Duration::from_secs(
            allocation
                .inner
                .config
                .orchestrator
                .loops
                .traffic_allocation_interval_secs,
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = allocation.inner.shutdown.cancelled() => break,
                _ = ticker.tick() => allocation.run_allocation_cycle(),
            }
        }
        tracing::debug!("allocation cycle stopped");
    });
}

impl Orchestrator {
    /// One optimization cycle: recommendations, auto-tuning, experiment
    /// lifecycle
    pub async fn run_optimization_cycle(&self) {
        self.inner.optimizer.maybe_decay_exploration();

        // Experiment proposals only make sense when a manager is wired and
        // auto-experiments are on
        let experiments_available = self.inner.collaborators.experiments.is_some()
            && self.inner.config.experiments.auto_experiment_enabled;
        let recommendations = self.inner.optimizer.recommendations(experiments_available);
        for recommendation in &recommendations {
            tracing::info!(
                kind = %recommendation.kind,
                priority = %recommendation.priority,
                context = ?recommendation.context,
                detail = %recommendation.detail,
                "optimizer recommendation"
            );
        }
        #[allow(clippy::cast_precision_loss)]
        self.metric(
            "optimizer.recommendations",
            recommendations.len() as f64,
            &[],
        );

        if self.inner.config.orchestrator.loops.auto_apply_recommendations {
            self.inner.optimizer.apply_auto_tuning(&recommendations);
        }

        if let Some(experiments) = &self.inner.collaborators.experiments {
            if self.inner.config.experiments.auto_stop {
                let threshold = self.inner.config.experiments.significance_threshold;
                match experiments.list_active().await {
                    Ok(active) => {
                        for name in active {
                            match experiments.analyze(&name).await {
                                Ok(analysis) if analysis.confidence > threshold => {
                                    tracing::info!(
                                        experiment = %name,
                                        winner = ?analysis.winner,
                                        confidence = analysis.confidence,
                                        "stopping decided experiment"
                                    );
                                    if let Err(e) =
                                        experiments.stop(&name, "reached significance").await
                                    {
                                        tracing::warn!(experiment = %name, error = %e, "failed to stop experiment");
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::warn!(experiment = %name, error = %e, "experiment analysis failed");
                                }
                            }
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "could not list active experiments"),
                }
            }
        }
    }

    /// One allocation cycle: publish new traffic shares, then run the
    /// rollback evaluation tick
    pub fn run_allocation_cycle(&self) {
        let stats = self.inner.optimizer.bandit().table().snapshot(GLOBAL_KEY);
        let published = self.inner.allocation.retick(&stats);

        let shares: Vec<_> = published
            .shares()
            .iter()
            .map(|(&arm, &share)| (arm, share))
            .collect();
        self.audit(AuditEvent::AllocationPublished { shares });
        for (arm, share) in published.shares() {
            self.metric("traffic.share", *share, &[("arm", arm.as_str())]);
        }

        self.evaluate_rollback();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbiter_config::Config;
    use arbiter_core::{
        Arm, ProbeResult, ProviderClient, ProviderReply, RouteError, RoutePath, RouteRequest,
    };
    use async_trait::async_trait;

    use crate::orchestrator::Collaborators;

    use super::*;

    struct NullProvider;

    #[async_trait]
    impl ProviderClient for NullProvider {
        async fn execute(
            &self,
            _arm: Arm,
            _path: RoutePath,
            _request: &RouteRequest,
        ) -> Result<ProviderReply, RouteError> {
            Ok(ProviderReply {
                text: "ok".to_owned(),
                model_ref: "m".to_owned(),
                cost_eur: 0.01,
            })
        }

        async fn health_check(&self, _arm: Arm) -> Result<ProbeResult, RouteError> {
            Ok(ProbeResult {
                ok: true,
                latency_ms: 1.0,
            })
        }
    }

    fn orchestrator() -> Orchestrator {
        let mut config = Config::default();
        config.orchestrator.rng_seed = Some(9);
        Orchestrator::init(config, Collaborators::new(Arc::new(NullProvider))).unwrap()
    }

    #[tokio::test]
    async fn allocation_cycle_publishes_audit_event() {
        let o = orchestrator();
        for _ in 0..30 {
            o.inner
                .optimizer
                .bandit()
                .record(Arm::OpenAi, true, 0.01, 200.0, None);
        }
        o.run_allocation_cycle();

        let events = o.event_history();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, AuditEvent::AllocationPublished { .. }))
        );
    }

    #[tokio::test]
    async fn optimization_cycle_runs_without_experiments() {
        let o = orchestrator();
        // Must not panic or hang with no experiment manager wired
        o.run_optimization_cycle().await;
    }
}
