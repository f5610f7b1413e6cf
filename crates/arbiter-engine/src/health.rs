//! Background breaker recovery probing
//!
//! Every interval, each Open arm gets one health probe against the
//! provider; a healthy reply moves the breaker to HalfOpen ahead of its
//! recovery deadline. Probes run sequentially, so at most one is in
//! flight per arm.

use std::time::Duration;

use arbiter_breaker::CircuitState;
use arbiter_core::{Arm, AuditEvent};

use crate::orchestrator::Orchestrator;

pub(crate) fn spawn(orchestrator: Orchestrator) {
    tokio::spawn(async move {
        let interval =
            Duration::from_secs(orchestrator.inner.config.breaker.health_check_interval_secs);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = orchestrator.inner.shutdown.cancelled() => break,
                _ = ticker.tick() => orchestrator.probe_open_arms().await,
            }
        }
        tracing::debug!("health probe stopped");
    });
}

impl Orchestrator {
    /// Probe every Open arm once
    pub(crate) async fn probe_open_arms(&self) {
        for arm in Arm::ALL {
            if self.inner.breaker.state(arm) != CircuitState::Open {
                continue;
            }

            match self.inner.collaborators.provider.health_check(arm).await {
                Ok(probe) if probe.ok => {
                    tracing::info!(arm = %arm, latency_ms = probe.latency_ms, "health probe succeeded");
                    if let Some(transition) = self.inner.breaker.probe_success(arm) {
                        self.audit(AuditEvent::BreakerTransition {
                            arm,
                            from_state: transition.from.to_string(),
                            to_state: transition.to.to_string(),
                        });
                    }
                }
                Ok(_) => {
                    tracing::debug!(arm = %arm, "health probe reported unhealthy");
                }
                Err(e) => {
                    tracing::debug!(arm = %arm, error = %e, "health probe failed");
                }
            }
        }
    }
}
