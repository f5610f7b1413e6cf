//! Versioned runtime snapshot export/import
//!
//! Captures every piece of learned in-process state so a restore lands in
//! an equivalent decision state. The snapshot is opaque to callers; the
//! version field guards against shape drift.

use std::collections::HashMap;

use arbiter_bandit::ArmStats;
use arbiter_breaker::BreakerSnapshot;
use arbiter_core::{Arm, AuditEvent, RouteError};
use arbiter_deploy::{CanarySample, DeploymentMode};
use arbiter_deploy::winrate::ScorecardTotals;
use arbiter_routing::{RouteProfile, TrafficAllocation};
use serde::{Deserialize, Serialize};

use crate::orchestrator::Orchestrator;

/// Current snapshot shape version
const SNAPSHOT_VERSION: u32 = 1;

/// Everything the control plane has learned, serializable
#[derive(Debug, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub version: u32,
    pub arm_stats: HashMap<String, HashMap<Arm, ArmStats>>,
    pub route_profiles: HashMap<Arm, RouteProfile>,
    pub breaker_states: HashMap<Arm, BreakerSnapshot>,
    pub traffic_allocation: TrafficAllocation,
    pub deployment_mode: DeploymentMode,
    pub canary_samples: Vec<CanarySample>,
    pub scorecard: ScorecardTotals,
    pub event_history: Vec<AuditEvent>,
}

impl Orchestrator {
    /// Export the runtime state
    pub fn export_snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            version: SNAPSHOT_VERSION,
            arm_stats: self.inner.optimizer.bandit().table().export(),
            route_profiles: self.inner.cost.export(),
            breaker_states: self.inner.breaker.export(),
            traffic_allocation: (*self.inner.allocation.current()).clone(),
            deployment_mode: self.inner.deployment.mode(),
            canary_samples: self.inner.deployment.export_samples(),
            scorecard: self.inner.scorecard.totals(),
            event_history: self.event_history(),
        }
    }

    /// Restore runtime state from a snapshot
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Config`] when the snapshot version does not
    /// match this build.
    pub fn import_snapshot(&self, snapshot: RuntimeSnapshot) -> Result<(), RouteError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RouteError::Config(format!(
                "snapshot version {} does not match expected {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }

        self.inner.optimizer.bandit().table().import(snapshot.arm_stats);
        self.inner.cost.import(snapshot.route_profiles);
        self.inner.breaker.import(&snapshot.breaker_states);
        self.inner.allocation.import(snapshot.traffic_allocation);
        self.inner.deployment.set_mode(snapshot.deployment_mode);
        self.inner.deployment.import_samples(snapshot.canary_samples);
        self.inner.scorecard.import(snapshot.scorecard);

        tracing::info!("runtime snapshot imported");
        Ok(())
    }
}
