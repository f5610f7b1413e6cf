//! Shared test harness: a scripted provider and a collecting audit sink

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbiter_core::{
    Arm, AuditEvent, AuditSink, MetricsSink, ProbeResult, ProviderClient, ProviderReply,
    RouteError, RoutePath, RouteRequest,
};
use async_trait::async_trait;

/// Scripted behavior for one arm
#[derive(Debug, Clone)]
pub struct ArmScript {
    pub text: String,
    pub latency: Duration,
    pub cost_eur: f64,
    pub failing: bool,
    pub healthy: bool,
}

impl Default for ArmScript {
    fn default() -> Self {
        Self {
            text: "scripted reply".to_owned(),
            latency: Duration::from_millis(5),
            cost_eur: 0.01,
            failing: false,
            healthy: true,
        }
    }
}

struct ArmState {
    script: Mutex<ArmScript>,
    calls: AtomicU64,
    last_path: Mutex<Option<RoutePath>>,
}

/// Provider client with per-arm scripted replies and failure injection
pub struct ScriptedProvider {
    arms: HashMap<Arm, ArmState>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        let arms = Arm::ALL
            .into_iter()
            .map(|arm| {
                (
                    arm,
                    ArmState {
                        script: Mutex::new(ArmScript::default()),
                        calls: AtomicU64::new(0),
                        last_path: Mutex::new(None),
                    },
                )
            })
            .collect();
        Arc::new(Self { arms })
    }

    pub fn script(&self, arm: Arm, script: ArmScript) {
        *self.arms[&arm].script.lock().unwrap() = script;
    }

    pub fn set_failing(&self, arm: Arm, failing: bool) {
        self.arms[&arm].script.lock().unwrap().failing = failing;
    }

    pub fn calls(&self, arm: Arm) -> u64 {
        self.arms[&arm].calls.load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u64 {
        Arm::ALL.into_iter().map(|arm| self.calls(arm)).sum()
    }

    pub fn last_path(&self, arm: Arm) -> Option<RoutePath> {
        *self.arms[&arm].last_path.lock().unwrap()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn execute(
        &self,
        arm: Arm,
        path: RoutePath,
        _request: &RouteRequest,
    ) -> Result<ProviderReply, RouteError> {
        let state = &self.arms[&arm];
        state.calls.fetch_add(1, Ordering::Relaxed);
        *state.last_path.lock().unwrap() = Some(path);

        let script = state.script.lock().unwrap().clone();
        tokio::time::sleep(script.latency).await;

        if script.failing {
            return Err(RouteError::Provider {
                arm,
                message: "scripted failure".to_owned(),
                transient: true,
            });
        }
        Ok(ProviderReply {
            text: script.text,
            model_ref: format!("{arm}-model"),
            cost_eur: script.cost_eur,
        })
    }

    async fn health_check(&self, arm: Arm) -> Result<ProbeResult, RouteError> {
        let healthy = self.arms[&arm].script.lock().unwrap().healthy;
        Ok(ProbeResult {
            ok: healthy,
            latency_ms: 1.0,
        })
    }
}

/// Audit sink that retains every event for assertions
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn shadow_comparisons(&self) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, AuditEvent::ShadowComparison { .. }))
            .collect()
    }
}

impl AuditSink for CollectingSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl MetricsSink for CollectingSink {
    fn record(&self, _name: &str, _value: f64, _dimensions: &[(&str, &str)]) {}
}
