//! Cross-component laws the router must uphold

mod harness;

use std::sync::Arc;
use std::time::Duration;

use arbiter_config::Config;
use arbiter_core::{Arm, BanditContext, RouteRequest};
use arbiter_engine::{Collaborators, Orchestrator};

use harness::{ArmScript, CollectingSink, ScriptedProvider};

fn orchestrator_with(
    config: Config,
    provider: &Arc<ScriptedProvider>,
) -> Orchestrator {
    let sink = CollectingSink::new();
    let mut collaborators =
        Collaborators::new(Arc::clone(provider) as Arc<dyn arbiter_core::ProviderClient>);
    collaborators.audit = sink as Arc<dyn arbiter_core::AuditSink>;
    Orchestrator::init(config, collaborators).unwrap()
}

#[tokio::test]
async fn fallback_makes_at_most_one_call_per_permitted_arm() {
    let provider = ScriptedProvider::new();
    for arm in Arm::ALL {
        provider.set_failing(arm, true);
    }

    let mut config = Config::default();
    config.orchestrator.rng_seed = Some(2);
    let orchestrator = orchestrator_with(config, &provider);

    // A system task permits all three arms
    let mut request = RouteRequest::new("deploy the billing pipeline");
    request.operation = arbiter_core::OperationKind::Infrastructure;
    request.priority = arbiter_core::Priority::High;

    let response = orchestrator.execute_support_operation(&request).await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("all_arms_failed"));
    assert_eq!(provider.total_calls(), 3);
    for arm in Arm::ALL {
        assert!(provider.calls(arm) <= 1);
    }
}

#[tokio::test]
async fn timeouts_are_recorded_as_partial_outcomes() {
    let provider = ScriptedProvider::new();
    provider.script(
        Arm::OpenAi,
        ArmScript {
            latency: Duration::from_millis(400),
            ..ArmScript::default()
        },
    );

    let mut config = Config::default();
    config.orchestrator.rng_seed = Some(3);
    config.traffic.enabled = false;
    config.cost.enabled = false;
    // Only one permitted arm, so the timeout surfaces directly
    config.guardrails.fallback.user = vec![Arm::OpenAi];
    let orchestrator = orchestrator_with(config, &provider);

    let mut request = RouteRequest::new("summarize this quarter");
    request.context.sla_ms = Some(50);

    let response = orchestrator.execute_support_operation(&request).await;

    assert!(!response.success);
    assert!(response.latency_ms >= 50.0);

    // The partial outcome landed in the stats despite the timeout
    let context = BanditContext::from_request(&request);
    let stats = orchestrator.optimizer().bandit().stats(Some(&context));
    assert_eq!(stats[&Arm::OpenAi].trials, 1);
    assert_eq!(stats[&Arm::OpenAi].wins, 0);
    // And the breaker counted the failure
    assert_eq!(orchestrator.breaker().export()[&Arm::OpenAi].failure_count, 1);
}

#[tokio::test]
async fn imported_snapshot_preserves_routing_behavior() {
    let provider = ScriptedProvider::new();

    let mut config = Config::default();
    config.orchestrator.rng_seed = Some(4);
    config.traffic.enabled = false;
    config.cost.enabled = false;

    let source = orchestrator_with(config.clone(), &provider);
    let context = BanditContext::default();
    for _ in 0..100 {
        source
            .optimizer()
            .bandit()
            .record(Arm::Gemini, true, 0.01, 100.0, Some(&context));
        source
            .optimizer()
            .bandit()
            .record(Arm::OpenAi, false, 0.05, 900.0, Some(&context));
    }

    let target = orchestrator_with(config, &provider);
    target.import_snapshot(source.export_snapshot()).unwrap();

    // Both orchestrators route the same request the same way
    let request = RouteRequest::new("plan a tasting menu");
    let source_response = source.execute_support_operation(&request).await;
    let target_response = target.execute_support_operation(&request).await;

    assert!(source_response.success);
    assert_eq!(source_response.arm, target_response.arm);
    assert_eq!(source_response.arm, Arm::Gemini);
}

struct BlockingSafety;

#[async_trait::async_trait]
impl arbiter_core::SafetyChecker for BlockingSafety {
    async fn check_content(
        &self,
        _prompt: &str,
        _channel: &str,
    ) -> Result<arbiter_core::SafetyVerdict, String> {
        Ok(arbiter_core::SafetyVerdict {
            allowed: false,
            violations: vec![arbiter_core::SafetyViolation {
                kind: arbiter_core::SafetyViolationKind::Pii,
                severity: arbiter_core::Severity::High,
                confidence: 0.99,
            }],
        })
    }
}

#[tokio::test]
async fn safety_block_fails_without_touching_a_provider() {
    let provider = ScriptedProvider::new();
    let mut config = Config::default();
    config.orchestrator.rng_seed = Some(5);

    let mut collaborators =
        Collaborators::new(Arc::clone(&provider) as Arc<dyn arbiter_core::ProviderClient>);
    collaborators.safety = Some(Arc::new(BlockingSafety));
    let orchestrator = Orchestrator::init(config, collaborators).unwrap();

    let response = orchestrator
        .execute_support_operation(&RouteRequest::new("my ssn is 123-45-6789"))
        .await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("safety_blocked"));
    assert_eq!(provider.total_calls(), 0);
}
