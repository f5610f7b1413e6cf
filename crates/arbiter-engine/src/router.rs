//! The intelligent router (C7)
//!
//! One request flows: deployment gate, guardrail, experiment assignment,
//! traffic sampling or bandit baseline, cost override, breaker filter,
//! provider execution with SLA timeout and fallback iteration, outcome
//! recording. The router never panics and never returns an error: failures
//! surface as a failed response carrying a stable error code.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use arbiter_core::{
    Arm, AuditEvent, BanditContext, DecisionSource, FlagSnapshot, RequestOutcome, ResponseMetadata,
    RoutePath, RouteError, RouteRequest, RouteResponse, RoutingPathCheck,
};
use arbiter_deploy::{CanarySample, DeploymentController, DeploymentMode, RouteDirective};
use arbiter_guardrails::PermittedRoute;
use arbiter_routing::select_cost_aware;

use crate::orchestrator::Orchestrator;

/// Placeholder arm for synthesized responses that never touched a
/// provider; the budget arm is safe for every task role
const SYNTHETIC_ARM: Arm = Arm::ALL[Arm::ALL.len() - 1];

impl Orchestrator {
    /// Execute one request through the full decision pipeline
    pub async fn execute_support_operation(&self, request: &RouteRequest) -> RouteResponse {
        let started = Instant::now();

        let flags = self.read_flags();
        if let Some(flags) = &flags {
            self.inner.deployment.set_mode(DeploymentMode::from_flags(
                flags,
                self.inner.deployment.configured_canary_percentage(),
            ));
            if !flags.egress_enabled {
                tracing::warn!(request_id = %request.id, "egress disabled, going dark");
                return self.dark_response(request);
            }
        }

        if let Some(blocked) = self.safety_gate(request, started).await {
            return blocked;
        }

        match self.inner.deployment.decide() {
            RouteDirective::SyntheticFallback => {
                self.metric("deployment.dark", 1.0, &[("mode", "dark")]);
                self.dark_response(request)
            }
            RouteDirective::ShadowPair => self.execute_shadowed(request, started).await,
            RouteDirective::Primary => match self.permitted(request, flags.as_ref(), started) {
                Ok(route) => self.execute_primary(request, &route, started).await,
                Err(response) => response,
            },
            RouteDirective::NewPipeline => self.execute_pipeline(request, flags, started).await,
        }
    }

    fn read_flags(&self) -> Option<FlagSnapshot> {
        self.inner
            .collaborators
            .flags
            .as_ref()
            .map(|source| source.snapshot())
    }

    /// The fixed dark-mode response: success with an empty payload
    fn dark_response(&self, request: &RouteRequest) -> RouteResponse {
        RouteResponse {
            request_id: request.id.clone(),
            arm: SYNTHETIC_ARM,
            model_ref: "dark-fallback".to_owned(),
            text: None,
            latency_ms: 0.0,
            cost_eur: 0.0,
            success: true,
            error: None,
            metadata: ResponseMetadata::default(),
        }
    }

    /// Content safety gate; a disallowed verdict fails the request before
    /// any provider is touched
    async fn safety_gate(
        &self,
        request: &RouteRequest,
        started: Instant,
    ) -> Option<RouteResponse> {
        let checker = self.inner.collaborators.safety.as_ref()?;
        match checker.check_content(&request.prompt, "inbound").await {
            Ok(verdict) if !verdict.allowed => {
                let kinds: Vec<String> =
                    verdict.violations.iter().map(|v| format!("{:?}", v.kind)).collect();
                tracing::warn!(request_id = %request.id, violations = ?kinds, "safety gate blocked request");
                let error = RouteError::SafetyBlocked {
                    reason: kinds.join(","),
                };
                Some(self.failure_response(request, SYNTHETIC_ARM, started, &error, ResponseMetadata::default()))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "safety checker unavailable, proceeding");
                None
            }
        }
    }

    /// Guardrail verdict plus per-arm kill switches
    fn permitted(
        &self,
        request: &RouteRequest,
        flags: Option<&FlagSnapshot>,
        started: Instant,
    ) -> Result<PermittedRoute, RouteResponse> {
        let mut route = match self.inner.guardrail.route_for(request) {
            Ok(route) => route,
            Err(error) => {
                return Err(self.failure_response(
                    request,
                    request.context.preferred_arm.unwrap_or(SYNTHETIC_ARM),
                    started,
                    &error,
                    ResponseMetadata::default(),
                ));
            }
        };

        if route.delegated {
            if let Some(violation) = self.inner.guardrail.violations().last() {
                self.audit(AuditEvent::ViolationRecorded {
                    violation_id: violation.id.clone(),
                    attempted_arm: violation.attempted_arm.unwrap_or(Arm::ALL[0]),
                    redirected_to: violation.redirected_to,
                });
            }
        }

        if let Some(flags) = flags {
            route.arms.retain(|&arm| flags.arm_is_enabled(arm));
            if route.arms.is_empty() {
                let error = RouteError::GuardrailBlocked {
                    reason: "every permitted arm is disabled by flags".to_owned(),
                };
                return Err(self.failure_response(
                    request,
                    SYNTHETIC_ARM,
                    started,
                    &error,
                    ResponseMetadata::default(),
                ));
            }
        }

        Ok(route)
    }

    /// The full new-pipeline path: decide, gate, execute with fallback
    async fn execute_pipeline(
        &self,
        request: &RouteRequest,
        flags: Option<FlagSnapshot>,
        started: Instant,
    ) -> RouteResponse {
        let route = match self.permitted(request, flags.as_ref(), started) {
            Ok(route) => route,
            Err(response) => return response,
        };

        let context = BanditContext::from_request(request);
        let (arm, source, confidence) = self.decide_arm(request, &context, &route).await;

        let mut metadata = ResponseMetadata {
            delegated: route.delegated,
            original_arm: route.original_arm,
            role: Some(route.task),
            source,
            confidence,
        };

        // Compliance verdict on the chosen path; critical violations stop
        // the request cold
        let path = if request.is_emergency() {
            RoutePath::Direct
        } else {
            RoutePath::Mediated
        };
        if let Some(blocked) = self.compliance_gate(request, arm, path, started, &metadata).await {
            return blocked;
        }

        let response = self
            .execute_with_fallback(request, arm, &route.arms, path, &context, started, &mut metadata)
            .await;

        // Canary legs feed the rollback window
        if let DeploymentMode::Canary { .. } = self.inner.deployment.mode() {
            let due = self.inner.deployment.record_canary(CanarySample {
                success: response.success,
                latency_ms: response.latency_ms,
                cost_eur: response.cost_eur,
            });
            if due {
                self.evaluate_rollback();
            }
        }

        // Active mode may fall back to the primary path when everything
        // else failed and the flag allows it
        if !response.success
            && self.inner.deployment.mode() == DeploymentMode::Active
            && flags.as_ref().is_some_and(|f| f.fallback_enabled)
            && response.error.as_deref() == Some("all_arms_failed")
        {
            tracing::warn!(request_id = %request.id, "new pipeline exhausted, using primary fallback");
            return self.execute_primary(request, &route, started).await;
        }

        response
    }

    /// Decision layers in override order: experiment, then traffic or
    /// bandit baseline, then the cost optimizer on top
    async fn decide_arm(
        &self,
        request: &RouteRequest,
        context: &BanditContext,
        route: &PermittedRoute,
    ) -> (Arm, DecisionSource, f64) {
        let experiments = if self.inner.config.experiments.enabled {
            self.inner.collaborators.experiments.as_deref()
        } else {
            None
        };

        let mut selection = self.inner.optimizer.optimal_arm(Some(context), experiments).await;

        // An experiment may only claim an arm that holds enough traffic
        if selection.source == DecisionSource::Experiment
            && self.inner.allocation.current().share(selection.arm)
                < self.inner.config.experiments.min_traffic_for_experiment
        {
            tracing::debug!(
                arm = %selection.arm,
                "experiment arm below traffic floor, ignoring assignment"
            );
            selection = self
                .inner
                .optimizer
                .select(arbiter_bandit::SelectionStrategy::Hybrid, Some(context));
        }

        let (mut arm, mut source, mut confidence) =
            if route.arms.contains(&selection.arm) {
                (selection.arm, selection.source, selection.confidence)
            } else {
                // The selection is not permitted here; fall back to the
                // guardrail's first choice
                (route.arms[0], DecisionSource::Default, 0.5)
            };

        // Traffic allocation replaces the bandit baseline when enabled,
        // never an experiment assignment
        if source != DecisionSource::Experiment
            && self.inner.config.traffic.enabled
            && self.inner.config.experiments.auto_traffic_allocation_enabled
        {
            if let Some(sampled) = self.inner.allocation.sample(&route.arms) {
                arm = sampled;
                source = DecisionSource::Traffic;
                confidence = self.inner.allocation.current().share(sampled);
            }
        }

        // Cost override; emergencies bypass it entirely
        if source != DecisionSource::Experiment
            && self.inner.config.cost.enabled
            && !request.is_emergency()
        {
            let decision = select_cost_aware(
                arm,
                &route.arms,
                &self.inner.cost,
                utc_hour(),
                &self.inner.config.cost,
            );
            if decision.overridden {
                arm = decision.arm;
                source = DecisionSource::Cost;
            }
        }

        (arm, source, confidence)
    }

    async fn compliance_gate(
        &self,
        request: &RouteRequest,
        arm: Arm,
        path: RoutePath,
        started: Instant,
        metadata: &ResponseMetadata,
    ) -> Option<RouteResponse> {
        let checker = self.inner.collaborators.compliance.as_ref()?;
        let check = RoutingPathCheck {
            route_type: path,
            arm,
            operation: request.operation,
            priority: request.priority,
        };
        match checker.validate_routing_path(&check, &request.id).await {
            Ok(verdict) if verdict.blocks_routing() => {
                tracing::warn!(
                    request_id = %request.id,
                    score = verdict.score,
                    "compliance blocked routing"
                );
                let error = RouteError::ComplianceBlocked {
                    reason: verdict
                        .violations
                        .first()
                        .map_or_else(|| "critical violation".to_owned(), |v| v.rule.clone()),
                };
                Some(self.failure_response(request, arm, started, &error, metadata.clone()))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "compliance checker unavailable, proceeding");
                None
            }
        }
    }

    /// Attempt the chosen arm, then walk the permitted list on retryable
    /// failures; at most one provider call per permitted arm
    #[allow(clippy::too_many_arguments)]
    async fn execute_with_fallback(
        &self,
        request: &RouteRequest,
        chosen: Arm,
        permitted: &[Arm],
        path: RoutePath,
        context: &BanditContext,
        started: Instant,
        metadata: &mut ResponseMetadata,
    ) -> RouteResponse {
        let mut order: Vec<Arm> = Vec::with_capacity(permitted.len());
        order.push(chosen);
        order.extend(permitted.iter().copied().filter(|&a| a != chosen));

        let mut last_error: Option<RouteError> = None;
        let mut previous_arm: Option<Arm> = None;

        for arm in order {
            if !self.inner.breaker.is_available(arm) {
                tracing::debug!(arm = %arm, "skipping unavailable arm");
                last_error = Some(RouteError::BreakerOpen(arm));
                continue;
            }

            if let Some(from_arm) = previous_arm {
                let code = last_error.as_ref().map_or("unknown", RouteError::code);
                self.audit(AuditEvent::FallbackHop {
                    request_id: request.id.clone(),
                    from_arm,
                    to_arm: arm,
                    error_code: code.to_owned(),
                });
                metadata.confidence = (metadata.confidence * 0.8).max(0.1);
            }
            previous_arm = Some(arm);

            match self.attempt(request, arm, path, context).await {
                Ok(response) => {
                    let mut response = response;
                    response.metadata = metadata.clone();
                    self.audit(AuditEvent::DecisionMade {
                        request_id: request.id.clone(),
                        arm,
                        source: metadata.source,
                        confidence: metadata.confidence,
                    });
                    self.metric(
                        "router.request",
                        1.0,
                        &[
                            ("arm", arm.as_str()),
                            ("operation", &request.operation.to_string()),
                            ("outcome", "success"),
                        ],
                    );
                    response.latency_ms = elapsed_ms(started);
                    return response;
                }
                Err(error) => {
                    self.metric(
                        "router.request",
                        1.0,
                        &[
                            ("arm", arm.as_str()),
                            ("operation", &request.operation.to_string()),
                            ("outcome", error.code()),
                        ],
                    );
                    if !error.is_retryable() {
                        return self.failure_response(request, arm, started, &error, metadata.clone());
                    }
                    last_error = Some(error);
                }
            }
        }

        let last_arm = previous_arm.unwrap_or(chosen);
        tracing::warn!(request_id = %request.id, "all permitted arms failed");
        self.failure_response(request, last_arm, started, &RouteError::AllArmsFailed, metadata.clone())
    }

    /// One breaker-gated, SLA-bounded provider call, recorded win or lose
    async fn attempt(
        &self,
        request: &RouteRequest,
        arm: Arm,
        path: RoutePath,
        context: &BanditContext,
    ) -> Result<RouteResponse, RouteError> {
        let timeout = request.timeout();
        let provider = &self.inner.collaborators.provider;
        let attempt_started = Instant::now();

        let result = self
            .inner
            .breaker
            .execute(arm, || async {
                match tokio::time::timeout(timeout, provider.execute(arm, path, request)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(RouteError::ProviderTimeout {
                        arm,
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                }
            })
            .await;

        let latency_ms = elapsed_ms(attempt_started);

        match result {
            Ok(reply) => {
                self.record_outcome(request, arm, true, latency_ms, reply.cost_eur, context)
                    .await;
                Ok(RouteResponse {
                    request_id: request.id.clone(),
                    arm,
                    model_ref: reply.model_ref,
                    text: Some(reply.text),
                    latency_ms,
                    cost_eur: reply.cost_eur,
                    success: true,
                    error: None,
                    metadata: ResponseMetadata::default(),
                })
            }
            Err(error) => {
                // Breaker admission failures never reached the provider;
                // everything else is a real partial outcome
                if !matches!(
                    error,
                    RouteError::BreakerOpen(_) | RouteError::BreakerHalfOpenFull(_)
                ) {
                    self.record_outcome(request, arm, false, latency_ms, 0.0, context)
                        .await;
                }
                Err(error)
            }
        }
    }

    /// Record one outcome into the bandit, cost tracker, and experiment
    /// manager
    async fn record_outcome(
        &self,
        request: &RouteRequest,
        arm: Arm,
        success: bool,
        latency_ms: f64,
        cost_eur: f64,
        context: &BanditContext,
    ) {
        self.inner
            .optimizer
            .bandit()
            .record(arm, success, cost_eur, latency_ms, Some(context));

        let outcome = RequestOutcome {
            request_id: request.id.clone(),
            arm,
            success,
            latency_ms,
            cost_eur,
            quality_score: None,
            user_rating: None,
        };
        self.inner.cost.record(&outcome);

        if let Some(experiments) = &self.inner.collaborators.experiments {
            if let Err(e) = experiments.record_outcome(context, &outcome).await {
                tracing::debug!(error = %e, "experiment outcome not recorded");
            }
        }
    }

    /// The legacy/primary path: the guardrail's first arm, mediated, no
    /// bandit decisioning
    async fn execute_primary(
        &self,
        request: &RouteRequest,
        route: &PermittedRoute,
        started: Instant,
    ) -> RouteResponse {
        let arm = route.arms[0];
        let context = BanditContext::from_request(request);
        let metadata = ResponseMetadata {
            delegated: route.delegated,
            original_arm: route.original_arm,
            role: Some(route.task),
            source: DecisionSource::Default,
            confidence: 0.5,
        };

        match self.attempt(request, arm, RoutePath::Mediated, &context).await {
            Ok(mut response) => {
                response.metadata = metadata;
                response.latency_ms = elapsed_ms(started);
                response
            }
            Err(error) => self.failure_response(request, arm, started, &error, metadata),
        }
    }

    /// Shadow mode: serve the primary path, exercise the new pipeline on
    /// the side without recording anything against production arms
    async fn execute_shadowed(&self, request: &RouteRequest, started: Instant) -> RouteResponse {
        let route = match self.permitted(request, None, started) {
            Ok(route) => route,
            Err(response) => return response,
        };

        let shadow_self = self.clone();
        let shadow_request = request.clone();
        let shadow_route = route.clone();
        let shadow_handle = tokio::spawn(async move {
            shadow_self
                .execute_shadow_quietly(&shadow_request, &shadow_route)
                .await
        });

        let primary = self.execute_primary(request, &route, started).await;

        // Complete the comparison off the caller's path
        let comparer = self.clone();
        let primary_copy = primary.clone();
        tokio::spawn(async move {
            let shadow_result = match shadow_handle.await {
                Ok(result) => result,
                Err(join_error) => Err(RouteError::Provider {
                    arm: SYNTHETIC_ARM,
                    message: format!("shadow task failed: {join_error}"),
                    transient: true,
                }),
            };
            let comparison = DeploymentController::compare_shadow(&primary_copy, &shadow_result);
            tracing::info!(
                request_id = %primary_copy.request_id,
                similarity = comparison.content_similarity,
                errors = ?comparison.errors,
                "shadow comparison"
            );
            // A clean shadow pair doubles as a control/treatment sample
            if let Ok(shadow_response) = &shadow_result {
                comparer.record_paired_comparison(&arbiter_deploy::PairedSample {
                    control: arbiter_deploy::ResponseSample {
                        text: primary_copy.text.clone().unwrap_or_default(),
                        latency_ms: primary_copy.latency_ms,
                        cost_eur: primary_copy.cost_eur,
                        satisfaction: None,
                    },
                    treatment: arbiter_deploy::ResponseSample {
                        text: shadow_response.text.clone().unwrap_or_default(),
                        latency_ms: shadow_response.latency_ms,
                        cost_eur: shadow_response.cost_eur,
                        satisfaction: None,
                    },
                });
            }
            comparer.audit(AuditEvent::ShadowComparison {
                request_id: primary_copy.request_id.clone(),
                latency_delta_ms: comparison.latency_delta_ms,
                cost_delta_eur: comparison.cost_delta_eur,
                similarity: comparison.content_similarity,
                errors: comparison.errors,
            });
        });

        primary
    }

    /// The shadow leg: full decisioning, but no breaker gating and no
    /// outcome recording, so shadow failures cannot poison production state
    async fn execute_shadow_quietly(
        &self,
        request: &RouteRequest,
        route: &PermittedRoute,
    ) -> Result<RouteResponse, RouteError> {
        let context = BanditContext::from_request(request);
        let selection = self.inner.optimizer.optimal_arm(Some(&context), None).await;
        let arm = if route.arms.contains(&selection.arm) {
            selection.arm
        } else {
            route.arms[0]
        };

        let attempt_started = Instant::now();
        let provider = &self.inner.collaborators.provider;
        let reply = match tokio::time::timeout(
            request.timeout(),
            provider.execute(arm, RoutePath::Mediated, request),
        )
        .await
        {
            Ok(inner) => inner?,
            Err(_) => {
                return Err(RouteError::ProviderTimeout {
                    arm,
                    timeout_ms: u64::try_from(request.timeout().as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        Ok(RouteResponse {
            request_id: request.id.clone(),
            arm,
            model_ref: reply.model_ref,
            text: Some(reply.text),
            latency_ms: elapsed_ms(attempt_started),
            cost_eur: reply.cost_eur,
            success: true,
            error: None,
            metadata: ResponseMetadata::default(),
        })
    }

    fn failure_response(
        &self,
        request: &RouteRequest,
        arm: Arm,
        started: Instant,
        error: &RouteError,
        metadata: ResponseMetadata,
    ) -> RouteResponse {
        self.metric(
            "router.failure",
            1.0,
            &[("arm", arm.as_str()), ("code", error.code())],
        );
        RouteResponse::failure(
            request.id.clone(),
            arm,
            elapsed_ms(started),
            error.code(),
            metadata,
        )
    }

    /// Evaluate and apply a rollback decision from the canary window
    pub(crate) fn evaluate_rollback(&self) {
        let metrics = self.inner.deployment.canary_metrics();
        let baseline = self.inner.cost.baseline_cost();
        let Some(decision) = self.inner.rollback.evaluate(metrics.as_ref(), baseline) else {
            return;
        };

        match decision {
            arbiter_deploy::RollbackDecision::Emergency { reason } => {
                tracing::error!(reason = %reason, "emergency rollback");
                self.inner.deployment.set_mode(DeploymentMode::Dark);
                self.inner.breaker.trip_all();
                let event = self.inner.rollback.record(true, &reason, None);
                self.audit(AuditEvent::RollbackTriggered {
                    rollback_id: event.id,
                    emergency: true,
                    reason,
                });
            }
            arbiter_deploy::RollbackDecision::Gradual {
                to_percentage,
                reason,
            } => {
                tracing::warn!(reason = %reason, to_percentage, "gradual rollback step");
                self.inner.deployment.set_mode(DeploymentMode::Canary {
                    percentage: to_percentage,
                });
                let event = self.inner.rollback.record(false, &reason, Some(to_percentage));
                self.audit(AuditEvent::RollbackTriggered {
                    rollback_id: event.id,
                    emergency: false,
                    reason,
                });
            }
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Current UTC hour of day, for the time-dependent cost strategy
fn utc_hour() -> u8 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    u8::try_from((secs / 3600) % 24).unwrap_or(0)
}
