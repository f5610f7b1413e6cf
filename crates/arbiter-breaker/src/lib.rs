//! Per-arm circuit breaker with half-open probing
//!
//! Each arm carries an independent three-state machine. Closed counts
//! consecutive failures; Open blocks until the recovery deadline or a
//! successful health probe; HalfOpen admits a bounded probe budget and
//! closes after enough consecutive successes. State transitions are the
//! only mutator paths.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use arbiter_config::BreakerConfig;
use arbiter_core::{Arm, RouteError};
use serde::{Deserialize, Serialize};

/// Circuit breaker state for one arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests flow through
    Closed,
    /// The arm is failing, requests are blocked
    Open,
    /// Probing recovery with a bounded call budget
    HalfOpen,
}

/// A state change observed while recording an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub arm: Arm,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Serializable view of one arm's breaker
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_attempts: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
}

#[derive(Debug)]
struct ArmBreaker {
    state: CircuitState,
    failure_count: u32,
    half_open_attempts: u32,
    total_requests: u64,
    successful_requests: u64,
    last_failure_at: Option<Instant>,
    last_success_at: Option<Instant>,
    /// Set iff `state` is Open
    next_attempt_at: Option<Instant>,
}

impl ArmBreaker {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_attempts: 0,
            total_requests: 0,
            successful_requests: 0,
            last_failure_at: None,
            last_success_at: None,
            next_attempt_at: None,
        }
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            half_open_attempts: self.half_open_attempts,
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
        }
    }
}

/// Independent circuit breakers for every arm, created eagerly
pub struct CircuitBreaker {
    arms: HashMap<Arm, Mutex<ArmBreaker>>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        let arms = Arm::ALL
            .into_iter()
            .map(|arm| (arm, Mutex::new(ArmBreaker::new())))
            .collect();
        Self { arms, config }
    }

    fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.config.recovery_timeout_ms)
    }

    fn with_arm<T>(&self, arm: Arm, f: impl FnOnce(&mut ArmBreaker) -> T) -> T {
        let mut guard = self.arms[&arm]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Move an Open breaker whose recovery deadline has passed to HalfOpen
    fn refresh(arm: Arm, breaker: &mut ArmBreaker) -> Option<Transition> {
        if breaker.state == CircuitState::Open
            && breaker.next_attempt_at.is_some_and(|at| Instant::now() >= at)
        {
            breaker.state = CircuitState::HalfOpen;
            breaker.half_open_attempts = 0;
            breaker.next_attempt_at = None;
            tracing::info!(arm = %arm, "breaker half-open after recovery timeout");
            return Some(Transition {
                arm,
                from: CircuitState::Open,
                to: CircuitState::HalfOpen,
            });
        }
        None
    }

    /// The arm's current state, applying the recovery-deadline transition
    pub fn state(&self, arm: Arm) -> CircuitState {
        self.with_arm(arm, |b| {
            Self::refresh(arm, b);
            b.state
        })
    }

    /// Whether the arm may take a request right now
    pub fn is_available(&self, arm: Arm) -> bool {
        self.with_arm(arm, |b| {
            Self::refresh(arm, b);
            match b.state {
                CircuitState::Closed => true,
                CircuitState::HalfOpen => b.half_open_attempts < self.config.half_open_max_calls,
                CircuitState::Open => false,
            }
        })
    }

    /// Record a successful call
    pub fn record_success(&self, arm: Arm, _latency_ms: f64) -> Option<Transition> {
        self.with_arm(arm, |b| {
            b.total_requests += 1;
            b.successful_requests += 1;
            b.last_success_at = Some(Instant::now());
            match b.state {
                CircuitState::Closed => {
                    b.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    b.half_open_attempts += 1;
                    if b.half_open_attempts >= self.config.half_open_max_calls {
                        b.state = CircuitState::Closed;
                        b.failure_count = 0;
                        b.half_open_attempts = 0;
                        tracing::info!(arm = %arm, "breaker closed after successful probes");
                        return Some(Transition {
                            arm,
                            from: CircuitState::HalfOpen,
                            to: CircuitState::Closed,
                        });
                    }
                    None
                }
                // A success while Open can only come from a stale in-flight
                // call; it does not move the state machine
                CircuitState::Open => None,
            }
        })
    }

    /// Record a failed call
    pub fn record_failure(&self, arm: Arm) -> Option<Transition> {
        self.with_arm(arm, |b| {
            b.total_requests += 1;
            b.last_failure_at = Some(Instant::now());
            match b.state {
                CircuitState::Closed => {
                    b.failure_count += 1;
                    if b.failure_count >= self.config.failure_threshold {
                        b.state = CircuitState::Open;
                        b.next_attempt_at = Some(Instant::now() + self.recovery_timeout());
                        tracing::warn!(
                            arm = %arm,
                            failures = b.failure_count,
                            "breaker opened"
                        );
                        return Some(Transition {
                            arm,
                            from: CircuitState::Closed,
                            to: CircuitState::Open,
                        });
                    }
                    None
                }
                CircuitState::HalfOpen => {
                    b.state = CircuitState::Open;
                    b.half_open_attempts = 0;
                    b.next_attempt_at = Some(Instant::now() + self.recovery_timeout());
                    tracing::warn!(arm = %arm, "breaker re-opened from half-open");
                    Some(Transition {
                        arm,
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Open,
                    })
                }
                CircuitState::Open => None,
            }
        })
    }

    /// A successful health probe moves an Open arm to HalfOpen early
    pub fn probe_success(&self, arm: Arm) -> Option<Transition> {
        self.with_arm(arm, |b| {
            if b.state == CircuitState::Open {
                b.state = CircuitState::HalfOpen;
                b.half_open_attempts = 0;
                b.next_attempt_at = None;
                tracing::info!(arm = %arm, "breaker half-open after successful probe");
                return Some(Transition {
                    arm,
                    from: CircuitState::Open,
                    to: CircuitState::HalfOpen,
                });
            }
            None
        })
    }

    /// Force every breaker open, as during an emergency rollback
    pub fn trip_all(&self) {
        for arm in Arm::ALL {
            self.with_arm(arm, |b| {
                if b.state != CircuitState::Open {
                    tracing::warn!(arm = %arm, "breaker force-opened");
                }
                b.state = CircuitState::Open;
                b.half_open_attempts = 0;
                b.next_attempt_at = Some(Instant::now() + self.recovery_timeout());
            });
        }
    }

    /// Gate and time one operation through the breaker
    ///
    /// Returns `BreakerOpen` while blocked, `BreakerHalfOpenFull` when the
    /// probe budget is spent, and records the outcome either way.
    pub async fn execute<T, F, Fut>(&self, arm: Arm, op: F) -> Result<T, RouteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RouteError>>,
    {
        self.admit(arm)?;

        let started = Instant::now();
        match op().await {
            Ok(value) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.record_success(arm, latency_ms);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(arm);
                Err(e)
            }
        }
    }

    /// The admission check of [`execute`], usable standalone
    pub fn admit(&self, arm: Arm) -> Result<(), RouteError> {
        self.with_arm(arm, |b| {
            Self::refresh(arm, b);
            match b.state {
                CircuitState::Open => Err(RouteError::BreakerOpen(arm)),
                CircuitState::HalfOpen
                    if b.half_open_attempts >= self.config.half_open_max_calls =>
                {
                    Err(RouteError::BreakerHalfOpenFull(arm))
                }
                _ => Ok(()),
            }
        })
    }

    /// Serializable view of every arm's breaker
    pub fn export(&self) -> HashMap<Arm, BreakerSnapshot> {
        Arm::ALL
            .into_iter()
            .map(|arm| (arm, self.with_arm(arm, |a: &mut ArmBreaker| a.snapshot())))
            .collect()
    }

    /// Restore breaker states from a snapshot
    ///
    /// An imported Open breaker becomes probe-eligible immediately: the
    /// original deadline is meaningless across processes.
    pub fn import(&self, snapshot: &HashMap<Arm, BreakerSnapshot>) {
        for (&arm, saved) in snapshot {
            self.with_arm(arm, |b| {
                b.state = saved.state;
                b.failure_count = saved.failure_count;
                b.half_open_attempts = saved.half_open_attempts;
                b.total_requests = saved.total_requests;
                b.successful_requests = saved.successful_requests;
                b.next_attempt_at = match saved.state {
                    CircuitState::Open => Some(Instant::now()),
                    _ => None,
                };
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, recovery_ms: u64, half_open: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery_ms,
            half_open_max_calls: half_open,
            health_check_interval_secs: 30,
        }
    }

    #[test]
    fn closed_until_threshold() {
        let breaker = CircuitBreaker::new(config(3, 60_000, 2));
        breaker.record_failure(Arm::Bedrock);
        breaker.record_failure(Arm::Bedrock);
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::Closed);

        let transition = breaker.record_failure(Arm::Bedrock).unwrap();
        assert_eq!(transition.to, CircuitState::Open);
        assert!(!breaker.is_available(Arm::Bedrock));
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 60_000, 2));
        breaker.record_failure(Arm::OpenAi);
        breaker.record_failure(Arm::OpenAi);
        breaker.record_success(Arm::OpenAi, 100.0);
        breaker.record_failure(Arm::OpenAi);
        breaker.record_failure(Arm::OpenAi);
        // The reset means only two consecutive failures are on the counter
        assert_eq!(breaker.state(Arm::OpenAi), CircuitState::Closed);
    }

    #[test]
    fn arms_are_independent() {
        let breaker = CircuitBreaker::new(config(1, 60_000, 2));
        breaker.record_failure(Arm::Gemini);
        assert!(!breaker.is_available(Arm::Gemini));
        assert!(breaker.is_available(Arm::Bedrock));
        assert!(breaker.is_available(Arm::OpenAi));
    }

    #[test]
    fn recovery_deadline_half_opens() {
        let breaker = CircuitBreaker::new(config(1, 30, 2));
        breaker.record_failure(Arm::Bedrock);
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::HalfOpen);
        assert!(breaker.is_available(Arm::Bedrock));
    }

    #[test]
    fn half_open_closes_after_consecutive_successes() {
        let breaker = CircuitBreaker::new(config(1, 30, 2));
        breaker.record_failure(Arm::Bedrock);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::HalfOpen);

        assert!(breaker.record_success(Arm::Bedrock, 10.0).is_none());
        let transition = breaker.record_success(Arm::Bedrock, 10.0).unwrap();
        assert_eq!(transition.to, CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(1, 30, 2));
        breaker.record_failure(Arm::Bedrock);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::HalfOpen);

        let transition = breaker.record_failure(Arm::Bedrock).unwrap();
        assert_eq!(transition.to, CircuitState::Open);
        assert!(!breaker.is_available(Arm::Bedrock));
    }

    #[test]
    fn half_open_budget_is_bounded() {
        let breaker = CircuitBreaker::new(config(1, 30, 3));
        breaker.record_failure(Arm::Bedrock);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::HalfOpen);

        breaker.record_success(Arm::Bedrock, 10.0);
        breaker.record_success(Arm::Bedrock, 10.0);
        // Two of three probes used: still admissible
        assert!(breaker.admit(Arm::Bedrock).is_ok());
        breaker.record_success(Arm::Bedrock, 10.0);
        // Third success closed the breaker
        assert_eq!(breaker.state(Arm::Bedrock), CircuitState::Closed);
    }

    #[test]
    fn probe_success_half_opens_early() {
        let breaker = CircuitBreaker::new(config(1, 60_000, 2));
        breaker.record_failure(Arm::Gemini);
        assert_eq!(breaker.state(Arm::Gemini), CircuitState::Open);

        let transition = breaker.probe_success(Arm::Gemini).unwrap();
        assert_eq!(transition.to, CircuitState::HalfOpen);
        assert!(breaker.is_available(Arm::Gemini));
    }

    #[tokio::test]
    async fn execute_blocks_while_open() {
        let breaker = CircuitBreaker::new(config(1, 60_000, 2));
        breaker.record_failure(Arm::OpenAi);

        let result: Result<(), RouteError> = breaker.execute(Arm::OpenAi, || async { Ok(()) }).await;
        assert!(matches!(result, Err(RouteError::BreakerOpen(Arm::OpenAi))));
    }

    #[tokio::test]
    async fn execute_records_outcomes() {
        let breaker = CircuitBreaker::new(config(2, 60_000, 2));

        let ok: Result<u32, RouteError> = breaker.execute(Arm::OpenAi, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        for _ in 0..2 {
            let _: Result<u32, RouteError> = breaker
                .execute(Arm::OpenAi, || async {
                    Err(RouteError::Provider {
                        arm: Arm::OpenAi,
                        message: "boom".to_owned(),
                        transient: true,
                    })
                })
                .await;
        }
        assert_eq!(breaker.state(Arm::OpenAi), CircuitState::Open);
    }

    #[test]
    fn trip_all_opens_everything() {
        let breaker = CircuitBreaker::new(config(5, 60_000, 2));
        breaker.trip_all();
        for arm in Arm::ALL {
            assert_eq!(breaker.state(arm), CircuitState::Open);
        }
    }

    #[test]
    fn export_import_preserves_state() {
        let breaker = CircuitBreaker::new(config(1, 60_000, 2));
        breaker.record_failure(Arm::Bedrock);
        breaker.record_success(Arm::OpenAi, 20.0);

        let restored = CircuitBreaker::new(config(1, 60_000, 2));
        restored.import(&breaker.export());
        // The imported Open breaker is probe-eligible immediately
        assert_eq!(restored.state(Arm::Bedrock), CircuitState::HalfOpen);
        assert_eq!(restored.export()[&Arm::OpenAi].successful_requests, 1);
    }
}
