//! Architectural guardrail for arm/task-role combinations
//!
//! Classifies every request into a task role from prompt keywords and
//! context overrides, then produces the prioritized list of permitted arms.
//! The premium arm is reserved for system-role work; disallowed choices are
//! delegated down the configured fallback chain and recorded in a bounded
//! violation ring.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use std::collections::VecDeque;
use std::sync::Mutex;

use arbiter_config::GuardrailConfig;
use arbiter_core::{Arm, OperationKind, RouteError, RouteRequest, TaskType};
use serde::{Deserialize, Serialize};

/// Maximum prompt length carried in a violation record
const EXCERPT_LEN: usize = 80;

/// What the guardrail did about a disallowed combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ViolationAction {
    /// Redirected to the first permitted fallback arm
    Delegated,
    /// No permitted arm remained; the request was rejected
    Blocked,
    /// A permitted preferred arm overrode the classification ordering
    Corrected,
}

/// One guardrail violation, retained for introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub task: TaskType,
    pub excerpt: String,
    pub attempted_arm: Option<Arm>,
    pub redirected_to: Option<Arm>,
    pub action: ViolationAction,
}

/// The guardrail's verdict for one request
#[derive(Debug, Clone)]
pub struct PermittedRoute {
    pub task: TaskType,
    /// Permitted arms in priority order, never empty
    pub arms: Vec<Arm>,
    /// True when the intended arm was disallowed and redirected
    pub delegated: bool,
    pub original_arm: Option<Arm>,
}

/// The architectural guardrail
pub struct Guardrail {
    config: GuardrailConfig,
    violations: Mutex<VecDeque<Violation>>,
}

impl Guardrail {
    pub fn new(config: GuardrailConfig) -> Self {
        Self {
            config,
            violations: Mutex::new(VecDeque::new()),
        }
    }

    /// Classify the request into a task role
    ///
    /// Context overrides win over keyword matching: an explicit intent or
    /// domain names the role directly; the operation class marks
    /// infrastructure work as system-role regardless of wording.
    pub fn classify(&self, request: &RouteRequest) -> TaskType {
        if matches!(
            request.operation,
            OperationKind::Infrastructure | OperationKind::MetaMonitor
        ) {
            return TaskType::System;
        }

        if let Some(intent) = request.context.intent.as_deref() {
            match intent {
                "system" | "infrastructure" | "monitoring" => return TaskType::System,
                "audience" | "marketing" => return TaskType::Audience,
                "user" | "assistance" => return TaskType::User,
                _ => {}
            }
        }

        if let Some(domain) = request.context.domain.as_deref() {
            match domain {
                "infrastructure" => return TaskType::System,
                "marketing" => return TaskType::Audience,
                _ => {}
            }
        }

        let prompt = request.prompt.to_lowercase();
        if self.matches_any(&prompt, &self.config.system_keywords) {
            TaskType::System
        } else if self.matches_any(&prompt, &self.config.audience_keywords) {
            TaskType::Audience
        } else {
            TaskType::User
        }
    }

    #[allow(clippy::unused_self)]
    fn matches_any(&self, prompt: &str, keywords: &[String]) -> bool {
        keywords.iter().any(|k| prompt.contains(&k.to_lowercase()))
    }

    /// Whether an arm is permitted for a task role
    ///
    /// The premium arm only serves system-role work; everything else is
    /// unrestricted.
    pub fn arm_permitted(arm: Arm, task: TaskType) -> bool {
        arm != Arm::Bedrock || task == TaskType::System
    }

    /// Produce the prioritized permitted arm list for a request
    ///
    /// An explicit `preferred_arm` supersedes classification for ordering
    /// but stays subject to the arm-vs-task rule; a disallowed preference
    /// is delegated and recorded.
    pub fn route_for(&self, request: &RouteRequest) -> Result<PermittedRoute, RouteError> {
        let task = self.classify(request);

        let chain = match task {
            TaskType::System => &self.config.fallback.system,
            TaskType::User => &self.config.fallback.user,
            TaskType::Audience => &self.config.fallback.audience,
        };
        let mut arms: Vec<Arm> = chain
            .iter()
            .copied()
            .filter(|&arm| Self::arm_permitted(arm, task))
            .collect();

        let mut delegated = false;
        let mut original_arm = None;

        if let Some(preferred) = request.context.preferred_arm {
            if Self::arm_permitted(preferred, task) {
                let was_first = arms.first() == Some(&preferred);
                arms.retain(|&a| a != preferred);
                arms.insert(0, preferred);
                if !was_first {
                    self.push_violation(request, task, Some(preferred), None, ViolationAction::Corrected);
                }
            } else {
                delegated = true;
                original_arm = Some(preferred);
                let redirected = arms.first().copied();
                tracing::info!(
                    attempted = %preferred,
                    task = %task,
                    redirected = ?redirected,
                    "guardrail delegated disallowed arm"
                );
                self.push_violation(request, task, Some(preferred), redirected, ViolationAction::Delegated);
            }
        }

        if arms.is_empty() {
            self.push_violation(request, task, request.context.preferred_arm, None, ViolationAction::Blocked);
            return Err(RouteError::GuardrailBlocked {
                reason: format!("no permitted arm for {task} task"),
            });
        }

        Ok(PermittedRoute {
            task,
            arms,
            delegated,
            original_arm,
        })
    }

    fn push_violation(
        &self,
        request: &RouteRequest,
        task: TaskType,
        attempted: Option<Arm>,
        redirected: Option<Arm>,
        action: ViolationAction,
    ) {
        let excerpt: String = request.prompt.chars().take(EXCERPT_LEN).collect();
        let violation = Violation {
            id: uuid::Uuid::new_v4().to_string(),
            task,
            excerpt,
            attempted_arm: attempted,
            redirected_to: redirected,
            action,
        };

        let mut ring = self
            .violations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if ring.len() >= self.config.max_violations {
            ring.pop_front();
        }
        ring.push_back(violation);
    }

    /// Snapshot of the violation ring, oldest first
    pub fn violations(&self) -> Vec<Violation> {
        self.violations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
