//! Guardrail classification and delegation configuration

use arbiter_core::Arm;
use serde::Deserialize;

/// Prioritized delegation chains per task role
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FallbackChains {
    pub system: Vec<Arm>,
    pub user: Vec<Arm>,
    pub audience: Vec<Arm>,
}

impl Default for FallbackChains {
    fn default() -> Self {
        Self {
            system: vec![Arm::Bedrock, Arm::OpenAi, Arm::Gemini],
            user: vec![Arm::OpenAi, Arm::Gemini],
            audience: vec![Arm::Gemini, Arm::OpenAi],
        }
    }
}

/// Guardrail settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GuardrailConfig {
    /// Prompt keywords that classify a request as a system task
    pub system_keywords: Vec<String>,
    /// Prompt keywords that classify a request as an audience task
    pub audience_keywords: Vec<String>,
    /// Prioritized fallback arms per task role
    pub fallback: FallbackChains,
    /// Bounded size of the violation ring
    pub max_violations: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            system_keywords: [
                "infrastructure",
                "deploy",
                "rollback",
                "monitor",
                "orchestrate",
                "pipeline",
                "system health",
                "incident",
            ]
            .map(str::to_owned)
            .to_vec(),
            audience_keywords: [
                "audience",
                "demographic",
                "target group",
                "persona",
                "segment",
                "campaign",
                "marketing",
            ]
            .map(str::to_owned)
            .to_vec(),
            fallback: FallbackChains::default(),
            max_violations: 1_000,
        }
    }
}
