//! Contextual bandit and optimizer configuration

use arbiter_core::{Arm, BanditContext};
use serde::Deserialize;

/// Bandit and optimizer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BanditConfig {
    /// UCB exploration rate
    pub exploration_rate: f64,
    /// Trials below which an arm still needs exploration
    pub min_trials_for_confidence: u64,
    /// Recommendation refresh interval for the optimizer
    pub optimization_interval_secs: u64,
    /// Additive score adjustments applied per context
    pub bias: Vec<BiasRule>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
            min_trials_for_confidence: 20,
            optimization_interval_secs: 60 * 60,
            bias: default_bias_table(),
        }
    }
}

/// Which arm(s) a bias rule adjusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasTarget {
    /// A single arm
    Arm(Arm),
    /// Every arm except the named one
    AllExcept(Arm),
}

impl BiasTarget {
    pub fn applies_to(self, arm: Arm) -> bool {
        match self {
            Self::Arm(a) => a == arm,
            Self::AllExcept(a) => a != arm,
        }
    }
}

/// One additive bias adjustment
///
/// A rule fires when every present condition matches the context. The
/// resulting score is clamped to `[0, 1]` after all deltas are applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BiasRule {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub budget_tier: Option<String>,
    #[serde(default)]
    pub require_tools: Option<bool>,
    pub target: BiasTarget,
    pub delta: f64,
}

impl BiasRule {
    /// Whether this rule's conditions hold for the context
    pub fn matches(&self, context: &BanditContext) -> bool {
        let domain_ok = self
            .domain
            .as_deref()
            .is_none_or(|d| context.domain.as_deref() == Some(d));
        let tier_ok = self
            .budget_tier
            .as_deref()
            .is_none_or(|t| context.budget_tier.as_deref() == Some(t));
        let tools_ok = self
            .require_tools
            .is_none_or(|t| context.require_tools == Some(t));
        domain_ok && tier_ok && tools_ok
    }

    /// Delta this rule contributes for `arm` under `context`, or zero
    pub fn delta_for(&self, arm: Arm, context: &BanditContext) -> f64 {
        if self.matches(context) && self.target.applies_to(arm) {
            self.delta
        } else {
            0.0
        }
    }
}

/// The reference bias table
fn default_bias_table() -> Vec<BiasRule> {
    vec![
        BiasRule {
            domain: Some("legal".to_owned()),
            budget_tier: None,
            require_tools: None,
            target: BiasTarget::Arm(Arm::Bedrock),
            delta: 0.10,
        },
        BiasRule {
            domain: Some("culinary".to_owned()),
            budget_tier: None,
            require_tools: None,
            target: BiasTarget::Arm(Arm::OpenAi),
            delta: 0.05,
        },
        BiasRule {
            domain: Some("medical".to_owned()),
            budget_tier: None,
            require_tools: None,
            target: BiasTarget::AllExcept(Arm::Bedrock),
            delta: -0.20,
        },
        BiasRule {
            domain: None,
            budget_tier: Some("low".to_owned()),
            require_tools: None,
            target: BiasTarget::Arm(Arm::Gemini),
            delta: 0.10,
        },
        BiasRule {
            domain: None,
            budget_tier: Some("premium".to_owned()),
            require_tools: None,
            target: BiasTarget::Arm(Arm::Bedrock),
            delta: 0.05,
        },
        BiasRule {
            domain: None,
            budget_tier: None,
            require_tools: Some(true),
            target: BiasTarget::Arm(Arm::Gemini),
            delta: -0.30,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(domain: Option<&str>, tier: Option<&str>, tools: Option<bool>) -> BanditContext {
        BanditContext {
            domain: domain.map(str::to_owned),
            budget_tier: tier.map(str::to_owned),
            require_tools: tools,
            user_id: None,
        }
    }

    #[test]
    fn legal_domain_boosts_bedrock() {
        let rules = default_bias_table();
        let ctx = context(Some("legal"), None, None);
        let total: f64 = rules.iter().map(|r| r.delta_for(Arm::Bedrock, &ctx)).sum();
        assert!((total - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn medical_domain_penalizes_everything_but_bedrock() {
        let rules = default_bias_table();
        let ctx = context(Some("medical"), None, None);
        let openai: f64 = rules.iter().map(|r| r.delta_for(Arm::OpenAi, &ctx)).sum();
        let bedrock: f64 = rules.iter().map(|r| r.delta_for(Arm::Bedrock, &ctx)).sum();
        assert!((openai + 0.20).abs() < f64::EPSILON);
        assert!(bedrock.abs() < f64::EPSILON);
    }

    #[test]
    fn tool_requirement_penalizes_gemini() {
        let rules = default_bias_table();
        let ctx = context(None, None, Some(true));
        let gemini: f64 = rules.iter().map(|r| r.delta_for(Arm::Gemini, &ctx)).sum();
        assert!((gemini + 0.30).abs() < f64::EPSILON);
    }

    #[test]
    fn rules_stack_additively() {
        let rules = default_bias_table();
        // low tier boosts gemini +0.10, tools penalize it -0.30
        let ctx = context(None, Some("low"), Some(true));
        let gemini: f64 = rules.iter().map(|r| r.delta_for(Arm::Gemini, &ctx)).sum();
        assert!((gemini + 0.20).abs() < f64::EPSILON);
    }
}
