//! Bandit context and the deterministic context key

use serde::{Deserialize, Serialize};

use crate::request::RouteRequest;

/// The reserved key every statistics table carries
pub const GLOBAL_KEY: &str = "global";

/// Discrete labels the bandit stratifies on
///
/// `user_id` travels with the context for experiment assignment but is
/// never part of the context key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanditContext {
    pub domain: Option<String>,
    pub budget_tier: Option<String>,
    pub require_tools: Option<bool>,
    pub user_id: Option<String>,
}

impl BanditContext {
    /// Deterministic key over `(domain, budget_tier, require_tools)`
    pub fn key(&self) -> String {
        let domain = self.domain.as_deref().unwrap_or("general");
        let tier = self.budget_tier.as_deref().unwrap_or("standard");
        let tools = match self.require_tools {
            Some(true) => "tools",
            _ => "no-tools",
        };
        format!("{domain}|{tier}|{tools}")
    }

    /// Derive the bandit context from an inbound request
    pub fn from_request(request: &RouteRequest) -> Self {
        Self {
            domain: request.context.domain.clone(),
            budget_tier: request.context.budget_tier.clone(),
            require_tools: (!request.tools.is_empty()).then_some(true),
            user_id: request.context.user_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_uses_fallback_labels() {
        assert_eq!(BanditContext::default().key(), "general|standard|no-tools");
    }

    #[test]
    fn key_is_deterministic_and_ignores_user() {
        let a = BanditContext {
            domain: Some("legal".to_owned()),
            budget_tier: Some("low".to_owned()),
            require_tools: Some(true),
            user_id: Some("u-1".to_owned()),
        };
        let b = BanditContext {
            user_id: Some("u-2".to_owned()),
            ..a.clone()
        };
        assert_eq!(a.key(), "legal|low|tools");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn tools_flag_derived_from_request() {
        let mut request = RouteRequest::new("hi");
        assert_eq!(BanditContext::from_request(&request).require_tools, None);

        request.tools.push(crate::request::ToolSpec {
            name: "lookup".to_owned(),
            param_schema: serde_json::json!({}),
        });
        assert_eq!(BanditContext::from_request(&request).require_tools, Some(true));
    }
}
