//! Admission policy: which limits and ban checks apply to which endpoint.
//!
//! Loaded from YAML. Tables omitted from a file keep their built-in values.
//!
//! ```yaml
//! global:
//!   max_requests: 100
//!   window_ms: 60000
//! endpoints:
//!   market:
//!     limit: { max_requests: 1, window_ms: 600000 }
//!     ban_check: { kind: action, action: createMarket }
//!   register-agent:
//!     limit: { max_requests: 5, window_ms: 3600000, key_by: address }
//! actions:
//!   default_ban_types: [full]
//!   actions:
//!     bet: { ban_types: [trading, full], display_name: betting }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::ban::ActionPolicy;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{EndpointLimit, KeyBy, LimitRule};

/// The ban check an endpoint requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BanCheck {
    /// Any active ban rejects.
    NotBanned,
    /// Bans that block this action reject.
    Action { action: String },
}

impl BanCheck {
    pub fn action(action: impl Into<String>) -> Self {
        BanCheck::Action {
            action: action.into(),
        }
    }
}

/// Admission settings for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    #[serde(default)]
    pub limit: Option<EndpointLimit>,
    #[serde(default)]
    pub ban_check: Option<BanCheck>,
}

/// The complete admission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionPolicy {
    /// Per-identity limit applied to every authenticated call.
    pub global: LimitRule,
    pub endpoints: HashMap<String, EndpointPolicy>,
    pub actions: ActionPolicy,
}

impl AdmissionPolicy {
    /// A policy with the default global limit and nothing else.
    pub fn empty() -> Self {
        Self {
            global: LimitRule::default(),
            endpoints: HashMap::new(),
            actions: ActionPolicy::empty(),
        }
    }

    /// The built-in policy.
    pub fn builtin() -> Self {
        let endpoints = [
            (
                "market",
                EndpointPolicy {
                    limit: Some(EndpointLimit::fixed(1, 600_000)),
                    ban_check: Some(BanCheck::action("createMarket")),
                },
            ),
            (
                "comment",
                EndpointPolicy {
                    limit: Some(EndpointLimit::fixed(2, 60_000)),
                    ban_check: Some(BanCheck::action("comment")),
                },
            ),
            (
                "register-agent",
                EndpointPolicy {
                    limit: Some(EndpointLimit::fixed(5, 3_600_000).keyed_by(KeyBy::Address)),
                    ban_check: None,
                },
            ),
            (
                "bet",
                EndpointPolicy {
                    limit: None,
                    ban_check: Some(BanCheck::action("bet")),
                },
            ),
            (
                "managram",
                EndpointPolicy {
                    limit: None,
                    ban_check: Some(BanCheck::action("managram")),
                },
            ),
            (
                "send-message",
                EndpointPolicy {
                    limit: None,
                    ban_check: Some(BanCheck::action("message")),
                },
            ),
        ]
        .into_iter()
        .map(|(name, policy)| (name.to_string(), policy))
        .collect();

        Self {
            global: LimitRule::default(),
            endpoints,
            actions: ActionPolicy::builtin(),
        }
    }

    /// Load a policy from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission policy");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a policy from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let policy: AdmissionPolicy = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Policy(format!("Failed to parse admission policy: {}", e)))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Reject policies that cannot be enforced.
    pub fn validate(&self) -> Result<()> {
        if self.global.max_requests == 0 || self.global.window_ms == 0 {
            return Err(TurnstileError::Policy(
                "global limit needs max_requests > 0 and window_ms > 0".to_string(),
            ));
        }

        for (name, endpoint) in &self.endpoints {
            if let Some(limit) = &endpoint.limit {
                if limit.rule().window_ms == 0 {
                    return Err(TurnstileError::Policy(format!(
                        "endpoint '{}' has a zero-length window",
                        name
                    )));
                }
            }
            if let Some(BanCheck::Action { action }) = &endpoint.ban_check {
                if action.is_empty() {
                    return Err(TurnstileError::Policy(format!(
                        "endpoint '{}' has an empty ban-check action",
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Add or replace one endpoint.
    pub fn with_endpoint(mut self, name: impl Into<String>, endpoint: EndpointPolicy) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }

    pub fn with_global(mut self, global: LimitRule) -> Self {
        self.global = global;
        self
    }

    pub fn with_actions(mut self, actions: ActionPolicy) -> Self {
        self.actions = actions;
        self
    }

    /// The limit override for an endpoint, if any.
    pub fn endpoint_limit(&self, endpoint: &str) -> Option<&EndpointLimit> {
        self.endpoints.get(endpoint)?.limit.as_ref()
    }

    /// The ban check an endpoint requires, if any.
    pub fn ban_check(&self, endpoint: &str) -> Option<&BanCheck> {
        self.endpoints.get(endpoint)?.ban_check.as_ref()
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ban::BanType;
    use crate::ratelimit::Strategy;

    #[test]
    fn test_builtin_endpoint_limits() {
        let policy = AdmissionPolicy::builtin();

        let market = policy.endpoint_limit("market").unwrap();
        assert_eq!(market.rule(), LimitRule::new(1, 600_000));

        let register = policy.endpoint_limit("register-agent").unwrap();
        assert_eq!(register.key_by, KeyBy::Address);
        assert!(policy.ban_check("register-agent").is_none());

        assert!(policy.endpoint_limit("bet").is_none());
        assert_eq!(policy.ban_check("bet"), Some(&BanCheck::action("bet")));
        assert!(policy.endpoint_limit("unknown").is_none());
    }

    #[test]
    fn test_parse_policy() {
        let yaml = r#"
global:
  max_requests: 10
  window_ms: 1000
endpoints:
  register-agent:
    limit:
      max_requests: 1
      window_ms: 600000
      strategy: sliding_log
      key_by: address
  profile:
    ban_check:
      kind: not_banned
  bet:
    ban_check:
      kind: action
      action: bet
"#;
        let policy = AdmissionPolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.global, LimitRule::new(10, 1_000));

        let register = policy.endpoint_limit("register-agent").unwrap();
        assert_eq!(register.strategy, Strategy::SlidingLog);
        assert_eq!(register.rule(), LimitRule::new(1, 600_000));

        assert_eq!(policy.ban_check("profile"), Some(&BanCheck::NotBanned));
        assert_eq!(policy.ban_check("bet"), Some(&BanCheck::action("bet")));
        assert!(policy.endpoint_limit("market").is_none());

        // The action table was omitted and keeps its built-in contents.
        assert_eq!(
            policy.actions.ban_types_for("bet"),
            &[BanType::Trading, BanType::Full]
        );
    }

    #[test]
    fn test_empty_document_is_builtin() {
        let policy = AdmissionPolicy::from_yaml("{}").unwrap();
        assert_eq!(policy, AdmissionPolicy::builtin());
    }

    #[test]
    fn test_invalid_policies() {
        assert!(AdmissionPolicy::from_yaml("global: { max_requests: 0, window_ms: 1000 }").is_err());
        assert!(AdmissionPolicy::from_yaml(
            "endpoints: { x: { limit: { max_requests: 1, window_ms: 0 } } }"
        )
        .is_err());
        assert!(AdmissionPolicy::from_yaml(
            "endpoints: { x: { ban_check: { kind: action, action: '' } } }"
        )
        .is_err());
        assert!(AdmissionPolicy::from_yaml("global: [1, 2]").is_err());
    }

    #[test]
    fn test_builder_methods() {
        let policy = AdmissionPolicy::empty()
            .with_global(LimitRule::new(3, 1_000))
            .with_endpoint(
                "comment",
                EndpointPolicy {
                    limit: Some(EndpointLimit::sliding(2, 5_000)),
                    ban_check: Some(BanCheck::NotBanned),
                },
            );
        assert_eq!(policy.global.max_requests, 3);
        assert_eq!(policy.endpoints.len(), 1);
        assert!(policy.actions.is_empty());
    }
}
