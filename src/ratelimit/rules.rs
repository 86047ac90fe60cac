//! Rate limit rules and decisions.
//!
//! A [`LimitRule`] is the `{max_requests, window}` pair every limiter takes.
//! [`EndpointLimit`] adds the per-endpoint choices: which limiter to use and
//! what to key it by.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default global limit: 100 requests per minute per identity.
pub const DEFAULT_GLOBAL_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_GLOBAL_WINDOW_MS: u64 = 60_000;

/// Default sliding-log limit: 25 calls per hour.
pub const DEFAULT_SLIDING_MAX_CALLS: u32 = 25;
pub const DEFAULT_SLIDING_WINDOW_MS: u64 = 3_600_000;

/// A rate limit: at most `max_requests` calls per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl LimitRule {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// The window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Window length in whole seconds, for messages.
    pub fn window_secs(&self) -> u64 {
        self.window_ms / 1000
    }
}

impl Default for LimitRule {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_MAX_REQUESTS, DEFAULT_GLOBAL_WINDOW_MS)
    }
}

/// Which limiter enforces an endpoint limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fixed, wholesale-resetting window. Cheap, allows boundary bursts.
    #[default]
    FixedWindow,
    /// Exact timestamp log over a rolling window.
    SlidingLog,
}

/// What an endpoint limit is keyed by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBy {
    /// The authenticated caller (API key, else user id).
    #[default]
    Identity,
    /// The caller's network address, for signup-style endpoints.
    Address,
}

/// An endpoint-specific limit override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    #[serde(default)]
    pub max_requests: Option<u32>,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub key_by: KeyBy,
}

impl EndpointLimit {
    /// A fixed-window limit keyed by identity.
    pub fn fixed(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests: Some(max_requests),
            window_ms: Some(window_ms),
            ..Self::default()
        }
    }

    /// A sliding-log limit keyed by identity.
    pub fn sliding(max_calls: u32, window_ms: u64) -> Self {
        Self {
            max_requests: Some(max_calls),
            window_ms: Some(window_ms),
            strategy: Strategy::SlidingLog,
            key_by: KeyBy::Identity,
        }
    }

    pub fn keyed_by(mut self, key_by: KeyBy) -> Self {
        self.key_by = key_by;
        self
    }

    /// The effective rule, filling omitted fields with the strategy's defaults.
    pub fn rule(&self) -> LimitRule {
        let fallback = match self.strategy {
            Strategy::FixedWindow => LimitRule::default(),
            Strategy::SlidingLog => {
                LimitRule::new(DEFAULT_SLIDING_MAX_CALLS, DEFAULT_SLIDING_WINDOW_MS)
            }
        };
        LimitRule::new(
            self.max_requests.unwrap_or(fallback.max_requests),
            self.window_ms.unwrap_or(fallback.window_ms),
        )
    }
}

/// Outcome of a single limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Zero when allowed.
    pub retry_after: Duration,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    pub fn reject(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }

    /// `retry_after` rounded up to whole seconds.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_is_global_limit() {
        let rule = LimitRule::default();
        assert_eq!(rule.max_requests, 100);
        assert_eq!(rule.window(), Duration::from_secs(60));
        assert_eq!(rule.window_secs(), 60);
    }

    #[test]
    fn test_endpoint_limit_fills_defaults_per_strategy() {
        let sliding = EndpointLimit {
            strategy: Strategy::SlidingLog,
            ..EndpointLimit::default()
        };
        assert_eq!(sliding.rule(), LimitRule::new(25, 3_600_000));

        let fixed = EndpointLimit {
            max_requests: Some(3),
            ..EndpointLimit::default()
        };
        assert_eq!(fixed.rule(), LimitRule::new(3, 60_000));
    }

    #[test]
    fn test_parse_endpoint_limit() {
        let yaml = r#"
max_requests: 5
window_ms: 3600000
key_by: address
"#;
        let limit: EndpointLimit = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(limit.strategy, Strategy::FixedWindow);
        assert_eq!(limit.key_by, KeyBy::Address);
        assert_eq!(limit.rule(), LimitRule::new(5, 3_600_000));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(Decision::reject(Duration::from_millis(59_998)).retry_after_secs(), 60);
        assert_eq!(Decision::reject(Duration::from_secs(300)).retry_after_secs(), 300);
        assert_eq!(Decision::reject(Duration::from_millis(1)).retry_after_secs(), 1);
        assert_eq!(Decision::allow().retry_after_secs(), 0);
    }
}
