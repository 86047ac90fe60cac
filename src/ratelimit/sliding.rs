//! Per-caller sliding-log limiter.
//!
//! Keeps the exact instants of recent calls for each `(caller, endpoint)`
//! pair, so any rolling window holds at most `max_requests` calls. Unlike
//! the fixed window there is no boundary burst, at the cost of one
//! timestamp per admitted call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, error, trace};

use crate::clock::Clock;

use super::descriptor::LimitKey;
use super::rules::{Decision, LimitRule};
use super::sweeper::Sweep;

/// Timestamps of recent calls, oldest first.
#[derive(Debug, Clone, Default)]
struct CallLog {
    window: Duration,
    calls: VecDeque<Instant>,
}

impl CallLog {
    /// Drop every call that has left the window.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Registry of sliding logs keyed by `(caller, endpoint)`.
#[derive(Debug)]
pub struct SlidingLogRegistry {
    logs: DashMap<LimitKey, CallLog>,
    clock: Arc<dyn Clock>,
}

impl SlidingLogRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            logs: DashMap::new(),
            clock,
        }
    }

    /// Record a call by `caller` to `endpoint` if it fits within `rule`.
    ///
    /// A call with no caller identity is let through and logged: pooling
    /// unidentified callers into one bucket would let one exhaust another's
    /// quota.
    pub fn check(&self, caller: Option<&str>, endpoint: &str, rule: &LimitRule) -> Decision {
        let Some(caller) = caller else {
            error!(
                endpoint = %endpoint,
                "Sliding-log limit applied to a call without caller identity, allowing"
            );
            return Decision::allow();
        };

        if rule.max_requests == 0 {
            debug!(caller = %caller, endpoint = %endpoint, "Sliding-log limit is zero, rejecting");
            return Decision::reject(rule.window());
        }

        let now = self.clock.now();
        let window = rule.window();
        let key = LimitKey::new(caller, endpoint);

        let mut log = self.logs.entry(key).or_default();
        log.window = window;
        log.prune(now);

        trace!(
            caller = %caller,
            endpoint = %endpoint,
            in_window = log.calls.len(),
            limit = rule.max_requests,
            "Checking sliding-log limit"
        );

        if log.calls.len() >= rule.max_requests as usize {
            let retry_after = log
                .calls
                .front()
                .map(|&oldest| (oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            let decision = Decision::reject(retry_after);
            debug!(
                caller = %caller,
                endpoint = %endpoint,
                retry_after_secs = decision.retry_after_secs(),
                "Sliding-log limit exceeded"
            );
            return decision;
        }

        log.calls.push_back(now);
        Decision::allow()
    }

    /// Calls currently in the log for a pair, without pruning.
    pub fn logged_calls(&self, caller: &str, endpoint: &str) -> usize {
        self.logs
            .get(&LimitKey::new(caller, endpoint))
            .map(|log| log.calls.len())
            .unwrap_or(0)
    }

    /// Prune every log and drop the ones left empty.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.logs.retain(|_, log| {
            log.prune(now);
            let keep = !log.calls.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, remaining = self.logs.len(), "Swept idle call logs");
        }
        removed
    }

    /// Number of tracked `(caller, endpoint)` pairs.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

impl Sweep for SlidingLogRegistry {
    fn name(&self) -> &'static str {
        "call_logs"
    }

    fn sweep(&self) -> usize {
        SlidingLogRegistry::sweep(self)
    }
}
