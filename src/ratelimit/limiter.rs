//! Fixed-window counter registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::clock::Clock;

use super::counter::WindowCounter;
use super::descriptor::LimitKey;
use super::rules::{Decision, LimitRule};
use super::sweeper::Sweep;

/// Registry of fixed-window counters keyed by `(identity, scope)`.
///
/// Each check holds the shard lock of its key for the whole
/// read-modify-write, so concurrent calls on one key never lose an
/// increment. Calls on different shards proceed in parallel.
#[derive(Debug)]
pub struct WindowRegistry {
    counters: DashMap<LimitKey, WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl WindowRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Count a call against `key` and decide whether it is within `rule`.
    pub fn check(&self, key: &LimitKey, rule: &LimitRule) -> Decision {
        let now = self.clock.now();

        trace!(key = %key, limit = rule.max_requests, window_ms = rule.window_ms, "Checking window limit");

        if rule.max_requests == 0 {
            debug!(key = %key, "Window limit is zero, rejecting");
            return Decision::reject(rule.window());
        }

        let decision = match self.counters.entry(key.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().observe(now, rule),
            Entry::Vacant(entry) => {
                debug!(
                    key = %key,
                    limit = rule.max_requests,
                    window_ms = rule.window_ms,
                    "Creating new window counter"
                );
                entry.insert(WindowCounter::start(now, rule.window()));
                Decision::allow()
            }
        };

        if !decision.allowed {
            debug!(
                key = %key,
                global = key.is_global(),
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "Window limit exceeded"
            );
        }

        decision
    }

    /// Current count for a key, if it has an entry.
    pub fn count(&self, key: &LimitKey) -> Option<u32> {
        self.counters.get(key).map(|counter| counter.count())
    }

    /// Remove every expired window and return how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.counters.retain(|_, counter| {
            let keep = !counter.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, remaining = self.counters.len(), "Swept expired windows");
        }
        removed
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Sweep for WindowRegistry {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn sweep(&self) -> usize {
        WindowRegistry::sweep(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn registry() -> (WindowRegistry, ManualClock) {
        let clock = ManualClock::new();
        (WindowRegistry::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_registry_creation() {
        let (registry, _) = registry();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_check_creates_counter() {
        let (registry, _) = registry();
        let key = LimitKey::new("userA", "market");

        assert!(registry.check(&key, &LimitRule::new(2, 60_000)).allowed);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.count(&key), Some(1));
    }

    #[test]
    fn test_two_per_minute_scenario() {
        let (registry, clock) = registry();
        let key = LimitKey::new("userA", "market");
        let rule = LimitRule::new(2, 60_000);

        assert!(registry.check(&key, &rule).allowed);
        clock.advance_ms(1);
        assert!(registry.check(&key, &rule).allowed);
        clock.advance_ms(1);
        let third = registry.check(&key, &rule);
        assert!(!third.allowed);
        assert_eq!(third.retry_after, Duration::from_millis(59_998));
        assert_eq!(third.retry_after_secs(), 60);

        clock.advance_ms(61_000 - 2);
        assert!(registry.check(&key, &rule).allowed);
        assert_eq!(registry.count(&key), Some(1));
    }

    #[test]
    fn test_never_more_than_limit_in_one_window() {
        let (registry, clock) = registry();
        let key = LimitKey::new("ip:10.0.0.1", "comment");
        let rule = LimitRule::new(5, 10_000);

        let mut allowed = 0;
        for _ in 0..50 {
            if registry.check(&key, &rule).allowed {
                allowed += 1;
            }
            clock.advance_ms(100);
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_boundary_clustering_allows_double_across_adjacent_windows() {
        let (registry, clock) = registry();
        let key = LimitKey::new("userA", "comment");
        let rule = LimitRule::new(3, 10_000);

        // Open the window, then burst at its very end.
        assert!(registry.check(&key, &rule).allowed);
        clock.advance_ms(9_999);
        assert!(registry.check(&key, &rule).allowed);
        assert!(registry.check(&key, &rule).allowed);
        assert!(!registry.check(&key, &rule).allowed);

        // One millisecond later a fresh window admits another full burst.
        clock.advance_ms(1);
        for _ in 0..3 {
            assert!(registry.check(&key, &rule).allowed);
        }
        assert!(!registry.check(&key, &rule).allowed);
    }

    #[test]
    fn test_retry_after_hint_succeeds() {
        let (registry, clock) = registry();
        let key = LimitKey::new("userB", "comment");
        let rule = LimitRule::new(1, 2_500);

        registry.check(&key, &rule);
        clock.advance_ms(700);
        let rejected = registry.check(&key, &rule);
        assert!(!rejected.allowed);

        clock.advance(Duration::from_secs(rejected.retry_after_secs()));
        assert!(registry.check(&key, &rule).allowed);
    }

    #[test]
    fn test_zero_limit_rejects_without_entry() {
        let (registry, _) = registry();
        let key = LimitKey::new("userA", "closed");
        let decision = registry.check(&key, &LimitRule::new(0, 30_000));

        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs(), 30);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_different_scopes_have_separate_counters() {
        let (registry, _) = registry();
        let rule = LimitRule::new(1, 60_000);

        assert!(registry.check(&LimitKey::new("userA", "market"), &rule).allowed);
        assert!(registry.check(&LimitKey::new("userA", "comment"), &rule).allowed);
        assert!(registry.check(&LimitKey::global("userA"), &rule).allowed);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (registry, clock) = registry();
        registry.check(&LimitKey::new("a", "short"), &LimitRule::new(5, 1_000));
        registry.check(&LimitKey::new("b", "long"), &LimitRule::new(5, 60_000));

        clock.advance_ms(1_000);
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.count(&LimitKey::new("b", "long")).is_some());
    }

    #[test]
    fn test_swept_key_behaves_like_expired_key() {
        let (registry, clock) = registry();
        let key = LimitKey::new("a", "x");
        let rule = LimitRule::new(1, 1_000);

        registry.check(&key, &rule);
        clock.advance_ms(2_000);
        registry.sweep();

        let decision = registry.check(&key, &rule);
        assert!(decision.allowed);
        assert_eq!(registry.count(&key), Some(1));
    }

    #[test]
    fn test_concurrent_callers_never_exceed_limit() {
        let clock = ManualClock::new();
        let registry = Arc::new(WindowRegistry::new(Arc::new(clock)));
        let key = LimitKey::new("shared", "market");
        let rule = LimitRule::new(25, 60_000);

        let allowed: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let key = key.clone();
                    scope.spawn(move || {
                        (0..20)
                            .filter(|_| registry.check(&key, &rule).allowed)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(allowed, 25);
        assert_eq!(registry.count(&key), Some(25));
    }

    #[test]
    fn test_clear_counters() {
        let (registry, _) = registry();
        registry.check(&LimitKey::new("a", "b"), &LimitRule::default());
        registry.clear();
        assert!(registry.is_empty());
    }
}
