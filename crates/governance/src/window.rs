//! Fixed-window admission counter.
//!
//! The simplest correct scheme: one counter per `(scope, identifier)`, reset
//! at fixed boundaries. A caller straddling a boundary can briefly burst up
//! to `2 * max` requests — accepted in exchange for O(1) space per
//! identifier and no background sweep. Do not swap in a sliding window
//! without revisiting the call sites that rely on `reset_at_ms`.

use crate::scope::RateLimitScope;
use botline_store::{CounterEntry, CounterStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Outcome of one admission check. Carried on every governed response so
/// the HTTP layer can emit the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct AdmitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_ms: i64,
}

impl AdmitDecision {
    /// Window end as epoch seconds, for the `X-RateLimit-Reset` header.
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms / 1000
    }

    /// Whole seconds until the window resets, at least 1. `Retry-After`.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let remaining_ms = (self.reset_at_ms - now.timestamp_millis()).max(0) as u64;
        remaining_ms.div_ceil(1000).max(1)
    }
}

/// Per-(scope, identifier) fixed-window request counter.
pub struct WindowCounter {
    store: Arc<dyn CounterStore>,
    scopes: HashMap<String, RateLimitScope>,
}

impl WindowCounter {
    pub fn new(store: Arc<dyn CounterStore>, scopes: Vec<RateLimitScope>) -> Self {
        let scopes = scopes.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { store, scopes }
    }

    /// Look up a limiter family by name.
    pub fn scope(&self, name: &str) -> Option<&RateLimitScope> {
        self.scopes.get(name)
    }

    /// Decide admission for one request. Always consumes one unit of the
    /// window budget, including on the request that triggers denial, so
    /// denied retries never reset the window early or ride for free.
    ///
    /// Never errors: if the counter store is unreachable, the decision is
    /// to fail open rather than block all traffic on a governance outage.
    /// That weakens protection during outages and is logged every time.
    pub async fn admit(
        &self,
        scope: &RateLimitScope,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> AdmitDecision {
        let key = format!("{}:{}", scope.name, identifier);
        let now_ms = now.timestamp_millis();

        let entry = match self.store.incr(&key, scope.window_ms, now_ms).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    scope = %scope.name,
                    identifier = identifier,
                    error = %e,
                    "Counter store unreachable, failing open"
                );
                metrics::counter!("governance.counter_fail_open").increment(1);
                CounterEntry {
                    count: 1,
                    reset_at_ms: now_ms + scope.window_ms,
                }
            }
        };

        AdmitDecision {
            allowed: entry.count <= scope.max,
            limit: scope.max,
            remaining: scope.max.saturating_sub(entry.count),
            reset_at_ms: entry.reset_at_ms,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scope::scopes;
    use async_trait::async_trait;
    use botline_store::{MemoryStore, StoreError, StoreResult};
    use chrono::TimeZone;

    fn counter_with(max: u64, window_ms: i64) -> (WindowCounter, RateLimitScope) {
        let scope = RateLimitScope::new(scopes::FEED_POST, max, window_ms);
        let counter = WindowCounter::new(Arc::new(MemoryStore::new()), vec![scope.clone()]);
        (counter, scope)
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[tokio::test]
    async fn test_five_admitted_then_denied() {
        let (counter, scope) = counter_with(5, 60_000);
        let now = at_ms(1_000);

        for expected_remaining in [4, 3, 2, 1, 0] {
            let decision = counter.admit(&scope, "ip1", now).await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 5);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let sixth = counter.admit(&scope, "ip1", now).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset_at_ms, 61_000);
    }

    #[tokio::test]
    async fn test_budget_returns_after_window() {
        let (counter, scope) = counter_with(2, 60_000);

        assert!(counter.admit(&scope, "ip1", at_ms(0)).await.allowed);
        assert!(counter.admit(&scope, "ip1", at_ms(10)).await.allowed);
        assert!(!counter.admit(&scope, "ip1", at_ms(20)).await.allowed);

        // One past the boundary: a fresh window with the full budget.
        let fresh = counter.admit(&scope, "ip1", at_ms(60_001)).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    }

    #[tokio::test]
    async fn test_denied_requests_still_consume_budget() {
        let (counter, scope) = counter_with(1, 60_000);

        assert!(counter.admit(&scope, "ip1", at_ms(0)).await.allowed);
        // Hammering while denied must not grant a free slot mid-window.
        for _ in 0..10 {
            assert!(!counter.admit(&scope, "ip1", at_ms(100)).await.allowed);
        }
    }

    #[tokio::test]
    async fn test_identifiers_do_not_share_budget() {
        let (counter, scope) = counter_with(1, 60_000);
        let now = at_ms(0);

        assert!(counter.admit(&scope, "ip1", now).await.allowed);
        assert!(!counter.admit(&scope, "ip1", now).await.allowed);
        assert!(counter.admit(&scope, "ip2", now).await.allowed);
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_budget() {
        let feed = RateLimitScope::new(scopes::FEED_POST, 1, 60_000);
        let dm = RateLimitScope::new(scopes::DIRECT_MESSAGE, 1, 60_000);
        let counter = WindowCounter::new(
            Arc::new(MemoryStore::new()),
            vec![feed.clone(), dm.clone()],
        );
        let now = at_ms(0);

        assert!(counter.admit(&feed, "ip1", now).await.allowed);
        assert!(!counter.admit(&feed, "ip1", now).await.allowed);
        assert!(counter.admit(&dm, "ip1", now).await.allowed);
    }

    #[tokio::test]
    async fn test_retry_after_rounds_up() {
        let decision = AdmitDecision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_at_ms: 61_000,
        };
        assert_eq!(decision.retry_after_secs(at_ms(59_500)), 2);
        assert_eq!(decision.retry_after_secs(at_ms(60_999)), 1);
        // Window already lapsed: still advertise a 1s wait.
        assert_eq!(decision.retry_after_secs(at_ms(62_000)), 1);
    }

    struct UnreachableCounter;

    #[async_trait]
    impl botline_store::CounterStore for UnreachableCounter {
        async fn incr(&self, _key: &str, _window_ms: i64, _now_ms: i64) -> StoreResult<CounterEntry> {
            Err(StoreError::Timeout(250))
        }
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let scope = RateLimitScope::new(scopes::FEED_POST, 5, 60_000);
        let counter = WindowCounter::new(Arc::new(UnreachableCounter), vec![scope.clone()]);

        // Every request is admitted while the store is down.
        for _ in 0..20 {
            let decision = counter.admit(&scope, "ip1", at_ms(0)).await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 5);
        }
    }
}
