//! In-process governance store backed by DashMap for lock-free concurrent
//! access. Correct for a single service instance; counters and balances are
//! not shared across processes.
//!
//! Atomicity comes from DashMap's per-key entry locking: every
//! read-check-write below happens while holding the entry's shard lock, so
//! racing requests for the same key serialize at the map.

use crate::traits::{
    CounterEntry, CounterStore, DedupStore, InsertOutcome, LedgerStore, StoreResult,
};
use async_trait::async_trait;
use botline_core::types::FeedItem;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Single-instance store implementing all three governance contracts.
#[derive(Default)]
pub struct MemoryStore {
    counters: DashMap<String, CounterEntry>,
    accounts: DashMap<String, i64>,
    items: DashMap<String, FeedItem>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted items. Test observability only.
    pub fn items_len(&self) -> usize {
        self.items.len()
    }

    /// Drop counter entries whose window has lapsed. Call periodically from
    /// a background task; correctness never depends on it.
    pub fn evict_expired_counters(&self, now_ms: i64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, entry| now_ms <= entry.reset_at_ms);
        before - self.counters.len()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr(&self, key: &str, window_ms: i64, now_ms: i64) -> StoreResult<CounterEntry> {
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                reset_at_ms: now_ms + window_ms,
            });
        if now_ms > entry.reset_at_ms {
            entry.count = 0;
            entry.reset_at_ms = now_ms + window_ms;
        }
        entry.count += 1;
        Ok(*entry)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_if_absent(&self, username: &str, starting_balance: i64) -> StoreResult<bool> {
        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(starting_balance);
                Ok(true)
            }
        }
    }

    async fn debit_if(&self, username: &str, amount: i64) -> StoreResult<bool> {
        // get_mut holds the entry's write lock across check and decrement.
        match self.accounts.get_mut(username) {
            Some(mut balance) if *balance >= amount => {
                *balance -= amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit(&self, username: &str, amount: i64) -> StoreResult<()> {
        if let Some(mut balance) = self.accounts.get_mut(username) {
            *balance = balance.saturating_add(amount);
        }
        Ok(())
    }

    async fn balance(&self, username: &str) -> StoreResult<Option<i64>> {
        Ok(self.accounts.get(username).map(|b| *b))
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn get(&self, hash: &str) -> StoreResult<Option<FeedItem>> {
        Ok(self.items.get(hash).map(|item| item.clone()))
    }

    async fn insert_unique(&self, hash: &str, item: FeedItem) -> StoreResult<InsertOutcome> {
        match self.items.entry(hash.to_string()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Duplicate(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(item);
                Ok(InsertOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn item(bot: &str, content: &str, fingerprint: &str) -> FeedItem {
        FeedItem {
            id: Uuid::new_v4(),
            bot: bot.to_string(),
            content: content.to_string(),
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_counter_window_reset() {
        let store = MemoryStore::new();

        let first = store.incr("feed-post:ip1", 60_000, 1_000).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.reset_at_ms, 61_000);

        let second = store.incr("feed-post:ip1", 60_000, 2_000).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_at_ms, 61_000);

        // Past the window boundary: fresh window, count restarts.
        let third = store.incr("feed-post:ip1", 60_000, 61_001).await.unwrap();
        assert_eq!(third.count, 1);
        assert_eq!(third.reset_at_ms, 121_001);
    }

    #[tokio::test]
    async fn test_counter_keys_are_independent() {
        let store = MemoryStore::new();

        store.incr("feed-post:ip1", 60_000, 0).await.unwrap();
        store.incr("feed-post:ip1", 60_000, 0).await.unwrap();
        let other = store.incr("feed-post:ip2", 60_000, 0).await.unwrap();

        assert_eq!(other.count, 1);
    }

    #[tokio::test]
    async fn test_evict_expired_counters() {
        let store = MemoryStore::new();
        store.incr("feed-post:ip1", 60_000, 0).await.unwrap();
        store.incr("feed-post:ip2", 60_000, 50_000).await.unwrap();

        assert_eq!(store.evict_expired_counters(70_000), 1);
        // The surviving window is untouched.
        let entry = store.incr("feed-post:ip2", 60_000, 70_000).await.unwrap();
        assert_eq!(entry.count, 2);
    }

    #[tokio::test]
    async fn test_debit_is_conditional() {
        let store = MemoryStore::new();
        assert!(store.create_if_absent("echo-bot", 10).await.unwrap());
        assert!(!store.create_if_absent("echo-bot", 999).await.unwrap());

        assert!(store.debit_if("echo-bot", 7).await.unwrap());
        assert!(!store.debit_if("echo-bot", 4).await.unwrap());
        assert_eq!(store.balance("echo-bot").await.unwrap(), Some(3));

        // Unknown account looks the same as insufficient funds.
        assert!(!store.debit_if("ghost", 1).await.unwrap());
        assert_eq!(store.balance("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_credit_ignores_unknown_account() {
        let store = MemoryStore::new();
        store.credit("ghost", 50).await.unwrap();
        assert_eq!(store.balance("ghost").await.unwrap(), None);

        store.create_if_absent("echo-bot", 1).await.unwrap();
        store.credit("echo-bot", 50).await.unwrap();
        assert_eq!(store.balance("echo-bot").await.unwrap(), Some(51));
    }

    #[tokio::test]
    async fn test_credit_saturates_instead_of_overflowing() {
        let store = MemoryStore::new();
        store.create_if_absent("echo-bot", i64::MAX - 10).await.unwrap();
        store.credit("echo-bot", 100).await.unwrap();
        assert_eq!(store.balance("echo-bot").await.unwrap(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_insert_unique_returns_prior_on_conflict() {
        let store = MemoryStore::new();
        let first = item("echo-bot", "hello world", "fp-1");
        let first_id = first.id;

        match store.insert_unique("fp-1", first).await.unwrap() {
            InsertOutcome::Created => {}
            InsertOutcome::Duplicate(_) => panic!("first insert must create"),
        }

        let replay = item("echo-bot", "hello world", "fp-1");
        match store.insert_unique("fp-1", replay).await.unwrap() {
            InsertOutcome::Duplicate(prior) => assert_eq!(prior.id, first_id),
            InsertOutcome::Created => panic!("second insert must conflict"),
        }

        assert_eq!(store.items_len(), 1);
        assert_eq!(store.get("fp-1").await.unwrap().unwrap().id, first_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_debits_never_overdraw() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.create_if_absent("echo-bot", 35).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.debit_if("echo-bot", 10).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(store.balance("echo-bot").await.unwrap(), Some(5));
    }
}
