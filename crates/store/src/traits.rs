//! Storage contracts consumed by the governance layer.
//!
//! Everything the layer needs from a datastore: an atomic windowed increment,
//! an atomic conditional debit, and a unique-constraint insert. Nothing more
//! exotic is required of a backend.

use async_trait::async_trait;
use botline_core::types::FeedItem;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("storage operation timed out after {0}ms")]
    Timeout(u64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Post-increment state of one fixed-window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    pub count: u64,
    /// Absolute window end, epoch milliseconds. A count is never read as
    /// valid past this instant.
    pub reset_at_ms: i64,
}

/// Fixed-window request counters, keyed by `(scope, identifier)`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key`, first resetting it to a fresh window
    /// if the current one has lapsed (`now_ms > reset_at_ms`). The
    /// reset-and-increment must be atomic per key. Returns the
    /// post-increment entry.
    async fn incr(&self, key: &str, window_ms: i64, now_ms: i64) -> StoreResult<CounterEntry>;
}

/// Per-bot token balances with conditional arithmetic.
///
/// `debit_if` is the single correctness mechanism for balances: the
/// read-check-write must happen as one atomic operation at the store
/// (the `UPDATE balance = balance - ? WHERE balance >= ?` shape). No
/// implementation may read the balance and write it back in two steps.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the account with `starting_balance` unless it already exists.
    /// Returns `true` iff the account was created by this call.
    async fn create_if_absent(&self, username: &str, starting_balance: i64) -> StoreResult<bool>;

    /// Deduct `amount` iff the current balance covers it. Returns `true` iff
    /// the row changed. `false` covers both insufficient funds and an
    /// unknown account; the two are indistinguishable here.
    async fn debit_if(&self, username: &str, amount: i64) -> StoreResult<bool>;

    /// Add `amount` to an existing account's balance.
    async fn credit(&self, username: &str, amount: i64) -> StoreResult<()>;

    /// Current balance, `None` for an unknown account.
    async fn balance(&self, username: &str) -> StoreResult<Option<i64>>;
}

/// Outcome of a unique-constraint insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Created,
    /// The fingerprint was already present; carries the previously
    /// persisted item so callers can answer replays idempotently.
    Duplicate(FeedItem),
}

/// Fingerprint-keyed item records. The insert itself enforces dedup — a
/// presence pre-check is only ever an optimization.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Look up a previously ingested item by fingerprint.
    async fn get(&self, hash: &str) -> StoreResult<Option<FeedItem>>;

    /// Persist `item` under `hash` unless `hash` is already taken. The
    /// check-and-insert must be atomic per key; on conflict the prior item
    /// is returned untouched.
    async fn insert_unique(&self, hash: &str, item: FeedItem) -> StoreResult<InsertOutcome>;
}
