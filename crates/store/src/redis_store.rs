//! Redis-backed governance store for multi-instance deployments.
//!
//! All three contracts map onto single atomic Redis operations: counters use
//! `INCR` + `PEXPIRE`, debits use a compare-and-decrement Lua script (the
//! `UPDATE ... WHERE balance >= ?` equivalent), and dedup inserts use
//! `SET NX`. Every call is bounded by the configured per-operation timeout;
//! the asymmetric outage policy (counter fails open, ledger fails closed)
//! lives with the callers in the governance crate, not here.

use crate::traits::{
    CounterEntry, CounterStore, DedupStore, InsertOutcome, LedgerStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use botline_core::config::RedisConfig;
use botline_core::types::FeedItem;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Deduct iff the balance covers the amount; report whether a row changed.
const DEBIT_SCRIPT: &str = r#"
local balance = redis.call('GET', KEYS[1])
if not balance then return 0 end
if tonumber(balance) < tonumber(ARGV[1]) then return 0 end
redis.call('DECRBY', KEYS[1], ARGV[1])
return 1
"#;

/// Shared store implementing all three governance contracts against Redis.
pub struct RedisStore {
    client: redis::Client,
    debit_script: redis::Script,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis and verify connectivity with a `PING`.
    pub async fn new(config: &RedisConfig) -> StoreResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis governance store");

        let client = redis::Client::open(url.as_str())?;

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut conn = tokio::time::timeout(connect_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout_ms))??;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            debit_script: redis::Script::new(DEBIT_SCRIPT),
            op_timeout: Duration::from_millis(config.op_timeout_ms),
        })
    }

    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Bound `fut` by the per-operation deadline.
    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.op_timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr(&self, key: &str, window_ms: i64, now_ms: i64) -> StoreResult<CounterEntry> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let key = format!("rl:{key}");

            let count: u64 = conn.incr(&key, 1u64).await?;
            if count == 1 {
                // First hit opens the window; Redis expiry is the reset.
                let _: i64 = conn.pexpire(&key, window_ms).await?;
            }

            let mut ttl_ms: i64 = conn.pttl(&key).await?;
            if ttl_ms < 0 {
                // Expiry was lost (key created without one, or PEXPIRE raced
                // an eviction). Re-arm it rather than leave the key immortal.
                let _: i64 = conn.pexpire(&key, window_ms).await?;
                ttl_ms = window_ms;
            }

            Ok(CounterEntry {
                count,
                reset_at_ms: now_ms + ttl_ms,
            })
        })
        .await
    }
}

#[async_trait]
impl LedgerStore for RedisStore {
    async fn create_if_absent(&self, username: &str, starting_balance: i64) -> StoreResult<bool> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let created: bool = conn.set_nx(format!("acct:{username}"), starting_balance).await?;
            Ok(created)
        })
        .await
    }

    async fn debit_if(&self, username: &str, amount: i64) -> StoreResult<bool> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let changed: i64 = self
                .debit_script
                .key(format!("acct:{username}"))
                .arg(amount)
                .invoke_async(&mut conn)
                .await?;
            Ok(changed == 1)
        })
        .await
    }

    async fn credit(&self, username: &str, amount: i64) -> StoreResult<()> {
        self.timed(async {
            let mut conn = self.conn().await?;
            // Credit only an existing account; INCRBY on a missing key would
            // resurrect deleted bots at a zero balance.
            let exists: bool = conn.exists(format!("acct:{username}")).await?;
            if exists {
                let _: i64 = conn.incr(format!("acct:{username}"), amount).await?;
            }
            Ok(())
        })
        .await
    }

    async fn balance(&self, username: &str) -> StoreResult<Option<i64>> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let balance: Option<i64> = conn.get(format!("acct:{username}")).await?;
            Ok(balance)
        })
        .await
    }
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn get(&self, hash: &str) -> StoreResult<Option<FeedItem>> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let json: Option<String> = conn.get(format!("item:{hash}")).await?;
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn insert_unique(&self, hash: &str, item: FeedItem) -> StoreResult<InsertOutcome> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let key = format!("item:{hash}");
            let json = serde_json::to_string(&item)?;

            let set: bool = conn.set_nx(&key, &json).await?;
            if set {
                return Ok(InsertOutcome::Created);
            }

            match conn.get::<_, Option<String>>(&key).await? {
                Some(prior) => Ok(InsertOutcome::Duplicate(serde_json::from_str(&prior)?)),
                // The conflicting record vanished between SET NX and GET;
                // treat our insert as the surviving one.
                None => {
                    let _: bool = conn.set_nx(&key, &json).await?;
                    Ok(InsertOutcome::Created)
                }
            }
        })
        .await
    }
}
