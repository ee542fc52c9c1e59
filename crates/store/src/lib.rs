#![warn(clippy::unwrap_used)]

//! Pluggable storage for the resource governance layer.
//!
//! Three narrow contracts — fixed-window counters, conditional balance
//! arithmetic, and unique-constraint inserts — with two implementations:
//! an in-process DashMap store (single instance, tests) and a Redis store
//! (multi-instance production). Correctness under concurrent requests rests
//! on these stores, never on locking at call sites.

pub mod memory;
pub mod redis_store;
pub mod traits;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::{
    CounterEntry, CounterStore, DedupStore, InsertOutcome, LedgerStore, StoreError, StoreResult,
};
