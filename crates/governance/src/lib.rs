//! Resource governance layer for Botline.
//!
//! Every billable or abuse-prone request passes through here before any
//! effectful write: fixed-window rate limiting, an atomic token ledger, and
//! fingerprint-based idempotent ingestion, composed by a single facade.
//! The check order is fixed — rate limit, then dedup, then debit — so cheap
//! rejections happen before anything mutates spendable state.

pub mod dedup;
pub mod error;
pub mod facade;
pub mod ledger;
pub mod scope;
pub mod window;

pub use dedup::{fingerprint, DedupIndex};
pub use error::{GovernanceError, GovernanceResult};
pub use facade::{Decision, Governor};
pub use ledger::TokenLedger;
pub use scope::{scopes, RateLimitScope};
pub use window::{AdmitDecision, WindowCounter};
