use botline_store::StoreError;
use thiserror::Error;

pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Failures the governance layer surfaces to callers. Rate-limit denials,
/// duplicates, and insufficient balance are not errors — they are
/// [`Decision`](crate::Decision) variants.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// The ledger's backing store could not be reached. Surfaced as
    /// service-unavailable: admitting unmetered spend is not an option.
    #[error("governance storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// A caller named a limiter family that was not configured at startup.
    #[error("unknown rate limit scope: {0}")]
    UnknownScope(String),
}
