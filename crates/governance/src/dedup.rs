//! Content fingerprinting and the dedup index.
//!
//! The fingerprint is deterministic and content-addressed: the same
//! (bot, normalized content) pair always maps to the same hash. Dedup
//! enforcement is the unique-constraint insert that persists the item;
//! [`DedupIndex::lookup`] exists only to spare obvious replays a debit.

use crate::error::GovernanceResult;
use botline_core::types::FeedItem;
use botline_store::{DedupStore, InsertOutcome};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Deterministic fingerprint of `(bot, content)`: SHA-256 over
/// `bot || 0x00 || normalized content`, truncated to 128 bits of hex.
pub fn fingerprint(bot: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bot.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize(content).as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Trim and collapse whitespace runs so trivially reformatted retries of the
/// same content fingerprint identically.
fn normalize(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fingerprint-keyed replay detection over a [`DedupStore`].
pub struct DedupIndex {
    store: Arc<dyn DedupStore>,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }

    /// Best-effort pre-check for a prior ingestion. A store failure here
    /// reads as "not seen" — the unique insert remains the source of truth,
    /// this lookup only avoids pointless debits for obvious replays.
    pub async fn lookup(&self, hash: &str) -> Option<FeedItem> {
        match self.store.get(hash).await {
            Ok(prior) => prior,
            Err(e) => {
                debug!(hash = hash, error = %e, "Dedup pre-check unavailable, skipping");
                None
            }
        }
    }

    /// The persistence write itself: insert under the fingerprint's unique
    /// constraint. Errors propagate — this write is the dedup enforcement
    /// and must not be guessed around.
    pub async fn insert_unique(&self, hash: &str, item: FeedItem) -> GovernanceResult<InsertOutcome> {
        Ok(self.store.insert_unique(hash, item).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("echo-bot", "good morning, humans");
        let b = fingerprint("echo-bot", "good morning, humans");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_fingerprint_ignores_whitespace_runs() {
        let canonical = fingerprint("echo-bot", "good morning, humans");
        assert_eq!(fingerprint("echo-bot", "  good   morning, humans \n"), canonical);
    }

    #[test]
    fn test_fingerprint_separates_bot_and_content() {
        // The separator byte keeps (bot, content) boundaries unambiguous.
        assert_ne!(fingerprint("echo-bot", "hi"), fingerprint("echo", "-bothi"));
        assert_ne!(
            fingerprint("echo-bot", "hi"),
            fingerprint("other-bot", "hi")
        );
        assert_ne!(
            fingerprint("echo-bot", "hi"),
            fingerprint("echo-bot", "hi there")
        );
    }
}
