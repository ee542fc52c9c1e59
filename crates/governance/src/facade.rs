//! Governance facade — the single entry point collaborators call: "may this
//! caller act now, and if so, charge them and record the action as done."
//!
//! The sequencing is load-bearing and must not be reordered:
//! 1. window counter admission (unreachable store fails open, logged);
//! 2. dedup pre-check, ingestion paths only — replays are free;
//! 3. conditional debit (unreachable store fails closed);
//! 4. admitted — the caller performs the effectful write under the
//!    fingerprint's unique constraint.
//!
//! A caller denied for insufficient balance keeps the counter increment from
//! step 1: failing to afford an action still spends rate budget, which
//! closes the cheap retry-storm hole.

use crate::dedup::DedupIndex;
use crate::error::{GovernanceError, GovernanceResult};
use crate::ledger::TokenLedger;
use crate::window::{AdmitDecision, WindowCounter};
use botline_core::types::FeedItem;
use botline_store::InsertOutcome;
use chrono::Utc;
use tracing::{error, info};

/// Typed outcome of one admission request. Every variant carries the window
/// counter's view so the HTTP layer can emit `X-RateLimit-*` headers on all
/// governed responses.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Proceed with the effectful write; the fee (if any) is already charged.
    Admitted { limits: AdmitDecision },
    /// Over budget for this window. Recoverable after `retry_after_secs`.
    RateLimited {
        retry_after_secs: u64,
        limits: AdmitDecision,
    },
    /// Already ingested — not an error. Carries the prior item so replayed
    /// deliveries observe idempotent success, free of charge.
    Duplicate {
        prior: FeedItem,
        limits: AdmitDecision,
    },
    /// The conditional debit declined. `actual` comes from a best-effort
    /// secondary read for user feedback only and may be stale.
    InsufficientBalance {
        required: i64,
        actual: i64,
        limits: AdmitDecision,
    },
}

impl Decision {
    pub fn limits(&self) -> &AdmitDecision {
        match self {
            Decision::Admitted { limits }
            | Decision::RateLimited { limits, .. }
            | Decision::Duplicate { limits, .. }
            | Decision::InsufficientBalance { limits, .. } => limits,
        }
    }
}

/// Composes the window counter, token ledger, and dedup index into one
/// admission decision per inbound request.
pub struct Governor {
    window: WindowCounter,
    ledger: TokenLedger,
    dedup: DedupIndex,
}

impl Governor {
    pub fn new(window: WindowCounter, ledger: TokenLedger, dedup: DedupIndex) -> Self {
        info!("Governor initialized");
        Self {
            window,
            ledger,
            dedup,
        }
    }

    /// Decide admission for one request and charge the fee if admitted.
    ///
    /// `identifier` keys the rate limiter (caller IP, API key, or bot
    /// username); `bot` keys the token account; `amount` is the per-action
    /// fee (0 for unbilled operations); `fingerprint` is supplied on
    /// ingestion paths only.
    pub async fn authorize_and_charge(
        &self,
        scope_name: &str,
        identifier: &str,
        bot: &str,
        amount: i64,
        fingerprint: Option<&str>,
    ) -> GovernanceResult<Decision> {
        let scope = self
            .window
            .scope(scope_name)
            .ok_or_else(|| GovernanceError::UnknownScope(scope_name.to_string()))?
            .clone();
        let now = Utc::now();

        // 1. Admission. Cheapest check first; a denial touches nothing else.
        let limits = self.window.admit(&scope, identifier, now).await;
        if !limits.allowed {
            metrics::counter!("governance.rate_limited").increment(1);
            return Ok(Decision::RateLimited {
                retry_after_secs: limits.retry_after_secs(now),
                limits,
            });
        }

        // 2. Replay pre-check. A known fingerprint short-circuits before the
        // ledger so re-delivered webhooks are free and side-effect-free.
        if let Some(hash) = fingerprint {
            if let Some(prior) = self.dedup.lookup(hash).await {
                metrics::counter!("governance.duplicate_replay").increment(1);
                return Ok(Decision::Duplicate { prior, limits });
            }
        }

        // 3. Charge. Fail closed on a store error (unlike the counter above):
        // admitting unmetered spend during an outage is not acceptable, so
        // the `?` surfaces StorageUnavailable and the request dies here.
        if amount > 0 && !self.ledger.debit(bot, amount).await? {
            // The counter increment from step 1 is deliberately kept.
            let actual = match self.ledger.balance(bot).await {
                Ok(balance) => balance.unwrap_or(0),
                Err(_) => 0,
            };
            metrics::counter!("governance.insufficient_balance").increment(1);
            return Ok(Decision::InsufficientBalance {
                required: amount,
                actual,
                limits,
            });
        }

        metrics::counter!("governance.admitted").increment(1);
        Ok(Decision::Admitted { limits })
    }

    /// Perform the effectful write for an admitted ingestion: insert the item
    /// under its fingerprint's unique constraint.
    ///
    /// Two racing deliveries of the same payload can both pass the pre-check
    /// and both get charged; the insert picks the single winner. The loser's
    /// fee is refunded here so a replay never costs twice. An insert that
    /// errors outright persisted nothing, so that fee comes back too before
    /// the outage surfaces to the caller.
    pub async fn commit_ingest(
        &self,
        hash: &str,
        item: FeedItem,
        bot: &str,
        amount: i64,
    ) -> GovernanceResult<InsertOutcome> {
        let outcome = match self.dedup.insert_unique(hash, item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("governance.ingest_write_failed").increment(1);
                self.refund(bot, amount, "ingest store error").await;
                return Err(e);
            }
        };
        if let InsertOutcome::Duplicate(_) = &outcome {
            metrics::counter!("governance.ingest_race_lost").increment(1);
            self.refund(bot, amount, "lost ingest race").await;
        }
        Ok(outcome)
    }

    /// Hand a charged fee back when the admitted action did not complete.
    /// If the refund itself fails the bot stays out one fee until an
    /// operator reconciles; the discrepancy is logged for that.
    async fn refund(&self, bot: &str, amount: i64, reason: &str) {
        if amount == 0 {
            return;
        }
        if let Err(e) = self.ledger.credit(bot, amount).await {
            error!(bot = bot, amount = amount, reason = reason, error = %e, "Failed to refund fee");
        }
    }

    /// Open a bot's token account with its registration grant.
    pub async fn open_account(&self, username: &str, starting_balance: i64) -> GovernanceResult<bool> {
        self.ledger.open_account(username, starting_balance).await
    }

    /// Administrative top-up.
    pub async fn credit(&self, username: &str, amount: i64) -> GovernanceResult<()> {
        self.ledger.credit(username, amount).await
    }

    /// Current balance, `None` for an unknown account.
    pub async fn balance(&self, username: &str) -> GovernanceResult<Option<i64>> {
        self.ledger.balance(username).await
    }
}
