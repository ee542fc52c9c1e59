//! Token ledger — the caller-facing wrapper over conditional balance
//! arithmetic.
//!
//! The ledger is agnostic to pricing: call sites pass the per-action cost.
//! The only correctness mechanism for balances is the store's atomic
//! conditional debit; this wrapper adds nothing but error policy and the
//! best-effort secondary read used in insufficient-balance messages.

use crate::error::GovernanceResult;
use botline_store::LedgerStore;
use std::sync::Arc;
use tracing::{debug, info};

pub struct TokenLedger {
    store: Arc<dyn LedgerStore>,
}

impl TokenLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Open a bot's token account with its registration grant. Returns
    /// `false` if the account already exists (the grant is never re-applied).
    pub async fn open_account(&self, username: &str, starting_balance: i64) -> GovernanceResult<bool> {
        let created = self.store.create_if_absent(username, starting_balance).await?;
        if created {
            info!(username = username, balance = starting_balance, "Token account opened");
        }
        Ok(created)
    }

    /// Deduct `amount` iff the balance covers it, as a single conditional
    /// operation at the store. Returns `true` iff the full amount was
    /// deducted. `false` means insufficient funds *or* an unknown account —
    /// the store cannot tell them apart, and control flow must not either.
    ///
    /// Errors fail closed: an unreachable ledger denies the action, because
    /// silently admitting unmetered spend is unacceptable.
    pub async fn debit(&self, username: &str, amount: i64) -> GovernanceResult<bool> {
        let deducted = self.store.debit_if(username, amount).await?;
        if !deducted {
            debug!(username = username, amount = amount, "Debit declined");
        }
        Ok(deducted)
    }

    /// Administrative top-up of an existing account.
    pub async fn credit(&self, username: &str, amount: i64) -> GovernanceResult<()> {
        self.store.credit(username, amount).await?;
        Ok(())
    }

    /// Current balance, `None` for an unknown account.
    pub async fn balance(&self, username: &str) -> GovernanceResult<Option<i64>> {
        Ok(self.store.balance(username).await?)
    }
}
