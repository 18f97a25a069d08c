//! # Ledger
//!
//! Owns every balance change. A customer's fees come out of their wallet, a
//! supplier's out of their bid balance; admins hold no balance.
//!
//! Each change is one conditional store write that both moves the balance and
//! appends the matching [`Transaction`], so a balance always equals the sum of
//! its history. The write only lands if the balance is still the one the
//! decision was taken against; otherwise the user is re-read and the decision
//! is taken again.

use tracing::{error, info, warn};

use crate::errors::{MarketError, Result, StoreError};
use crate::events::{Notification, NotificationKind};
use crate::rbac::{self, load_user};
use crate::types::{Amount, BalancePool, Id, NewTransaction, Transaction, TransactionKind, User};
use crate::Marketplace;

/// Attempts before a contended balance write gives up.
const MAX_COMMIT_ATTEMPTS: usize = 3;

fn pool_of(user: &User) -> Result<BalancePool> {
    BalancePool::for_role(user.role).ok_or_else(|| {
        MarketError::AccountNotEligible(format!("user {} holds no balance", user.id))
    })
}

impl Marketplace {
    /// Remove `amount` from the user's pool, failing if it does not cover it.
    pub async fn debit(
        &self,
        user_id: Id,
        amount: Amount,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(amount));
        }
        let description = description.into();

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let user = load_user(self.store(), user_id).await?;
            let pool = pool_of(&user)?;
            let available = user.balance(pool);
            if available < amount {
                warn!(user_id, amount, available, "debit rejected: insufficient balance");
                return Err(MarketError::InsufficientBalance {
                    required: amount,
                    available,
                });
            }

            let entry = NewTransaction {
                amount: -amount,
                kind,
                description: description.clone(),
                created_at: self.now(),
            };
            match self
                .store()
                .commit_ledger_entry(user_id, pool, available, entry)
                .await?
            {
                Some(tx) => {
                    info!(user_id, amount, kind = kind.as_str(), tx_id = tx.id, "debit committed");
                    return Ok(tx);
                }
                None => warn!(user_id, attempt, "balance moved during debit; re-reading"),
            }
        }

        Err(contended(user_id))
    }

    /// Add `amount` to the user's pool.
    pub async fn credit(
        &self,
        user_id: Id,
        amount: Amount,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(amount));
        }
        let description = description.into();

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let user = load_user(self.store(), user_id).await?;
            let pool = pool_of(&user)?;
            let current = user.balance(pool);
            if current.checked_add(amount).is_none() {
                return Err(MarketError::InvalidAmount(amount));
            }

            let entry = NewTransaction {
                amount,
                kind,
                description: description.clone(),
                created_at: self.now(),
            };
            match self
                .store()
                .commit_ledger_entry(user_id, pool, current, entry)
                .await?
            {
                Some(tx) => {
                    info!(user_id, amount, kind = kind.as_str(), tx_id = tx.id, "credit committed");
                    return Ok(tx);
                }
                None => warn!(user_id, attempt, "balance moved during credit; re-reading"),
            }
        }

        Err(contended(user_id))
    }

    /// Self-service deposit into the caller's own pool.
    pub async fn top_up(&self, user_id: Id, amount: Amount) -> Result<Transaction> {
        let user = load_user(self.store(), user_id).await?;
        rbac::require_active(&user)?;
        self.credit(user_id, amount, TransactionKind::Deposit, "Balance top-up")
            .await
    }

    /// Admin-issued credit, e.g. a goodwill adjustment.
    pub async fn admin_credit(
        &self,
        admin_id: Id,
        user_id: Id,
        amount: Amount,
        description: impl Into<String>,
    ) -> Result<Transaction> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;

        let tx = self
            .credit(user_id, amount, TransactionKind::AdminCredit, description)
            .await?;
        self.emit(Notification::new(
            user_id,
            NotificationKind::BalanceCredited,
            format!("An administrator credited {amount} to your balance"),
        ))
        .await;
        Ok(tx)
    }

    /// The user's ledger history, oldest first.
    pub async fn transactions(&self, user_id: Id) -> Result<Vec<Transaction>> {
        load_user(self.store(), user_id).await?;
        Ok(self.store().transactions(user_id).await?)
    }

    /// Debit `fee` if one is configured. `Ok(None)` when the fee is zero.
    pub(crate) async fn charge_fee(
        &self,
        user_id: Id,
        fee: Amount,
        kind: TransactionKind,
        description: String,
    ) -> Result<Option<Transaction>> {
        if fee <= 0 {
            return Ok(None);
        }
        self.debit(user_id, fee, kind, description).await.map(Some)
    }

    /// Return a collected fee after the write it paid for failed.
    pub(crate) async fn refund_fee(&self, fee_tx: Option<&Transaction>, reason: &str) {
        let Some(fee_tx) = fee_tx else {
            return;
        };
        let amount = -fee_tx.amount;
        if let Err(e) = self
            .credit(
                fee_tx.user_id,
                amount,
                TransactionKind::Refund,
                format!("Refund of transaction {}: {reason}", fee_tx.id),
            )
            .await
        {
            error!(
                user_id = fee_tx.user_id,
                fee_tx = fee_tx.id,
                "fee refund failed: {e}"
            );
        }
    }
}

fn contended(user_id: Id) -> MarketError {
    MarketError::Store(StoreError::Conflict(format!(
        "balance of user {user_id} kept changing; giving up after {MAX_COMMIT_ATTEMPTS} attempts"
    )))
}
