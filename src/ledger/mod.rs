//! Credit ledger: holds, debits, credits.
//!
//! Every mutation goes through the repository's atomic `apply_transaction`,
//! which pairs the balance update with the ledger row in one database
//! transaction behind a compare-and-set guard. Insufficient credit is a
//! normal negative result, not an error.

use crate::db::repo::ApplyTransactionError;
use crate::db::Repository;
use crate::domain::{Credits, CreditTransaction, OpportunityId, TransactionKind, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
    #[error("concurrent balance update for user {0}")]
    Conflict(UserId),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<ApplyTransactionError> for LedgerError {
    fn from(err: ApplyTransactionError) -> Self {
        match err {
            ApplyTransactionError::UnknownUser(id) => LedgerError::UnknownUser(id),
            ApplyTransactionError::Conflict(id) => LedgerError::Conflict(id),
            ApplyTransactionError::Db(e) => LedgerError::Db(e),
        }
    }
}

#[derive(Clone)]
pub struct CreditLedger {
    repo: Arc<Repository>,
}

impl CreditLedger {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Take a provisional charge before attempting a paid action.
    ///
    /// Returns `Ok(false)` with zero side effects when the balance does not
    /// cover the amount; the caller skips the placement.
    pub async fn hold(
        &self,
        user_id: UserId,
        amount: Credits,
        opportunity_id: OpportunityId,
    ) -> Result<bool, LedgerError> {
        let balance = self
            .repo
            .get_balance(user_id)
            .await?
            .ok_or(LedgerError::UnknownUser(user_id))?;
        if balance < amount {
            info!(%user_id, %opportunity_id, balance = %balance, needed = %amount, "hold refused");
            return Ok(false);
        }

        self.repo
            .apply_transaction(
                user_id,
                TransactionKind::Hold,
                -amount,
                &format!("Hold for placement of opportunity {}", opportunity_id),
                Some(opportunity_id),
                None,
            )
            .await?;
        Ok(true)
    }

    /// Unconditional balance decrease.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Credits,
        description: &str,
        opportunity_id: Option<OpportunityId>,
    ) -> Result<CreditTransaction, LedgerError> {
        Ok(self
            .repo
            .apply_transaction(
                user_id,
                TransactionKind::Debit,
                -amount,
                description,
                opportunity_id,
                None,
            )
            .await?)
    }

    /// Balance increase; `refund_reason` marks a reversal of a prior hold.
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Credits,
        description: &str,
        opportunity_id: Option<OpportunityId>,
        refund_reason: Option<&str>,
    ) -> Result<CreditTransaction, LedgerError> {
        Ok(self
            .repo
            .apply_transaction(
                user_id,
                TransactionKind::Credit,
                amount,
                description,
                opportunity_id,
                refund_reason,
            )
            .await?)
    }

    /// Reverse a prior hold of the same amount after a failed attempt.
    pub async fn refund_hold(
        &self,
        user_id: UserId,
        amount: Credits,
        opportunity_id: OpportunityId,
        reason: &str,
    ) -> Result<CreditTransaction, LedgerError> {
        self.credit(
            user_id,
            amount,
            &format!("Refund of placement hold for opportunity {}", opportunity_id),
            Some(opportunity_id),
            Some(reason),
        )
        .await
    }
}
