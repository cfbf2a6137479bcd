//! Credit ledger entry types.

use crate::domain::{Credits, OpportunityId, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Kind of ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Provisional charge taken before attempting a paid action.
    Hold,
    /// Balance increase (refunds, earnings).
    Credit,
    /// Balance decrease.
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Hold => "hold",
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hold" => Some(TransactionKind::Hold),
            "credit" => Some(TransactionKind::Credit),
            "debit" => Some(TransactionKind::Debit),
            _ => None,
        }
    }
}

/// Append-only ledger row.
///
/// `balance_after` must always equal `balance_before + amount`; the user's
/// denormalized balance equals the running sum of their rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed amount: negative for holds/debits, positive for credits.
    pub amount: Credits,
    pub balance_before: Credits,
    pub balance_after: Credits,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<OpportunityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    pub created_at: TimeMs,
}
