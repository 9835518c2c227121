//! Ledger entry value objects.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Credit => "credit",
            EntryDirection::Debit => "debit",
        }
    }
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a ledger entry. Only withdrawals ever sit in `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    Pending,
    Success,
    Failed,
}

impl EntryState {
    /// Settled entries never change again.
    pub fn is_final(&self) -> bool {
        !matches!(self, EntryState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "PENDING",
            EntryState::Success => "SUCCESS",
            EntryState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a withdrawal is paid out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDetails {
    /// e.g. `bank_transfer` or `mobile_money`.
    pub method: String,
    pub account: String,
}

impl PayoutDetails {
    pub fn new(method: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            account: account.into(),
        }
    }
}

/// Result reported by the payout processor for a pending withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    Succeeded,
    Failed,
}

/// One line of a wallet's append-only ledger.
///
/// The idempotency key doubles as the entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub direction: EntryDirection,
    pub amount: Money,
    pub reason: String,
    pub related_order_id: Option<AggregateId>,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,

    /// Present on withdrawals only.
    pub payout: Option<PayoutDetails>,
}

impl LedgerEntry {
    pub fn is_withdrawal(&self) -> bool {
        self.payout.is_some()
    }

    /// Signed effect of this entry on the balance when it was recorded.
    ///
    /// Debits of every state reduced the balance; failed withdrawals are
    /// restored by a separate compensating credit.
    pub fn balance_effect(&self) -> Money {
        match (self.direction, self.state) {
            (EntryDirection::Credit, EntryState::Success) => self.amount,
            (EntryDirection::Credit, _) => Money::zero(),
            (EntryDirection::Debit, _) => Money::zero() - self.amount,
        }
    }
}
