//! Wallet commands.

use common::{AggregateId, OwnerId};

use crate::command::Command;
use crate::money::Money;

use super::{PayoutDetails, Wallet, WithdrawalOutcome};

/// A credit or debit against one owner's wallet.
#[derive(Debug, Clone)]
pub struct Posting {
    pub owner_id: OwnerId,
    pub amount: Money,
    pub reason: String,

    /// Replaying a key returns the original entry and moves no money.
    pub idempotency_key: String,

    pub related_order_id: Option<AggregateId>,
}

impl Posting {
    pub fn new(
        owner_id: impl Into<OwnerId>,
        amount: Money,
        reason: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            amount,
            reason: reason.into(),
            idempotency_key: idempotency_key.into(),
            related_order_id: None,
        }
    }

    pub fn for_order(mut self, order_id: AggregateId) -> Self {
        self.related_order_id = Some(order_id);
        self
    }
}

impl Command for Posting {
    type Aggregate = Wallet;

    fn aggregate_id(&self) -> AggregateId {
        Wallet::id_for(self.owner_id)
    }
}

/// A request to pay part of the balance out to an external account.
#[derive(Debug, Clone)]
pub struct Withdraw {
    pub owner_id: OwnerId,
    pub amount: Money,
    pub idempotency_key: String,
    pub payout: PayoutDetails,
}

impl Withdraw {
    pub fn new(
        owner_id: impl Into<OwnerId>,
        amount: Money,
        idempotency_key: impl Into<String>,
        payout: PayoutDetails,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            amount,
            idempotency_key: idempotency_key.into(),
            payout,
        }
    }
}

impl Command for Withdraw {
    type Aggregate = Wallet;

    fn aggregate_id(&self) -> AggregateId {
        Wallet::id_for(self.owner_id)
    }
}

/// The payout processor's answer for a pending withdrawal.
#[derive(Debug, Clone)]
pub struct SettleWithdrawal {
    pub owner_id: OwnerId,
    pub idempotency_key: String,
    pub outcome: WithdrawalOutcome,
    pub reason: Option<String>,
}

impl SettleWithdrawal {
    pub fn succeeded(owner_id: impl Into<OwnerId>, idempotency_key: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            idempotency_key: idempotency_key.into(),
            outcome: WithdrawalOutcome::Succeeded,
            reason: None,
        }
    }

    pub fn failed(
        owner_id: impl Into<OwnerId>,
        idempotency_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            idempotency_key: idempotency_key.into(),
            outcome: WithdrawalOutcome::Failed,
            reason: Some(reason.into()),
        }
    }
}

impl Command for SettleWithdrawal {
    type Aggregate = Wallet;

    fn aggregate_id(&self) -> AggregateId {
        Wallet::id_for(self.owner_id)
    }
}
