//! Wallet ledger events.

use chrono::{DateTime, Utc};
use common::{AggregateId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::PayoutDetails;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    /// Opened lazily by the first monetary event for the owner.
    WalletOpened(WalletOpenedData),

    WalletCredited(PostingData),

    WalletDebited(PostingData),

    /// Balance reserved for an external payout; the entry stays pending.
    WithdrawalRequested(WithdrawalRequestedData),

    WithdrawalSettled(WithdrawalSettledData),

    /// Payout failed. Always followed by a compensating credit.
    WithdrawalFailed(WithdrawalFailedData),
}

impl DomainEvent for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletOpened(_) => "WalletOpened",
            WalletEvent::WalletCredited(_) => "WalletCredited",
            WalletEvent::WalletDebited(_) => "WalletDebited",
            WalletEvent::WithdrawalRequested(_) => "WithdrawalRequested",
            WalletEvent::WithdrawalSettled(_) => "WithdrawalSettled",
            WalletEvent::WithdrawalFailed(_) => "WithdrawalFailed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletOpenedData {
    pub wallet_id: AggregateId,
    pub owner_id: OwnerId,
    pub opened_at: DateTime<Utc>,
}

/// A completed credit or debit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingData {
    pub key: String,
    pub amount: Money,
    pub reason: String,
    pub related_order_id: Option<AggregateId>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequestedData {
    pub key: String,
    pub amount: Money,
    pub reason: String,
    pub payout: PayoutDetails,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalSettledData {
    pub key: String,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalFailedData {
    pub key: String,
    pub reason: Option<String>,
    pub failed_at: DateTime<Utc>,
}

impl WalletEvent {
    pub fn opened(wallet_id: AggregateId, owner_id: OwnerId) -> Self {
        WalletEvent::WalletOpened(WalletOpenedData {
            wallet_id,
            owner_id,
            opened_at: Utc::now(),
        })
    }

    pub fn credited(
        key: impl Into<String>,
        amount: Money,
        reason: impl Into<String>,
        related_order_id: Option<AggregateId>,
    ) -> Self {
        WalletEvent::WalletCredited(PostingData {
            key: key.into(),
            amount,
            reason: reason.into(),
            related_order_id,
            recorded_at: Utc::now(),
        })
    }

    pub fn debited(
        key: impl Into<String>,
        amount: Money,
        reason: impl Into<String>,
        related_order_id: Option<AggregateId>,
    ) -> Self {
        WalletEvent::WalletDebited(PostingData {
            key: key.into(),
            amount,
            reason: reason.into(),
            related_order_id,
            recorded_at: Utc::now(),
        })
    }

    pub fn withdrawal_requested(
        key: impl Into<String>,
        amount: Money,
        reason: impl Into<String>,
        payout: PayoutDetails,
    ) -> Self {
        WalletEvent::WithdrawalRequested(WithdrawalRequestedData {
            key: key.into(),
            amount,
            reason: reason.into(),
            payout,
            requested_at: Utc::now(),
        })
    }

    pub fn withdrawal_settled(key: impl Into<String>) -> Self {
        WalletEvent::WithdrawalSettled(WithdrawalSettledData {
            key: key.into(),
            settled_at: Utc::now(),
        })
    }

    pub fn withdrawal_failed(key: impl Into<String>, reason: Option<String>) -> Self {
        WalletEvent::WithdrawalFailed(WithdrawalFailedData {
            key: key.into(),
            reason,
            failed_at: Utc::now(),
        })
    }
}
