//! Wallet service: authorization, idempotent replays and ledger metrics.

use common::{Actor, OwnerId};
use event_store::EventStore;
use serde::Serialize;

use crate::command::{Command, CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::locks::AggregateLocks;
use crate::money::Money;

use super::{
    EntryDirection, LedgerEntry, Posting, SettleWithdrawal, Wallet, WalletError, Withdraw,
    WithdrawalOutcome,
};

/// What a ledger call returns, whether it ran now or was a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    pub balance: Money,

    /// True when the idempotency key had already been recorded.
    pub replayed: bool,
}

pub struct WalletService<S: EventStore> {
    handler: CommandHandler<S, Wallet>,
}

impl<S: EventStore + Clone> Clone for WalletService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<S: EventStore> WalletService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_locks(store: S, locks: AggregateLocks) -> Self {
        Self {
            handler: CommandHandler::with_locks(store, locks),
        }
    }

    /// Credits a wallet, opening it if needed. Admin and system only.
    #[tracing::instrument(skip(self, posting, actor), fields(owner_id = %posting.owner_id, key = %posting.idempotency_key))]
    pub async fn credit(
        &self,
        posting: Posting,
        actor: &Actor,
    ) -> Result<LedgerReceipt, DomainError> {
        require_privileged(actor, "credit a wallet")?;

        let result = self
            .handler
            .execute_with_snapshot(posting.aggregate_id(), |wallet| wallet.credit(&posting))
            .await?;

        receipt(
            result,
            &posting.idempotency_key,
            EntryDirection::Credit,
            posting.amount,
        )
    }

    /// Debits a wallet. The balance check and the decrement happen under
    /// the wallet's lock and a versioned append. Admin and system only.
    #[tracing::instrument(skip(self, posting, actor), fields(owner_id = %posting.owner_id, key = %posting.idempotency_key))]
    pub async fn debit(
        &self,
        posting: Posting,
        actor: &Actor,
    ) -> Result<LedgerReceipt, DomainError> {
        require_privileged(actor, "debit a wallet")?;

        let result = self
            .handler
            .execute_with_snapshot(posting.aggregate_id(), |wallet| wallet.debit(&posting))
            .await?;

        receipt(
            result,
            &posting.idempotency_key,
            EntryDirection::Debit,
            posting.amount,
        )
    }

    /// Reserves funds for a payout. Only the owner or an admin may withdraw.
    #[tracing::instrument(skip(self, cmd, actor), fields(owner_id = %cmd.owner_id, key = %cmd.idempotency_key))]
    pub async fn withdraw(
        &self,
        cmd: Withdraw,
        actor: &Actor,
    ) -> Result<LedgerReceipt, DomainError> {
        require_owner(actor, cmd.owner_id, "withdraw")?;

        let result = self
            .handler
            .execute_with_snapshot(cmd.aggregate_id(), |wallet| wallet.withdraw(&cmd))
            .await?;

        receipt(
            result,
            &cmd.idempotency_key,
            EntryDirection::Debit,
            cmd.amount,
        )
    }

    /// Applies the payout processor's outcome to a pending withdrawal.
    #[tracing::instrument(skip(self, cmd, actor), fields(owner_id = %cmd.owner_id, key = %cmd.idempotency_key, outcome = ?cmd.outcome))]
    pub async fn settle_withdrawal(
        &self,
        cmd: SettleWithdrawal,
        actor: &Actor,
    ) -> Result<LedgerReceipt, DomainError> {
        require_privileged(actor, "settle a withdrawal")?;

        let result = self
            .handler
            .execute_with_snapshot(cmd.aggregate_id(), |wallet| wallet.settle_withdrawal(&cmd))
            .await?;

        let replayed = result.is_noop();
        if !replayed && cmd.outcome == WithdrawalOutcome::Failed {
            metrics::counter!("ledger_entries_total", "direction" => EntryDirection::Credit.as_str())
                .increment(1);
            tracing::warn!(reason = ?cmd.reason, "withdrawal failed, balance restored");
        }

        let entry = find_entry(&result.aggregate, &cmd.idempotency_key)?;
        Ok(LedgerReceipt {
            entry,
            balance: result.aggregate.balance(),
            replayed,
        })
    }

    /// Loads a wallet. `None` until the owner's first monetary event.
    pub async fn get_wallet(&self, owner_id: OwnerId) -> Result<Option<Wallet>, DomainError> {
        self.handler.load_existing(Wallet::id_for(owner_id)).await
    }

    /// Loads a wallet on behalf of `actor`, who must own it or be an admin.
    pub async fn wallet_for(
        &self,
        owner_id: OwnerId,
        actor: &Actor,
    ) -> Result<Option<Wallet>, DomainError> {
        require_owner(actor, owner_id, "read wallet")?;
        self.get_wallet(owner_id).await
    }

    pub async fn balance(&self, owner_id: OwnerId) -> Result<Money, DomainError> {
        Ok(self
            .get_wallet(owner_id)
            .await?
            .map(|wallet| wallet.balance())
            .unwrap_or_default())
    }
}

fn require_privileged(actor: &Actor, action: &'static str) -> Result<(), WalletError> {
    if actor.is_privileged() {
        return Ok(());
    }
    Err(WalletError::Forbidden {
        actor: actor.to_string(),
        action,
    })
}

fn require_owner(
    actor: &Actor,
    owner_id: OwnerId,
    action: &'static str,
) -> Result<(), WalletError> {
    if actor.owns_wallet(owner_id) || actor.is_privileged() {
        return Ok(());
    }
    Err(WalletError::Forbidden {
        actor: actor.to_string(),
        action,
    })
}

fn find_entry(wallet: &Wallet, key: &str) -> Result<LedgerEntry, WalletError> {
    wallet
        .entry(key)
        .cloned()
        .ok_or_else(|| WalletError::EntryNotFound {
            key: key.to_string(),
        })
}

fn receipt(
    result: CommandResult<Wallet>,
    key: &str,
    direction: EntryDirection,
    amount: Money,
) -> Result<LedgerReceipt, DomainError> {
    let replayed = result.is_noop();
    let entry = find_entry(&result.aggregate, key)?;

    if replayed {
        metrics::counter!("ledger_idempotent_replays_total").increment(1);
        if entry.amount != amount || entry.direction != direction {
            tracing::warn!(
                key,
                recorded_amount = %entry.amount,
                requested_amount = %amount,
                recorded_direction = %entry.direction,
                "idempotency key reused with different parameters; returning original entry"
            );
        }
    } else {
        metrics::counter!("ledger_entries_total", "direction" => direction.as_str()).increment(1);
        tracing::debug!(balance = %result.aggregate.balance(), "ledger entry recorded");
    }

    Ok(LedgerReceipt {
        balance: result.aggregate.balance(),
        entry,
        replayed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::wallet::{EntryState, PayoutDetails};
    use common::{AdminId, BuyerId};
    use event_store::InMemoryEventStore;

    fn admin() -> Actor {
        Actor::Admin(AdminId::new())
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let service = WalletService::new(InMemoryEventStore::new());
        let owner = OwnerId::new();

        let receipt = service
            .credit(Posting::new(owner, Money::from_cents(1000), "top up", "c1"), &admin())
            .await
            .unwrap();
        assert_eq!(receipt.balance.cents(), 1000);
        assert_eq!(receipt.entry.state, EntryState::Success);
        assert!(!receipt.replayed);

        let receipt = service
            .debit(Posting::new(owner, Money::from_cents(300), "order", "d1"), &admin())
            .await
            .unwrap();
        assert_eq!(receipt.balance.cents(), 700);
        assert_eq!(service.balance(owner).await.unwrap().cents(), 700);
    }

    #[tokio::test]
    async fn test_replay_returns_original_entry() {
        let service = WalletService::new(InMemoryEventStore::new());
        let owner = OwnerId::new();

        let first = service
            .credit(Posting::new(owner, Money::from_cents(500), "sale", "c1"), &admin())
            .await
            .unwrap();
        let second = service
            .credit(Posting::new(owner, Money::from_cents(999), "sale", "c1"), &admin())
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.entry, first.entry);
        assert_eq!(second.balance.cents(), 500);

        let wallet = service.get_wallet(owner).await.unwrap().unwrap();
        assert_eq!(wallet.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_credit_keeps_wallet_loadable() {
        let service = WalletService::new(InMemoryEventStore::new());
        let owner = OwnerId::new();
        service
            .credit(Posting::new(owner, Money::from_cents(i64::MAX), "top up", "c1"), &admin())
            .await
            .unwrap();

        let err = service
            .credit(Posting::new(owner, Money::from_cents(1), "top up", "c2"), &admin())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(service.balance(owner).await.unwrap().cents(), i64::MAX);
        let wallet = service.get_wallet(owner).await.unwrap().unwrap();
        assert_eq!(wallet.entries().len(), 1);
        assert!(wallet.entry("c2").is_none());
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_no_entry() {
        let service = WalletService::new(InMemoryEventStore::new());
        let owner = OwnerId::new();
        service
            .credit(Posting::new(owner, Money::from_cents(50), "top up", "c1"), &admin())
            .await
            .unwrap();

        let err = service
            .debit(Posting::new(owner, Money::from_cents(60), "order", "d1"), &admin())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

        let wallet = service.get_wallet(owner).await.unwrap().unwrap();
        assert_eq!(wallet.balance().cents(), 50);
        assert_eq!(wallet.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_only_privileged_actors_post() {
        let service = WalletService::new(InMemoryEventStore::new());
        let buyer = BuyerId::new();

        let err = service
            .credit(
                Posting::new(buyer, Money::from_cents(50), "free money", "c1"),
                &Actor::Buyer(buyer),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_owner_withdraws_and_reads() {
        let service = WalletService::new(InMemoryEventStore::new());
        let buyer = BuyerId::new();
        let owner: OwnerId = buyer.into();
        service
            .credit(Posting::new(owner, Money::from_cents(800), "refund", "c1"), &admin())
            .await
            .unwrap();

        let receipt = service
            .withdraw(
                Withdraw::new(owner, Money::from_cents(300), "w1", PayoutDetails::new("bank", "123")),
                &Actor::Buyer(buyer),
            )
            .await
            .unwrap();
        assert_eq!(receipt.entry.state, EntryState::Pending);
        assert_eq!(receipt.balance.cents(), 500);

        let stranger = Actor::Buyer(BuyerId::new());
        let err = service.wallet_for(owner, &stranger).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(service.wallet_for(owner, &Actor::Buyer(buyer)).await.unwrap().is_some());

        let settled = service
            .settle_withdrawal(SettleWithdrawal::failed(owner, "w1", "closed account"), &admin())
            .await
            .unwrap();
        assert_eq!(settled.entry.state, EntryState::Failed);
        assert_eq!(settled.balance.cents(), 800);

        let replay = service
            .settle_withdrawal(SettleWithdrawal::failed(owner, "w1", "closed account"), &admin())
            .await
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.balance.cents(), 800);
    }

    #[tokio::test]
    async fn test_missing_wallet_has_zero_balance() {
        let service = WalletService::new(InMemoryEventStore::new());
        assert!(service.balance(OwnerId::new()).await.unwrap().is_zero());
    }
}
