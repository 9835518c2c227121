//! Wallet ledger as seen from the coordinator.

use std::time::Duration;

use async_trait::async_trait;
use common::Actor;
use domain::{LedgerReceipt, Posting, WalletService};
use event_store::EventStore;

use super::Faults;
use crate::error::Result;

const SERVICE: &str = "wallet ledger";

/// Credits and debits keyed by idempotency key. Replaying a key must return
/// the original receipt without moving money again.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn credit(&self, posting: Posting) -> Result<LedgerReceipt>;

    async fn debit(&self, posting: Posting) -> Result<LedgerReceipt>;
}

/// Ledger client calling the wallet service in-process, as the system actor.
pub struct LocalLedger<S: EventStore> {
    wallets: WalletService<S>,
    actor: Actor,
    faults: Faults,
}

impl<S: EventStore + Clone> Clone for LocalLedger<S> {
    fn clone(&self) -> Self {
        Self {
            wallets: self.wallets.clone(),
            actor: self.actor.clone(),
            faults: self.faults.clone(),
        }
    }
}

impl<S: EventStore> LocalLedger<S> {
    pub fn new(wallets: WalletService<S>) -> Self {
        Self {
            wallets,
            actor: Actor::system("settlement"),
            faults: Faults::default(),
        }
    }

    pub fn wallets(&self) -> &WalletService<S> {
        &self.wallets
    }

    /// Fails the next `calls` calls before they reach the wallet.
    pub fn refuse_next(&self, calls: u32) {
        self.faults.refuse_next(calls);
    }

    /// Applies the next `calls` calls but reports them as failed.
    pub fn drop_responses(&self, calls: u32) {
        self.faults.drop_responses(calls);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.set_delay(delay);
    }
}

#[async_trait]
impl<S: EventStore> LedgerClient for LocalLedger<S> {
    async fn credit(&self, posting: Posting) -> Result<LedgerReceipt> {
        self.faults.before_call(SERVICE).await?;
        let receipt = self.wallets.credit(posting, &self.actor).await?;
        self.faults.after_call(SERVICE)?;
        Ok(receipt)
    }

    async fn debit(&self, posting: Posting) -> Result<LedgerReceipt> {
        self.faults.before_call(SERVICE).await?;
        let receipt = self.wallets.debit(posting, &self.actor).await?;
        self.faults.after_call(SERVICE)?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OwnerId, VendorId};
    use domain::Money;
    use event_store::InMemoryEventStore;

    fn ledger() -> LocalLedger<InMemoryEventStore> {
        LocalLedger::new(WalletService::new(InMemoryEventStore::new()))
    }

    #[tokio::test]
    async fn test_lost_response_then_replay() {
        let ledger = ledger();
        let owner = OwnerId::from(VendorId::new());
        let posting = Posting::new(owner, Money::from_dollars(90), "sale", "txn-1");

        ledger.drop_responses(1);
        assert!(ledger.credit(posting.clone()).await.is_err());

        let receipt = ledger.credit(posting).await.unwrap();
        assert!(receipt.replayed);
        assert_eq!(receipt.balance, Money::from_dollars(90));
    }

    #[tokio::test]
    async fn test_refused_call_moves_nothing() {
        let ledger = ledger();
        let owner = OwnerId::from(VendorId::new());

        ledger.refuse_next(1);
        let posting = Posting::new(owner, Money::from_dollars(5), "sale", "txn-2");
        assert!(ledger.credit(posting).await.is_err());
        assert_eq!(
            ledger.wallets().balance(owner).await.unwrap(),
            Money::zero()
        );
    }
}
