//! Wallet aggregate: one owner's balance and ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, OwnerId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;

use super::{
    EntryDirection, EntryState, LedgerEntry, Posting, SettleWithdrawal, WalletError, WalletEvent,
    Withdraw, WithdrawalOutcome,
    events::{PostingData, WithdrawalRequestedData},
};

/// Suffix of the compensating credit that reverses a failed withdrawal.
pub const REVERSAL_SUFFIX: &str = ":reversal";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wallet {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    owner_id: Option<OwnerId>,
    balance: Money,
    entries: Vec<LedgerEntry>,

    /// Idempotency key -> position in `entries`.
    keys: HashMap<String, usize>,

    opened_at: Option<DateTime<Utc>>,
}

impl Aggregate for Wallet {
    type Event = WalletEvent;
    type Error = WalletError;

    fn aggregate_type() -> &'static str {
        "Wallet"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            WalletEvent::WalletOpened(data) => {
                self.id = Some(data.wallet_id);
                self.owner_id = Some(data.owner_id);
                self.opened_at = Some(data.opened_at);
            }
            WalletEvent::WalletCredited(data) => {
                self.balance += data.amount;
                self.push_posting(EntryDirection::Credit, data);
            }
            WalletEvent::WalletDebited(data) => {
                self.balance -= data.amount;
                self.push_posting(EntryDirection::Debit, data);
            }
            WalletEvent::WithdrawalRequested(data) => self.apply_withdrawal_requested(data),
            WalletEvent::WithdrawalSettled(data) => {
                self.settle_entry(&data.key, EntryState::Success, data.settled_at);
            }
            WalletEvent::WithdrawalFailed(data) => {
                self.settle_entry(&data.key, EntryState::Failed, data.failed_at);
            }
        }
    }
}

impl SnapshotCapable for Wallet {}

// Query methods
impl Wallet {
    /// Wallet ids are derived from the owner, so one owner has one wallet.
    pub fn id_for(owner_id: OwnerId) -> AggregateId {
        AggregateId::from_uuid(owner_id.as_uuid()).derive("wallet")
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&LedgerEntry> {
        self.keys.get(key).and_then(|&idx| self.entries.get(idx))
    }

    pub fn pending_withdrawals(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_withdrawal() && e.state == EntryState::Pending)
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Balance rebuilt from the entries alone.
    ///
    /// Always equal to [`Wallet::balance`]; with no pending or failed
    /// withdrawals this is Σ successful credits − Σ successful debits.
    pub fn recomputed_balance(&self) -> Money {
        self.entries.iter().map(LedgerEntry::balance_effect).sum()
    }
}

// Command methods (return events)
impl Wallet {
    /// Adds money. Opens the wallet on first use.
    pub fn credit(&self, posting: &Posting) -> Result<Vec<WalletEvent>, WalletError> {
        validate(posting.amount, &posting.idempotency_key)?;
        if self.keys.contains_key(&posting.idempotency_key) {
            return Ok(vec![]);
        }

        self.ensure_headroom(posting.amount)?;
        let mut events = self.open_if_needed(posting.owner_id);
        events.push(WalletEvent::credited(
            &posting.idempotency_key,
            posting.amount,
            &posting.reason,
            posting.related_order_id,
        ));
        Ok(events)
    }

    /// Removes money. Fails without recording anything when the balance
    /// is short.
    pub fn debit(&self, posting: &Posting) -> Result<Vec<WalletEvent>, WalletError> {
        validate(posting.amount, &posting.idempotency_key)?;
        if self.keys.contains_key(&posting.idempotency_key) {
            return Ok(vec![]);
        }

        self.ensure_funds(posting.amount)?;
        Ok(vec![WalletEvent::debited(
            &posting.idempotency_key,
            posting.amount,
            &posting.reason,
            posting.related_order_id,
        )])
    }

    /// Reserves money for an external payout. The entry starts pending.
    pub fn withdraw(&self, cmd: &Withdraw) -> Result<Vec<WalletEvent>, WalletError> {
        validate(cmd.amount, &cmd.idempotency_key)?;
        if self.keys.contains_key(&cmd.idempotency_key) {
            return Ok(vec![]);
        }

        if cmd.payout.account.trim().is_empty() {
            return Err(WalletError::MissingPayoutAccount);
        }

        self.ensure_funds(cmd.amount)?;
        Ok(vec![WalletEvent::withdrawal_requested(
            &cmd.idempotency_key,
            cmd.amount,
            "withdrawal",
            cmd.payout.clone(),
        )])
    }

    /// Flips a pending withdrawal to success or failure.
    ///
    /// A failure also credits the amount back under `{key}:reversal`.
    /// Repeating the recorded outcome is a no-op.
    pub fn settle_withdrawal(
        &self,
        cmd: &SettleWithdrawal,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        let key = cmd.idempotency_key.as_str();
        let entry = self.entry(key).ok_or_else(|| WalletError::EntryNotFound {
            key: key.to_string(),
        })?;

        if !entry.is_withdrawal() {
            return Err(WalletError::NotAWithdrawal {
                key: key.to_string(),
            });
        }

        match (entry.state, cmd.outcome) {
            (EntryState::Pending, WithdrawalOutcome::Succeeded) => {
                Ok(vec![WalletEvent::withdrawal_settled(key)])
            }
            (EntryState::Pending, WithdrawalOutcome::Failed) => {
                self.ensure_headroom(entry.amount)?;
                Ok(vec![
                    WalletEvent::withdrawal_failed(key, cmd.reason.clone()),
                    WalletEvent::credited(
                        format!("{key}{REVERSAL_SUFFIX}"),
                        entry.amount,
                        "withdrawal reversal",
                        None,
                    ),
                ])
            }
            (EntryState::Success, WithdrawalOutcome::Succeeded)
            | (EntryState::Failed, WithdrawalOutcome::Failed) => Ok(vec![]),
            (state, _) => Err(WalletError::WithdrawalAlreadySettled {
                key: key.to_string(),
                state,
            }),
        }
    }
}

// Helpers
impl Wallet {
    fn open_if_needed(&self, owner_id: OwnerId) -> Vec<WalletEvent> {
        if self.id.is_some() {
            return vec![];
        }
        vec![WalletEvent::opened(Self::id_for(owner_id), owner_id)]
    }

    fn ensure_funds(&self, amount: Money) -> Result<(), WalletError> {
        if self.id.is_none() || self.balance < amount {
            return Err(WalletError::InsufficientBalance {
                balance: self.balance.cents(),
                requested: amount.cents(),
            });
        }
        Ok(())
    }

    fn ensure_headroom(&self, amount: Money) -> Result<(), WalletError> {
        match self.balance.checked_add(amount) {
            Some(_) => Ok(()),
            None => Err(WalletError::BalanceOverflow {
                balance: self.balance.cents(),
                amount: amount.cents(),
            }),
        }
    }

    fn push_entry(&mut self, entry: LedgerEntry) {
        self.keys.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }

    fn push_posting(&mut self, direction: EntryDirection, data: PostingData) {
        self.push_entry(LedgerEntry {
            key: data.key,
            direction,
            amount: data.amount,
            reason: data.reason,
            related_order_id: data.related_order_id,
            state: EntryState::Success,
            created_at: data.recorded_at,
            settled_at: Some(data.recorded_at),
            payout: None,
        });
    }

    fn apply_withdrawal_requested(&mut self, data: WithdrawalRequestedData) {
        self.balance -= data.amount;
        self.push_entry(LedgerEntry {
            key: data.key,
            direction: EntryDirection::Debit,
            amount: data.amount,
            reason: data.reason,
            related_order_id: None,
            state: EntryState::Pending,
            created_at: data.requested_at,
            settled_at: None,
            payout: Some(data.payout),
        });
    }

    fn settle_entry(&mut self, key: &str, state: EntryState, at: DateTime<Utc>) {
        if let Some(&idx) = self.keys.get(key)
            && let Some(entry) = self.entries.get_mut(idx)
        {
            entry.state = state;
            entry.settled_at = Some(at);
        }
    }
}

fn validate(amount: Money, key: &str) -> Result<(), WalletError> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidAmount {
            amount: amount.cents(),
        });
    }
    if key.trim().is_empty() {
        return Err(WalletError::MissingIdempotencyKey);
    }
    Ok(())
}
